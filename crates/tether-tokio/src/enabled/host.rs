use std::any::Any;
use std::sync::Arc;

use tether_runtime::{ExtractError, Host, OwnerSource, Tracker, TrackerBuilder, TrackerConfig};
use tether_types::{AsyncId, Owner, Timestamp};
use tokio::time::Instant;
use tracing::debug;

use super::context;

/// The value handle announced with every promise-typed resource.
pub(crate) struct PromiseValue {
    pub(crate) async_id: AsyncId,
}

/// Host services backed by the adapter's execution contexts and Tokio's clock.
pub struct TokioHost {
    epoch: Instant,
}

impl TokioHost {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for TokioHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for TokioHost {
    fn execution_async_id(&self) -> AsyncId {
        context::execution_async_id()
    }

    fn now(&self) -> Timestamp {
        Timestamp::from_duration(Instant::now().saturating_duration_since(self.epoch))
    }

    fn async_id_of(&self, value: &(dyn Any + Send + Sync)) -> Result<AsyncId, ExtractError> {
        value
            .downcast_ref::<PromiseValue>()
            .map(|value| value.async_id)
            .ok_or(ExtractError::Opaque)
    }
}

/// Attributes work to the innermost named task.
pub struct TaskOwners;

impl OwnerSource for TaskOwners {
    fn current_owner(&self) -> Option<Owner> {
        context::current_owner()
    }
}

/// A tracker wired to Tokio, with depths read from the environment.
///
/// This is what gets installed at startup; tests use it to swap in a fresh
/// tracker via [`tether_runtime::replace`].
pub fn tracker_builder() -> TrackerBuilder {
    Tracker::builder(TokioHost::new())
        .owners(TaskOwners)
        .config(TrackerConfig::from_env())
}

/// Installs a tracker from [`tracker_builder`]. A tracker installed earlier wins.
pub(crate) fn install_default() -> Option<Arc<Tracker>> {
    tether_runtime::install(tracker_builder().build())
        .map_err(|err| debug!(%err, "keeping the tracker installed earlier"))
        .ok()
}

#[ctor::ctor]
fn install_tokio_tracker() {
    install_default();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_install_keeps_an_existing_tracker() {
        let existing = tether_runtime::installed().expect("installed at startup");
        assert!(install_default().is_none());
        let current = tether_runtime::installed().expect("still installed");
        assert!(Arc::ptr_eq(&existing, &current));
    }
}
