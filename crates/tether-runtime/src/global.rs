//! The process-wide tracker and hook entry points.
//!
//! Hosts register the four lifecycle hooks once at startup and forward every
//! event here. With no tracker installed every hook is a no-op and every
//! query answers `None`.

use parking_lot::RwLock;
use std::any::Any;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use tether_types::{AsyncId, AsyncSequence, ResourceKind, ValueHandle};
use tracing::debug;

use crate::Tracker;

static TRACKER: RwLock<Option<Arc<Tracker>>> = RwLock::new(None);

#[derive(Debug)]
pub struct InstallError;

impl fmt::Display for InstallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a process-wide tracker is already installed")
    }
}

impl Error for InstallError {}

/// Installs `tracker` unless one is already installed.
pub fn install(tracker: Tracker) -> Result<Arc<Tracker>, InstallError> {
    let mut slot = TRACKER.write();
    if slot.is_some() {
        return Err(InstallError);
    }
    let tracker = Arc::new(tracker);
    *slot = Some(Arc::clone(&tracker));
    debug!("process-wide tracker installed");
    Ok(tracker)
}

/// Installs `tracker`, returning whichever tracker it displaced.
///
/// Nodes built by the displaced tracker stay valid but stop being updated.
pub fn replace(tracker: Tracker) -> Option<Arc<Tracker>> {
    let previous = TRACKER.write().replace(Arc::new(tracker));
    debug!(displaced = previous.is_some(), "process-wide tracker replaced");
    previous
}

pub fn uninstall() -> Option<Arc<Tracker>> {
    TRACKER.write().take()
}

pub fn installed() -> Option<Arc<Tracker>> {
    TRACKER.read().clone()
}

fn with_tracker<R>(f: impl FnOnce(&Tracker) -> R) -> Option<R> {
    // Clone out so the slot lock is not held while a handler runs.
    let tracker = installed()?;
    Some(f(&tracker))
}

// ── Lifecycle hooks ──────────────────────────────────────

pub fn init(async_id: AsyncId, kind: &ResourceKind, trigger_id: AsyncId, value: Option<&ValueHandle>) {
    with_tracker(|tracker| tracker.init(async_id, kind, trigger_id, value));
}

pub fn before(async_id: AsyncId) {
    with_tracker(|tracker| tracker.before(async_id));
}

pub fn resolve(async_id: AsyncId) {
    with_tracker(|tracker| tracker.resolve(async_id));
}

pub fn destroy(async_id: AsyncId) {
    with_tracker(|tracker| tracker.destroy(async_id));
}

// ── Queries ──────────────────────────────────────────────

pub fn current_sequence() -> Option<AsyncSequence> {
    with_tracker(Tracker::current_sequence).flatten()
}

pub fn sequence_for_value(value: &(dyn Any + Send + Sync)) -> Option<AsyncSequence> {
    with_tracker(|tracker| tracker.sequence_for_value(value)).flatten()
}

pub fn truncate_at_root() {
    with_tracker(Tracker::truncate_at_root);
}
