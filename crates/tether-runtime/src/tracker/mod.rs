use facet::Facet;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::panic::{AssertUnwindSafe, catch_unwind};

use tether_types::{AsyncId, AsyncSequence, StackSlot, ValueHandle};
use tracing::trace;

use crate::collaborators::{
    BacktraceStacks, ExtractError, Host, NoActiveOperation, NoOwner, OwnerSource, RequestScope,
    StackSource,
};
use crate::config::TrackerConfig;
use crate::liveness::LivenessMap;

mod lifecycle;

/// Builds the causality graph from host lifecycle events.
///
/// One tracker normally lives for the whole process (see [`crate::install`]).
/// All graph mutation happens inside [`Tracker::init`], [`Tracker::before`],
/// [`Tracker::resolve`], [`Tracker::destroy`] and [`Tracker::truncate_at_root`].
pub struct Tracker {
    host: Box<dyn Host>,
    owners: Box<dyn OwnerSource>,
    requests: Box<dyn RequestScope>,
    stacks: Box<dyn StackSource>,
    config: TrackerConfig,
    state: Mutex<TrackerState>,
}

struct TrackerState {
    /// Live async id -> the node currently describing it.
    registry: HashMap<AsyncId, AsyncSequence>,
    /// Promise value -> the value of the node it was triggered by.
    awaited_values: LivenessMap,
    /// Await value -> the value of the context it was created in.
    previous_values: LivenessMap,
    /// Most recently completed await; only consulted by `before`.
    last_ran_await: Option<AsyncSequence>,
    counters: Counters,
}

#[derive(Default)]
struct Counters {
    created: u64,
    resolved: u64,
    spliced: u64,
}

/// Point-in-time counters for a [`Tracker`].
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct TrackerStats {
    pub live_ids: u64,
    pub awaited_value_edges: u64,
    pub previous_value_edges: u64,
    pub created: u64,
    pub resolved: u64,
    pub spliced: u64,
}

pub struct TrackerBuilder {
    host: Box<dyn Host>,
    owners: Box<dyn OwnerSource>,
    requests: Box<dyn RequestScope>,
    stacks: Box<dyn StackSource>,
    config: TrackerConfig,
}

impl TrackerBuilder {
    pub fn owners(mut self, owners: impl OwnerSource + 'static) -> Self {
        self.owners = Box::new(owners);
        self
    }

    pub fn requests(mut self, requests: impl RequestScope + 'static) -> Self {
        self.requests = Box::new(requests);
        self
    }

    pub fn stacks(mut self, stacks: impl StackSource + 'static) -> Self {
        self.stacks = Box::new(stacks);
        self
    }

    pub fn config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Tracker {
        Tracker {
            host: self.host,
            owners: self.owners,
            requests: self.requests,
            stacks: self.stacks,
            config: self.config,
            state: Mutex::new(TrackerState {
                registry: HashMap::new(),
                awaited_values: LivenessMap::new(),
                previous_values: LivenessMap::new(),
                last_ran_await: None,
                counters: Counters::default(),
            }),
        }
    }
}

impl Tracker {
    /// Starts a builder with no owner attribution, no request scope, and
    /// real stack capture.
    pub fn builder(host: impl Host + 'static) -> TrackerBuilder {
        TrackerBuilder {
            host: Box::new(host),
            owners: Box::new(NoOwner),
            requests: Box::new(NoActiveOperation),
            stacks: Box::new(BacktraceStacks::default()),
            config: TrackerConfig::default(),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    // ── Queries ──────────────────────────────────────────────

    /// The node that led to the currently executing context, if any.
    pub fn current_sequence(&self) -> Option<AsyncSequence> {
        let execution_id = self.host.execution_async_id();
        self.lookup(execution_id)
    }

    /// The node tracked for `value`'s own async id.
    ///
    /// Values the host cannot introspect, including ones that panic when
    /// asked, are reported as untracked.
    pub fn sequence_for_value(&self, value: &(dyn Any + Send + Sync)) -> Option<AsyncSequence> {
        let extracted = catch_unwind(AssertUnwindSafe(|| self.host.async_id_of(value)))
            .unwrap_or_else(|panic| {
                Err(ExtractError::Hostile {
                    reason: panic_reason(panic.as_ref()),
                })
            });
        match extracted {
            Ok(async_id) => self.lookup(async_id),
            Err(err) => {
                trace!(%err, "value has no trackable async id");
                None
            }
        }
    }

    /// The node registered under `async_id`, if that id is live.
    pub fn sequence(&self, async_id: AsyncId) -> Option<AsyncSequence> {
        self.lookup(async_id)
    }

    /// Forgets the currently executing context so nothing scheduled from
    /// here on is attributed to it.
    ///
    /// Used at framework bootstrapping boundaries. I/O already started
    /// outside the boundary keeps its own entries.
    pub fn truncate_at_root(&self) {
        let execution_id = self.host.execution_async_id();
        if self.state.lock().registry.remove(&execution_id).is_some() {
            trace!(%execution_id, "truncated causal chain at root boundary");
        }
    }

    /// The value a promise's trigger settled through, kept alive by `value`.
    pub fn awaited_value_of(&self, value: &ValueHandle) -> Option<ValueHandle> {
        self.state.lock().awaited_values.dependency_of(value)
    }

    /// The value of the context an await point was created in, kept alive by `value`.
    pub fn previous_value_of(&self, value: &ValueHandle) -> Option<ValueHandle> {
        self.state.lock().previous_values.dependency_of(value)
    }

    pub fn stats(&self) -> TrackerStats {
        let state = self.state.lock();
        TrackerStats {
            live_ids: state.registry.len() as u64,
            awaited_value_edges: state.awaited_values.len() as u64,
            previous_value_edges: state.previous_values.len() as u64,
            created: state.counters.created,
            resolved: state.counters.resolved,
            spliced: state.counters.spliced,
        }
    }

    fn lookup(&self, async_id: AsyncId) -> Option<AsyncSequence> {
        self.state.lock().registry.get(&async_id).cloned()
    }

    fn capture_stack(&self, frames: NonZeroUsize) -> StackSlot {
        StackSlot::from(self.stacks.capture(frames))
    }
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
