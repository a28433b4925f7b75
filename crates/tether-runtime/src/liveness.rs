use std::collections::HashMap;
use std::sync::Arc;

use tether_types::{ValueHandle, WeakValueHandle};

const MIN_SWEEP_THRESHOLD: usize = 64;

/// Keeps a dependency's value alive for as long as its dependent value is alive.
///
/// Behaves like a weak-keyed map: the dependent is held weakly, the dependency
/// strongly. Entries whose dependent has been dropped are swept lazily.
pub(crate) struct LivenessMap {
    entries: HashMap<usize, LivenessEdge>,
    sweep_at: usize,
}

struct LivenessEdge {
    dependent: WeakValueHandle,
    dependency: ValueHandle,
}

fn address_of(value: &ValueHandle) -> usize {
    Arc::as_ptr(value) as *const () as usize
}

impl LivenessMap {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
            sweep_at: MIN_SWEEP_THRESHOLD,
        }
    }

    pub(crate) fn retain(&mut self, dependent: &ValueHandle, dependency: ValueHandle) {
        self.entries.insert(
            address_of(dependent),
            LivenessEdge {
                dependent: Arc::downgrade(dependent),
                dependency,
            },
        );
    }

    pub(crate) fn dependency_of(&self, dependent: &ValueHandle) -> Option<ValueHandle> {
        let edge = self.entries.get(&address_of(dependent))?;
        // A dead entry can share the address of a newer allocation.
        let live = edge.dependent.upgrade()?;
        Arc::ptr_eq(&live, dependent).then(|| Arc::clone(&edge.dependency))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Drops entries whose dependent is gone, at most once per doubling of size.
    pub(crate) fn sweep_if_due(&mut self) {
        if self.entries.len() < self.sweep_at {
            return;
        }
        self.sweep();
        self.sweep_at = (self.entries.len() * 2).max(MIN_SWEEP_THRESHOLD);
    }

    pub(crate) fn sweep(&mut self) {
        self.entries.retain(|_, edge| edge.dependent.strong_count() > 0);
    }
}
