//! The four lifecycle hook handlers.
//!
//! The host delivers, per resource id: one `init`, then any number of
//! `before` and at most one `resolve`, then one `destroy`. The handlers
//! translate those events into [`AsyncSequence`] nodes, resolving them in
//! place and repairing causal links where the host's trigger id is not the
//! real cause.

use std::sync::Arc;

use tether_types::{
    AsyncId, AsyncSequence, ResourceKind, SequenceKind, SequenceState, StackSlot, ValueHandle,
};
use tracing::{error, trace, warn};

use super::Tracker;

impl Tracker {
    /// A resource was created.
    ///
    /// `value` is the host value for promise-typed resources; other kinds
    /// pass `None`.
    pub fn init(
        &self,
        async_id: AsyncId,
        kind: &ResourceKind,
        trigger_id: AsyncId,
        value: Option<&ValueHandle>,
    ) {
        let trigger = self.lookup(trigger_id);

        let node = if kind.is_promise() {
            match self.classify_promise(trigger_id, trigger, value) {
                Some(node) => node,
                None => {
                    trace!(%async_id, %trigger_id, "await outside tracked scope; not tracking");
                    return;
                }
            }
        } else if self.config.is_ignored(kind) {
            let Some(trigger) = trigger else {
                return;
            };
            trigger
        } else {
            self.classify_io(trigger)
        };

        let mut state = self.state.lock();
        if let Some(stale) = state.registry.insert(async_id, node) {
            warn!(%async_id, stale = ?stale, "async id re-initialized before teardown");
        }
    }

    fn classify_promise(
        &self,
        trigger_id: AsyncId,
        trigger: Option<AsyncSequence>,
        value: Option<&ValueHandle>,
    ) -> Option<AsyncSequence> {
        if let (Some(trigger), Some(value)) = (&trigger, value)
            && let Some(dependency) = trigger.promise()
        {
            self.state.lock().awaited_values.retain(value, dependency);
        }

        let execution_id = self.host.execution_async_id();
        if execution_id != trigger_id {
            // Chained on another value: an await point.
            let trigger = trigger?;
            let current = self.lookup(execution_id);
            if let (Some(current), Some(value)) = (&current, value)
                && let Some(dependency) = current.promise()
            {
                self.state.lock().previous_values.retain(value, dependency);
            }

            let stack = self.await_stack(&trigger);
            return Some(self.create(SequenceState {
                kind: SequenceKind::UnresolvedAwait,
                owner: self.owners.current_owner(),
                stack,
                start: self.host.now(),
                end: None,
                promise: value.map(Arc::downgrade),
                awaited: Some(trigger),
                previous: current,
            }));
        }

        let owner = self.owners.current_owner();
        let stack = if owner.is_some() {
            self.capture_stack(self.config.promise_stack_frames)
        } else {
            StackSlot::Absent
        };
        Some(self.create(SequenceState {
            kind: SequenceKind::UnresolvedPromise,
            owner,
            stack,
            start: self.host.now(),
            end: None,
            promise: value.map(Arc::downgrade),
            awaited: trigger,
            previous: None,
        }))
    }

    /// One good stack per await chain is enough.
    fn await_stack(&self, trigger: &AsyncSequence) -> StackSlot {
        let (trigger_kind, trigger_has_stack) =
            trigger.read(|state| (state.kind, state.stack.is_present()));
        if trigger_kind.is_await() && trigger_has_stack {
            return StackSlot::Inherited;
        }

        let Some(operation) = self.requests.active_operation() else {
            return StackSlot::Absent;
        };
        match self.stacks.capture(self.config.await_stack_frames) {
            Some(stack) if self.stacks.is_user_observable(&stack, &operation) => {
                StackSlot::Captured(Arc::new(stack))
            }
            // Left empty so awaits further down the chain keep looking.
            _ => StackSlot::Absent,
        }
    }

    fn classify_io(&self, trigger: Option<AsyncSequence>) -> AsyncSequence {
        let previous = match trigger {
            None => None,
            Some(trigger) if trigger.kind().is_await() => Some(trigger),
            // Same I/O sequence continuing.
            Some(trigger) => return trigger,
        };

        let owner = self.owners.current_owner();
        let stack = if owner.is_none() {
            self.capture_stack(self.config.io_stack_frames)
        } else {
            StackSlot::Absent
        };
        self.create(SequenceState {
            kind: SequenceKind::Io,
            owner,
            stack,
            start: self.host.now(),
            end: None,
            promise: None,
            awaited: None,
            previous,
        })
    }

    fn create(&self, state: SequenceState) -> AsyncSequence {
        let node = AsyncSequence::new(state);
        self.state.lock().counters.created += 1;
        node
    }

    /// The host is about to run a callback belonging to `async_id`.
    pub fn before(&self, async_id: AsyncId) {
        let now = self.host.now();
        let mut state = self.state.lock();
        let Some(node) = state.registry.get(&async_id).cloned() else {
            return;
        };

        match node.kind() {
            SequenceKind::Io => {
                state.last_ran_await = None;
                node.mutate(|seq| seq.end = Some(now));
            }
            SequenceKind::UnresolvedAwait => {
                // Resumption arrives ahead of the settlement event.
                node.mutate(|seq| seq.resolve(now));
                state.counters.resolved += 1;
                state.last_ran_await = Some(node);
            }
            SequenceKind::Await => {
                state.last_ran_await = Some(node);
            }
            SequenceKind::UnresolvedPromise => {
                // The tail of an async body runs under its own promise after
                // the last await. Guess that await as the missing dependency;
                // wrong if unrelated work ran in between.
                let candidate = state.last_ran_await.take();
                state.counters.resolved += 1;
                drop(state);

                let guess = candidate.filter(|candidate| self.may_link(&node, candidate));
                node.mutate(|seq| {
                    seq.resolve(now);
                    seq.previous = guess;
                });
            }
            SequenceKind::Promise => {
                state.last_ran_await = None;
            }
        }
    }

    /// The promise-typed resource `async_id` settled.
    ///
    /// # Panics
    ///
    /// If `async_id` is tracked as an I/O sequence. Promise resources are
    /// never classified as I/O, so this means the graph is already wrong.
    pub fn resolve(&self, async_id: AsyncId) {
        let now = self.host.now();
        let execution_id = self.host.execution_async_id();
        let mut state = self.state.lock();
        let Some(node) = state.registry.get(&async_id).cloned() else {
            return;
        };

        match node.kind() {
            SequenceKind::Io => {
                drop(state);
                error!(%async_id, "I/O sequence reached promise settlement");
                panic!(
                    "async id {async_id} is tracked as an I/O sequence but was settled like a promise; \
                     the causality graph is inconsistent"
                );
            }
            SequenceKind::UnresolvedAwait | SequenceKind::UnresolvedPromise => {
                node.mutate(|seq| seq.resolve(now));
                state.counters.resolved += 1;
            }
            SequenceKind::Await | SequenceKind::Promise => {}
        }

        if execution_id == async_id {
            return;
        }

        // Settled from somewhere else: that context is the real cause.
        let candidate = state.registry.get(&execution_id).cloned();
        let kind = node.kind();
        if kind == SequenceKind::Await {
            state.counters.created += 1;
            state.counters.spliced += 1;
        }
        drop(state);

        let settler = candidate.filter(|candidate| self.may_link(&node, candidate));
        match kind {
            SequenceKind::Promise => {
                node.mutate(|seq| seq.awaited = settler);
            }
            SequenceKind::Await => {
                // Two dependencies: what was chained on, and what blocked the
                // continuation. Keep the first on a clone and chain it in.
                let first_leg = node.read(|seq| SequenceState {
                    kind: SequenceKind::Await,
                    owner: seq.owner.clone(),
                    stack: seq.stack.clone(),
                    start: seq.start,
                    end: seq.end,
                    promise: seq.promise.clone(),
                    awaited: seq.awaited.clone(),
                    previous: seq.previous.clone(),
                });
                let first_leg = AsyncSequence::new(first_leg);
                node.mutate(|seq| {
                    if let Some(end) = seq.end {
                        seq.start = end;
                    }
                    seq.end = Some(now);
                    seq.previous = Some(first_leg);
                    seq.awaited = settler;
                });
            }
            SequenceKind::Io | SequenceKind::UnresolvedAwait | SequenceKind::UnresolvedPromise => {}
        }
    }

    /// Whether `node` can take a link to `candidate` without closing a cycle.
    ///
    /// Runs without the registry lock. A check that exhausts
    /// `cycle_check_budget` refuses the link.
    fn may_link(&self, node: &AsyncSequence, candidate: &AsyncSequence) -> bool {
        match candidate.reaches_within(node, self.config.cycle_check_budget.get()) {
            Some(reaches) => !reaches,
            None => {
                trace!(
                    node = %node.id(),
                    candidate = %candidate.id(),
                    "cycle check budget exhausted; dropping link"
                );
                false
            }
        }
    }

    /// The resource `async_id` is gone; its id may be handed out again.
    pub fn destroy(&self, async_id: AsyncId) {
        let mut state = self.state.lock();
        state.registry.remove(&async_id);
        state.awaited_values.sweep_if_due();
        state.previous_values.sweep_if_due();
    }
}
