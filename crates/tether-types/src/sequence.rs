use facet::Facet;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::{SequenceId, StackSlot, Timestamp};

/// Host value a promise-typed resource settles through.
pub type ValueHandle = Arc<dyn Any + Send + Sync>;

/// Non-owning reference to a [`ValueHandle`].
pub type WeakValueHandle = Weak<dyn Any + Send + Sync>;

/// Which higher-level unit of work was logically running when a node was created.
#[derive(Clone)]
pub struct Owner {
    name: Arc<str>,
    data: Option<ValueHandle>,
}

impl Owner {
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            data: None,
        }
    }

    pub fn with_data(name: impl Into<Arc<str>>, data: ValueHandle) -> Self {
        Self {
            name: name.into(),
            data: Some(data),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> Option<&ValueHandle> {
        self.data.as_ref()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.data.as_deref()?.downcast_ref::<T>()
    }
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owner")
            .field("name", &self.name)
            .field("has_data", &self.data.is_some())
            .finish()
    }
}

/// Variant tag of a sequence node.
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum SequenceKind {
    /// Non-promise operation: socket, timer, file handle, task.
    Io,
    /// Promise created directly in the current execution context, not yet settled.
    UnresolvedPromise,
    /// Settled [`SequenceKind::UnresolvedPromise`].
    Promise,
    /// Promise created by chaining on / awaiting another value, not yet settled.
    UnresolvedAwait,
    /// Settled [`SequenceKind::UnresolvedAwait`].
    Await,
}

impl SequenceKind {
    pub fn is_await(self) -> bool {
        matches!(self, Self::UnresolvedAwait | Self::Await)
    }

    pub fn is_promise(self) -> bool {
        matches!(self, Self::UnresolvedPromise | Self::Promise)
    }

    pub fn is_unresolved(self) -> bool {
        matches!(self, Self::UnresolvedPromise | Self::UnresolvedAwait)
    }

    /// The settled counterpart of an unresolved tag; every other tag maps to itself.
    pub fn resolved(self) -> Self {
        match self {
            Self::UnresolvedPromise => Self::Promise,
            Self::UnresolvedAwait => Self::Await,
            other => other,
        }
    }
}

/// Fields shared by every node variant.
pub struct SequenceState {
    pub kind: SequenceKind,
    pub owner: Option<Owner>,
    pub stack: StackSlot,
    pub start: Timestamp,
    /// `None` until resolved (promise kinds) or first serviced (I/O).
    pub end: Option<Timestamp>,
    /// Always `None` for I/O nodes.
    pub promise: Option<WeakValueHandle>,
    /// What this node was waiting on.
    pub awaited: Option<AsyncSequence>,
    /// What ran before this node in the same logical flow.
    pub previous: Option<AsyncSequence>,
}

impl SequenceState {
    /// Moves an unresolved node to its settled tag and stamps `end`.
    ///
    /// Returns `false`, leaving the node untouched, if it was already settled.
    pub fn resolve(&mut self, now: Timestamp) -> bool {
        if !self.kind.is_unresolved() {
            return false;
        }
        self.kind = self.kind.resolved();
        self.end = Some(now);
        true
    }

    pub fn promise(&self) -> Option<ValueHandle> {
        self.promise.as_ref()?.upgrade()
    }
}

impl fmt::Debug for SequenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceState")
            .field("kind", &self.kind)
            .field("owner", &self.owner)
            .field("stack", &self.stack)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("promise_live", &self.promise().is_some())
            .field("awaited", &self.awaited.as_ref().map(AsyncSequence::id))
            .field("previous", &self.previous.as_ref().map(AsyncSequence::id))
            .finish()
    }
}

struct SequenceCell {
    id: SequenceId,
    state: Mutex<SequenceState>,
}

impl Drop for SequenceCell {
    fn drop(&mut self) {
        // Unlink iteratively so long chains don't recurse through Arc drops.
        let mut pending: Vec<Arc<SequenceCell>> = Vec::new();
        take_links(self.state.get_mut(), &mut pending);
        while let Some(cell) = pending.pop() {
            if let Ok(mut cell) = Arc::try_unwrap(cell) {
                take_links(cell.state.get_mut(), &mut pending);
            }
        }
    }
}

fn take_links(state: &mut SequenceState, pending: &mut Vec<Arc<SequenceCell>>) {
    pending.extend(state.awaited.take().map(|node| node.0));
    pending.extend(state.previous.take().map(|node| node.0));
}

/// Shared handle to one node of the causality graph.
///
/// Cloning shares identity: resolution mutates the node in place, and every
/// holder observes it.
#[derive(Clone)]
pub struct AsyncSequence(Arc<SequenceCell>);

impl AsyncSequence {
    pub fn new(state: SequenceState) -> Self {
        Self(Arc::new(SequenceCell {
            id: SequenceId::next_process_local(),
            state: Mutex::new(state),
        }))
    }

    pub fn id(&self) -> SequenceId {
        self.0.id
    }

    pub fn read<R>(&self, f: impl FnOnce(&SequenceState) -> R) -> R {
        f(&self.0.state.lock())
    }

    /// Mutates the node in place. Reserved for the lifecycle handlers.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut SequenceState) -> R) -> R {
        f(&mut self.0.state.lock())
    }

    pub fn kind(&self) -> SequenceKind {
        self.read(|state| state.kind)
    }

    pub fn owner(&self) -> Option<Owner> {
        self.read(|state| state.owner.clone())
    }

    pub fn stack(&self) -> StackSlot {
        self.read(|state| state.stack.clone())
    }

    pub fn start(&self) -> Timestamp {
        self.read(|state| state.start)
    }

    pub fn end(&self) -> Option<Timestamp> {
        self.read(|state| state.end)
    }

    /// The described value, if it is still alive.
    pub fn promise(&self) -> Option<ValueHandle> {
        self.read(SequenceState::promise)
    }

    pub fn awaited(&self) -> Option<AsyncSequence> {
        self.read(|state| state.awaited.clone())
    }

    pub fn previous(&self) -> Option<AsyncSequence> {
        self.read(|state| state.previous.clone())
    }

    pub fn ptr_eq(&self, other: &AsyncSequence) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Whether `target` is this node or is reachable through `awaited`/`previous` links.
    pub fn reaches(&self, target: &AsyncSequence) -> bool {
        self.reaches_within(target, usize::MAX).unwrap_or(true)
    }

    /// [`Self::reaches`], visiting at most `budget` distinct nodes.
    ///
    /// `None` if the budget ran out before the question was settled.
    pub fn reaches_within(&self, target: &AsyncSequence, budget: usize) -> Option<bool> {
        let mut visited = HashSet::new();
        let mut pending = vec![self.clone()];
        while let Some(node) = pending.pop() {
            if node.ptr_eq(target) {
                return Some(true);
            }
            if visited.contains(&node.id()) {
                continue;
            }
            if visited.len() >= budget {
                return None;
            }
            visited.insert(node.id());
            let (awaited, previous) = node.read(|state| (state.awaited.clone(), state.previous.clone()));
            pending.extend(awaited);
            pending.extend(previous);
        }
        Some(false)
    }

    /// Successive `awaited` links, starting after this node.
    pub fn awaited_chain(&self) -> Chain {
        Chain {
            next: self.awaited(),
            link: Link::Awaited,
        }
    }

    /// Successive `previous` links, starting after this node.
    pub fn previous_chain(&self) -> Chain {
        Chain {
            next: self.previous(),
            link: Link::Previous,
        }
    }
}

impl fmt::Debug for AsyncSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncSequence")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy)]
enum Link {
    Awaited,
    Previous,
}

/// Iterator over one kind of link. See [`AsyncSequence::awaited_chain`].
pub struct Chain {
    next: Option<AsyncSequence>,
    link: Link,
}

impl Iterator for Chain {
    type Item = AsyncSequence;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next.take()?;
        self.next = match self.link {
            Link::Awaited => node.awaited(),
            Link::Previous => node.previous(),
        };
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(kind: SequenceKind, awaited: Option<&AsyncSequence>, previous: Option<&AsyncSequence>) -> AsyncSequence {
        AsyncSequence::new(SequenceState {
            kind,
            owner: None,
            stack: StackSlot::Absent,
            start: Timestamp::from_nanos(1),
            end: None,
            promise: None,
            awaited: awaited.cloned(),
            previous: previous.cloned(),
        })
    }

    #[test]
    fn resolve_transitions_exactly_once() {
        let seq = node(SequenceKind::UnresolvedAwait, None, None);
        assert!(seq.mutate(|state| state.resolve(Timestamp::from_nanos(5))));
        assert_eq!(seq.kind(), SequenceKind::Await);
        assert_eq!(seq.end(), Some(Timestamp::from_nanos(5)));

        assert!(!seq.mutate(|state| state.resolve(Timestamp::from_nanos(9))));
        assert_eq!(seq.end(), Some(Timestamp::from_nanos(5)));
    }

    #[test]
    fn io_nodes_never_resolve() {
        let seq = node(SequenceKind::Io, None, None);
        assert!(!seq.mutate(|state| state.resolve(Timestamp::from_nanos(5))));
        assert_eq!(seq.kind(), SequenceKind::Io);
        assert_eq!(seq.end(), None);
    }

    #[test]
    fn chains_follow_one_link_kind() {
        let io = node(SequenceKind::Io, None, None);
        let promise = node(SequenceKind::Promise, Some(&io), None);
        let await_node = node(SequenceKind::Await, Some(&promise), Some(&io));

        let awaited: Vec<_> = await_node.awaited_chain().map(|n| n.id()).collect();
        assert_eq!(awaited, vec![promise.id(), io.id()]);

        let previous: Vec<_> = await_node.previous_chain().map(|n| n.id()).collect();
        assert_eq!(previous, vec![io.id()]);
    }

    #[test]
    fn reaches_sees_through_both_links() {
        let io = node(SequenceKind::Io, None, None);
        let other = node(SequenceKind::Io, None, None);
        let await_node = node(SequenceKind::UnresolvedAwait, Some(&other), Some(&io));

        assert!(await_node.reaches(&io));
        assert!(await_node.reaches(&other));
        assert!(await_node.reaches(&await_node));
        assert!(!io.reaches(&await_node));
    }

    #[test]
    fn bounded_reach_gives_up_when_the_budget_runs_out() {
        let io = node(SequenceKind::Io, None, None);
        let promise = node(SequenceKind::Promise, Some(&io), None);
        let waiter = node(SequenceKind::UnresolvedAwait, Some(&promise), None);

        assert_eq!(waiter.reaches_within(&io, 1), None);
        assert_eq!(waiter.reaches_within(&io, 2), Some(true));
        assert_eq!(io.reaches_within(&waiter, 1), Some(false));
    }

    #[test]
    fn promise_reference_is_weak() {
        let value: ValueHandle = Arc::new(41_u32);
        let seq = AsyncSequence::new(SequenceState {
            kind: SequenceKind::UnresolvedPromise,
            owner: None,
            stack: StackSlot::Absent,
            start: Timestamp::ZERO,
            end: None,
            promise: Some(Arc::downgrade(&value)),
            awaited: None,
            previous: None,
        });
        assert!(seq.promise().is_some());
        drop(value);
        assert!(seq.promise().is_none());
    }

    #[test]
    fn dropping_a_long_chain_does_not_overflow() {
        let mut head = node(SequenceKind::Io, None, None);
        for _ in 0..200_000 {
            head = node(SequenceKind::Io, None, Some(&head));
        }
        drop(head);
    }

    #[test]
    fn owner_data_downcasts() {
        let owner = Owner::with_data("render", Arc::new(7_u8));
        assert_eq!(owner.name(), "render");
        assert_eq!(owner.downcast_ref::<u8>(), Some(&7));
        assert!(Owner::named("bare").downcast_ref::<u8>().is_none());
    }
}
