//! Which async resource is executing on this thread right now.
//!
//! Tokio has no notion of an execution async id, so the adapter keeps one:
//! each instrumented task pushes its id while it is being polled, and a
//! completed await point takes over the innermost frame so the code after
//! it runs in the await's context. Outside every instrumented task the
//! thread is in the root context.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};

use tether_types::{AsyncId, Owner};

use super::resource::Resource;

/// Context of code not running inside any instrumented future.
pub const ROOT_ASYNC_ID: AsyncId = AsyncId::new(1);

static NEXT_ASYNC_ID: AtomicU64 = AtomicU64::new(ROOT_ASYNC_ID.get() + 1);

struct Frame {
    async_id: AsyncId,
    owner: Option<Owner>,
    /// The completed await this frame continues in, kept live until the
    /// frame moves on.
    resumed: Option<Resource>,
}

thread_local! {
    static EXECUTION: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

pub(crate) fn next_async_id() -> AsyncId {
    AsyncId::new(NEXT_ASYNC_ID.fetch_add(1, Ordering::Relaxed))
}

/// Async id of the innermost instrumented future being polled on this thread.
pub fn execution_async_id() -> AsyncId {
    EXECUTION.with(|stack| {
        stack
            .borrow()
            .last()
            .map_or(ROOT_ASYNC_ID, |frame| frame.async_id)
    })
}

/// Owner of the innermost enclosing frame that has one.
pub(crate) fn current_owner() -> Option<Owner> {
    EXECUTION.with(|stack| {
        stack
            .borrow()
            .iter()
            .rev()
            .find_map(|frame| frame.owner.clone())
    })
}

/// Pops its frame when dropped, including on unwind.
#[must_use]
pub(crate) struct EnterGuard {
    depth: usize,
}

pub(crate) fn enter(async_id: AsyncId, owner: Option<Owner>) -> EnterGuard {
    let depth = EXECUTION.with(|stack| {
        let mut stack = stack.borrow_mut();
        stack.push(Frame {
            async_id,
            owner,
            resumed: None,
        });
        stack.len()
    });
    EnterGuard { depth }
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        let popped = EXECUTION.with(|stack| {
            let mut stack = stack.borrow_mut();
            debug_assert_eq!(
                stack.len(),
                self.depth,
                "execution contexts must be exited in reverse order"
            );
            stack.pop()
        });
        // Dropped outside the borrow: teardown reports to the tracker.
        drop(popped);
    }
}

/// Continues the innermost frame in `resource`'s context. The frame keeps
/// its owner and holds `resource` until it moves on again. In the root
/// context `resource` is simply dropped.
pub(crate) fn resume_in(resource: Resource) {
    let replaced = EXECUTION.with(|stack| {
        let mut stack = stack.borrow_mut();
        match stack.last_mut() {
            Some(frame) => {
                frame.async_id = resource.async_id();
                frame.resumed.replace(resource)
            }
            None => Some(resource),
        }
    });
    drop(replaced);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contexts_nest_and_unwind() {
        assert_eq!(execution_async_id(), ROOT_ASYNC_ID);
        let outer_id = next_async_id();
        let inner_id = next_async_id();
        assert!(outer_id.get() > ROOT_ASYNC_ID.get());
        {
            let _outer = enter(outer_id, Some(Owner::named("worker")));
            let _inner = enter(inner_id, None);
            assert_eq!(execution_async_id(), inner_id);
            assert_eq!(current_owner().map(|owner| owner.name().to_owned()).as_deref(), Some("worker"));
        }
        assert_eq!(execution_async_id(), ROOT_ASYNC_ID);
        assert!(current_owner().is_none());
    }

    #[test]
    fn resuming_replaces_only_the_innermost_frame() {
        resume_in(Resource::io(tether_types::ResourceKind::Timeout));
        assert_eq!(execution_async_id(), ROOT_ASYNC_ID);

        let task_id = next_async_id();
        let _task = enter(task_id, Some(Owner::named("worker")));
        let point = Resource::promise();
        let await_id = point.async_id();
        resume_in(point);
        assert_eq!(execution_async_id(), await_id);
        assert!(current_owner().is_some());
    }
}
