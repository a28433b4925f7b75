use std::sync::Arc;

use tether_types::{AsyncId, AsyncSequence, Owner, ResourceKind, ValueHandle};

use super::context::{self, EnterGuard};
use super::host::PromiseValue;

/// Something the host announced to the tracker and can be awaited.
pub trait AsyncResource {
    fn async_id(&self) -> AsyncId;

    /// The value handle, for promise-typed resources.
    fn value(&self) -> Option<&ValueHandle> {
        None
    }

    /// Offers the await point `point`, just chained on this resource.
    ///
    /// Returning `true` means the resource reports that await's settlement
    /// itself, from whichever context settles the resource.
    fn adopt_await(&self, _point: AsyncId) -> bool {
        false
    }
}

/// One announced resource; `destroy` is reported on drop.
pub(crate) struct Resource {
    async_id: AsyncId,
    value: Option<ValueHandle>,
}

impl Resource {
    /// A promise-typed resource created in the current context.
    pub(crate) fn promise() -> Self {
        Self::promise_triggered_by(context::execution_async_id())
    }

    /// A promise-typed resource chained on `trigger`.
    pub(crate) fn promise_triggered_by(trigger: AsyncId) -> Self {
        let async_id = context::next_async_id();
        let value: ValueHandle = Arc::new(PromiseValue { async_id });
        tether_runtime::init(async_id, &ResourceKind::Promise, trigger, Some(&value));
        Self {
            async_id,
            value: Some(value),
        }
    }

    /// A non-promise resource created in the current context.
    pub(crate) fn io(kind: ResourceKind) -> Self {
        let async_id = context::next_async_id();
        tether_runtime::init(async_id, &kind, context::execution_async_id(), None);
        Self {
            async_id,
            value: None,
        }
    }

    pub(crate) fn async_id(&self) -> AsyncId {
        self.async_id
    }

    pub(crate) fn value(&self) -> Option<&ValueHandle> {
        self.value.as_ref()
    }

    pub(crate) fn enter(&self, owner: Option<Owner>) -> EnterGuard {
        context::enter(self.async_id, owner)
    }

    pub(crate) fn before(&self) {
        tether_runtime::before(self.async_id);
    }

    /// Reports settlement from whatever context is executing now.
    pub(crate) fn settle(&self) {
        tether_runtime::resolve(self.async_id);
    }
}

impl Drop for Resource {
    fn drop(&mut self) {
        tether_runtime::destroy(self.async_id);
    }
}

/// The node tracked for `resource`, while its async id is live.
pub fn sequence_of(resource: &impl AsyncResource) -> Option<AsyncSequence> {
    match resource.value() {
        Some(value) => tether_runtime::sequence_for_value(value.as_ref()),
        None => tether_runtime::installed()?.sequence(resource.async_id()),
    }
}
