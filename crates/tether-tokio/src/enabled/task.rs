use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tether_types::{AsyncId, Owner, ResourceKind};

use super::resource::{AsyncResource, Resource};

/// Instrumented equivalent of [`tokio::spawn`].
///
/// The task is a non-promise resource created in the spawning context. Each
/// poll is reported as a callback run, inside the task's own context and
/// attributed to `name`.
pub fn spawn<F>(name: impl Into<Arc<str>>, future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let resource = Resource::io(ResourceKind::Task);
    let async_id = resource.async_id();
    let task = TaskFuture {
        inner: Box::pin(future),
        owner: Owner::named(name),
        resource,
    };
    JoinHandle {
        inner: tokio::spawn(task),
        async_id,
    }
}

struct TaskFuture<F> {
    inner: Pin<Box<F>>,
    owner: Owner,
    resource: Resource,
}

impl<F: Future> Future for TaskFuture<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        this.resource.before();
        let _context = this.resource.enter(Some(this.owner.clone()));
        this.inner.as_mut().poll(cx)
    }
}

/// Instrumented equivalent of [`tokio::task::JoinHandle`].
pub struct JoinHandle<T> {
    inner: tokio::task::JoinHandle<T>,
    async_id: AsyncId,
}

impl<T> JoinHandle<T> {
    pub fn abort(&self) {
        self.inner.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = Result<T, tokio::task::JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx)
    }
}

impl<T> AsyncResource for JoinHandle<T> {
    fn async_id(&self) -> AsyncId {
        self.async_id
    }
}

impl<T> fmt::Debug for JoinHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinHandle")
            .field("async_id", &self.async_id)
            .field("is_finished", &self.is_finished())
            .finish()
    }
}
