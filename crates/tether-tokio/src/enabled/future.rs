use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tether_types::{AsyncId, ValueHandle};

use super::context;
use super::resource::{AsyncResource, Resource};

/// A future announced as a promise created in the current context.
///
/// The body runs in whatever context polls it, like an async function body
/// runs in its caller's context until its first await. Completion settles
/// the promise from the context that finished it, usually its last await.
pub struct Tracked<F> {
    inner: Pin<Box<F>>,
    resource: Resource,
}

pub fn track<F: Future>(future: F) -> Tracked<F> {
    Tracked {
        inner: Box::pin(future),
        resource: Resource::promise(),
    }
}

impl<F: Future> Future for Tracked<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let output = ready!(this.inner.as_mut().poll(cx));
        this.resource.settle();
        Poll::Ready(output)
    }
}

impl<F> AsyncResource for Tracked<F> {
    fn async_id(&self) -> AsyncId {
        self.resource.async_id()
    }

    fn value(&self) -> Option<&ValueHandle> {
        self.resource.value()
    }
}

pub trait FutureExt: Future + Sized {
    fn tracked(self) -> Tracked<Self> {
        track(self)
    }
}

impl<F: Future> FutureExt for F {}

/// An await point on `resource`, created in the current context.
///
/// When the resource completes, the await is resumed and, unless the
/// resource adopted it, settled in its own context. The code after the
/// await then runs in the await's context.
pub struct AwaitOn<R> {
    inner: Pin<Box<R>>,
    async_id: AsyncId,
    /// Handed to the execution context once the await completes.
    point: Option<Resource>,
    adopted: bool,
}

pub fn await_on<R: AsyncResource + Future>(resource: R) -> AwaitOn<R> {
    let point = Resource::promise_triggered_by(resource.async_id());
    let async_id = point.async_id();
    let adopted = resource.adopt_await(async_id);
    AwaitOn {
        inner: Box::pin(resource),
        async_id,
        point: Some(point),
        adopted,
    }
}

impl<R: AsyncResource + Future> Future for AwaitOn<R> {
    type Output = R::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let output = ready!(this.inner.as_mut().poll(cx));
        let Some(point) = this.point.take() else {
            return Poll::Ready(output);
        };

        point.before();
        if !this.adopted {
            let _context = point.enter(None);
            point.settle();
        }
        context::resume_in(point);
        Poll::Ready(output)
    }
}

impl<R> AsyncResource for AwaitOn<R> {
    fn async_id(&self) -> AsyncId {
        self.async_id
    }

    fn value(&self) -> Option<&ValueHandle> {
        self.point.as_ref().and_then(Resource::value)
    }
}
