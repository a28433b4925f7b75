//! Pass-through surface used when `diagnostics` is off. Nothing is
//! announced, no tracker is installed, and every query answers `None`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tether_types::AsyncSequence;
use tokio::sync::oneshot;

pub use tether_runtime::{current_sequence, truncate_at_root};

pub struct Tracked<F>(Pin<Box<F>>);

pub fn track<F: Future>(future: F) -> Tracked<F> {
    Tracked(Box::pin(future))
}

impl<F: Future> Future for Tracked<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.0.as_mut().poll(cx)
    }
}

pub trait FutureExt: Future + Sized {
    fn tracked(self) -> Tracked<Self> {
        track(self)
    }
}

impl<F: Future> FutureExt for F {}

pub struct AwaitOn<R>(Pin<Box<R>>);

pub fn await_on<R: Future>(resource: R) -> AwaitOn<R> {
    AwaitOn(Box::pin(resource))
}

impl<R: Future> Future for AwaitOn<R> {
    type Output = R::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.0.as_mut().poll(cx)
    }
}

pub struct Deferred<T>(oneshot::Receiver<T>);

pub struct Settle<T>(oneshot::Sender<T>);

pub fn deferred<T>() -> (Deferred<T>, Settle<T>) {
    let (tx, rx) = oneshot::channel();
    (Deferred(rx), Settle(tx))
}

impl<T> Settle<T> {
    pub fn settle(self, value: T) -> Result<(), T> {
        self.0.send(value)
    }
}

impl<T> Future for Deferred<T> {
    type Output = Result<T, oneshot::error::RecvError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

pub struct JoinHandle<T>(tokio::task::JoinHandle<T>);

/// Pass-through equivalent of [`tokio::spawn`]; `name` is accepted for API
/// compatibility with the enabled backend.
pub fn spawn<F>(_name: impl Into<Arc<str>>, future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    JoinHandle(tokio::spawn(future))
}

impl<T> JoinHandle<T> {
    pub fn abort(&self) {
        self.0.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = Result<T, tokio::task::JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

pub struct Sleep(Pin<Box<tokio::time::Sleep>>);

pub fn sleep(duration: Duration) -> Sleep {
    Sleep(Box::pin(tokio::time::sleep(duration)))
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.0.as_mut().poll(cx)
    }
}

pub struct Interval(tokio::time::Interval);

pub fn interval(period: Duration) -> Interval {
    Interval(tokio::time::interval(period))
}

impl Interval {
    pub async fn tick(&mut self) -> tokio::time::Instant {
        self.0.tick().await
    }
}

pub fn sequence_of<R>(_resource: &R) -> Option<AsyncSequence> {
    None
}
