use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use tether_types::{AsyncId, ResourceKind};
use tokio::time::Instant;

use super::resource::{AsyncResource, Resource};

/// Instrumented equivalent of [`tokio::time::sleep`].
///
/// A timer resource created in the current context; firing counts as its
/// callback running.
pub fn sleep(duration: Duration) -> Sleep {
    Sleep {
        inner: Box::pin(tokio::time::sleep(duration)),
        resource: Resource::io(ResourceKind::Timeout),
        fired: false,
    }
}

pub struct Sleep {
    inner: Pin<Box<tokio::time::Sleep>>,
    resource: Resource,
    fired: bool,
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = &mut *self;
        ready!(this.inner.as_mut().poll(cx));
        if !this.fired {
            this.fired = true;
            this.resource.before();
        }
        Poll::Ready(())
    }
}

impl AsyncResource for Sleep {
    fn async_id(&self) -> AsyncId {
        self.resource.async_id()
    }
}

/// Instrumented equivalent of [`tokio::time::interval`]: one recurring
/// timer resource, serviced on every tick.
pub fn interval(period: Duration) -> Interval {
    Interval {
        inner: tokio::time::interval(period),
        resource: Resource::io(ResourceKind::Timeout),
    }
}

pub struct Interval {
    inner: tokio::time::Interval,
    resource: Resource,
}

impl Interval {
    pub async fn tick(&mut self) -> Instant {
        let instant = self.inner.tick().await;
        self.resource.before();
        instant
    }
}

impl AsyncResource for Interval {
    fn async_id(&self) -> AsyncId {
        self.resource.async_id()
    }
}
