use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tether_types::{AsyncId, ValueHandle};
use tokio::sync::oneshot;
use tracing::debug;

use super::resource::{AsyncResource, Resource};

/// A promise that whoever holds the matching [`Settle`] resolves.
///
/// Await points chained on it through [`crate::await_on`] are settled
/// together with it, in the settling context.
pub struct Deferred<T> {
    rx: oneshot::Receiver<T>,
    resource: Resource,
    shared: Arc<Mutex<Settlement>>,
}

/// Settles its [`Deferred`] from whatever context calls [`Settle::settle`].
pub struct Settle<T> {
    tx: oneshot::Sender<T>,
    async_id: AsyncId,
    shared: Arc<Mutex<Settlement>>,
}

#[derive(Default)]
struct Settlement {
    settled: bool,
    awaits: Vec<AsyncId>,
}

/// A promise created in the current context, settled from anywhere.
pub fn deferred<T>() -> (Deferred<T>, Settle<T>) {
    let (tx, rx) = oneshot::channel();
    let resource = Resource::promise();
    let async_id = resource.async_id();
    let shared = Arc::new(Mutex::new(Settlement::default()));
    (
        Deferred {
            rx,
            resource,
            shared: Arc::clone(&shared),
        },
        Settle {
            tx,
            async_id,
            shared,
        },
    )
}

impl<T> Settle<T> {
    /// Reports settlement in the calling context, then hands `value` over.
    ///
    /// Returns the value back if the [`Deferred`] was already dropped.
    pub fn settle(self, value: T) -> Result<(), T> {
        let awaits = {
            let mut shared = self.shared.lock();
            shared.settled = true;
            std::mem::take(&mut shared.awaits)
        };
        tether_runtime::resolve(self.async_id);
        for point in awaits {
            tether_runtime::resolve(point);
        }
        self.tx.send(value)
    }
}

impl<T> Future for Deferred<T> {
    type Output = Result<T, oneshot::error::RecvError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx)
    }
}

impl<T> AsyncResource for Deferred<T> {
    fn async_id(&self) -> AsyncId {
        self.resource.async_id()
    }

    fn value(&self) -> Option<&ValueHandle> {
        self.resource.value()
    }

    fn adopt_await(&self, point: AsyncId) -> bool {
        let mut shared = self.shared.lock();
        if shared.settled {
            debug!(deferred = %self.async_id(), %point, "already settled; await settles on its own");
            return false;
        }
        shared.awaits.push(point);
        true
    }
}
