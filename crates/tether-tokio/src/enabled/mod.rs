pub(crate) mod context;
pub(crate) mod deferred;
pub(crate) mod future;
pub(crate) mod host;
pub(crate) mod resource;
pub(crate) mod task;
pub(crate) mod time;

pub use self::context::{ROOT_ASYNC_ID, execution_async_id};
pub use self::deferred::{Deferred, Settle, deferred};
pub use self::future::{AwaitOn, FutureExt, Tracked, await_on, track};
pub use self::host::{TaskOwners, TokioHost, tracker_builder};
pub use self::resource::{AsyncResource, sequence_of};
pub use self::task::{JoinHandle, spawn};
pub use self::time::{Interval, Sleep, interval, sleep};
pub use tether_runtime::*;
