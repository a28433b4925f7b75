//! Interfaces the tracker consumes from the host process.
//!
//! The tracker never decides who owns a piece of work, what request is
//! active, or how to read a call stack. It asks these collaborators, and
//! treats "nothing" as an expected gap rather than an error.

use std::any::Any;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use parking_lot::Mutex;
use tether_trace_capture::{CaptureOptions, capture_current_filtered, symbol_name};
use tether_types::{AsyncId, Owner, Stack, Timestamp};
use tracing::debug;

/// Host runtime services: execution context, clock, value introspection.
pub trait Host: Send + Sync {
    /// Async id of the context whose callback is executing right now.
    fn execution_async_id(&self) -> AsyncId;

    /// Monotonic clock.
    fn now(&self) -> Timestamp;

    /// Recovers the async id of a value previously announced through `init`.
    ///
    /// Implementations may fail or panic on values they cannot introspect;
    /// the tracker treats both as "not tracked".
    fn async_id_of(&self, value: &(dyn Any + Send + Sync)) -> Result<AsyncId, ExtractError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// The value is not something the host hands out async ids for.
    Opaque,
    /// Introspecting the value failed.
    Hostile { reason: String },
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opaque => write!(f, "value carries no async id"),
            Self::Hostile { reason } => write!(f, "value refused introspection: {reason}"),
        }
    }
}

impl Error for ExtractError {}

/// Which higher-level unit of work is executing now.
pub trait OwnerSource: Send + Sync {
    fn current_owner(&self) -> Option<Owner>;
}

impl<F> OwnerSource for F
where
    F: Fn() -> Option<Owner> + Send + Sync,
{
    fn current_owner(&self) -> Option<Owner> {
        self()
    }
}

/// Handle to the top-level operation (request, render) currently in scope.
#[derive(Clone)]
pub struct ActiveOperation(Arc<dyn Any + Send + Sync>);

impl ActiveOperation {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for ActiveOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveOperation").finish_non_exhaustive()
    }
}

pub trait RequestScope: Send + Sync {
    fn active_operation(&self) -> Option<ActiveOperation>;
}

impl<F> RequestScope for F
where
    F: Fn() -> Option<ActiveOperation> + Send + Sync,
{
    fn active_operation(&self) -> Option<ActiveOperation> {
        self()
    }
}

/// Stack capture plus the "is this in user code" judgement.
pub trait StackSource: Send + Sync {
    fn capture(&self, frames: NonZeroUsize) -> Option<Stack>;

    fn is_user_observable(&self, stack: &Stack, operation: &ActiveOperation) -> bool;
}

pub struct NoOwner;

impl OwnerSource for NoOwner {
    fn current_owner(&self) -> Option<Owner> {
        None
    }
}

pub struct NoActiveOperation;

impl RequestScope for NoActiveOperation {
    fn active_operation(&self) -> Option<ActiveOperation> {
        None
    }
}

pub struct NoStacks;

impl StackSource for NoStacks {
    fn capture(&self, _frames: NonZeroUsize) -> Option<Stack> {
        None
    }

    fn is_user_observable(&self, _stack: &Stack, _operation: &ActiveOperation) -> bool {
        false
    }
}

type UserCodeFilter = Box<dyn Fn(&Stack, &ActiveOperation) -> bool + Send + Sync>;

/// Path prefixes of the frames between the host's call into the tracker and
/// the stack walk itself.
pub const TRACKER_FRAME_PREFIXES: &[&str] = &[
    "backtrace::",
    "tether_trace_capture::",
    "tether_runtime::",
    "tether_tokio::",
];

/// Captures real frames of the calling thread, starting at the first frame
/// outside the tracker.
pub struct BacktraceStacks {
    skip_frames: usize,
    symbolize: bool,
    filter: Option<UserCodeFilter>,
    tracker_prefixes: Vec<&'static str>,
    /// Whether each instruction pointer seen so far lies in tracker code.
    tracker_ips: Mutex<HashMap<u64, bool>>,
}

impl BacktraceStacks {
    pub fn new() -> Self {
        Self {
            skip_frames: 0,
            symbolize: false,
            filter: None,
            tracker_prefixes: TRACKER_FRAME_PREFIXES.to_vec(),
            tracker_ips: Mutex::new(HashMap::new()),
        }
    }

    pub fn skip_frames(mut self, skip_frames: usize) -> Self {
        self.skip_frames = skip_frames;
        self
    }

    /// Resolve symbol names for every kept frame. Off by default.
    pub fn symbolize(mut self, symbolize: bool) -> Self {
        self.symbolize = symbolize;
        self
    }

    /// Replaces [`TRACKER_FRAME_PREFIXES`] as the set of leading frames to drop.
    pub fn tracker_prefixes(mut self, prefixes: impl IntoIterator<Item = &'static str>) -> Self {
        self.tracker_prefixes = prefixes.into_iter().collect();
        self.tracker_ips.get_mut().clear();
        self
    }

    /// Without a filter every captured stack counts as user code.
    pub fn user_code_filter(
        mut self,
        filter: impl Fn(&Stack, &ActiveOperation) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    fn is_tracker_frame(&self, ip: u64) -> bool {
        if let Some(&known) = self.tracker_ips.lock().get(&ip) {
            return known;
        }
        let inside = symbol_name(ip).is_some_and(|name| {
            // Trait impls demangle as `<path as Trait>::method`.
            let path = name.trim_start_matches('<');
            self.tracker_prefixes
                .iter()
                .any(|prefix| path.starts_with(prefix))
        });
        self.tracker_ips.lock().insert(ip, inside);
        inside
    }
}

impl Default for BacktraceStacks {
    fn default() -> Self {
        Self::new()
    }
}

impl StackSource for BacktraceStacks {
    fn capture(&self, frames: NonZeroUsize) -> Option<Stack> {
        let options = CaptureOptions {
            max_frames: frames,
            skip_frames: self.skip_frames,
            symbolize: self.symbolize,
        };
        capture_current_filtered(options, |ip| self.is_tracker_frame(ip))
            .map_err(|err| debug!(%err, "stack capture failed"))
            .ok()
    }

    fn is_user_observable(&self, stack: &Stack, operation: &ActiveOperation) -> bool {
        self.filter
            .as_ref()
            .is_none_or(|filter| filter(stack, operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_act_as_collaborators() {
        let owners = || Some(Owner::named("layout"));
        assert_eq!(
            OwnerSource::current_owner(&owners).map(|owner| owner.name().to_owned()),
            Some("layout".to_owned())
        );

        let requests = || Some(ActiveOperation::new(17_u32));
        let operation = RequestScope::active_operation(&requests).expect("closure yields an operation");
        assert_eq!(operation.downcast_ref::<u32>(), Some(&17));
    }

    #[test]
    fn backtrace_stacks_apply_the_user_code_filter() {
        let frames = NonZeroUsize::new(4).expect("four is non-zero");
        let stacks = BacktraceStacks::new()
            .symbolize(false)
            .user_code_filter(|stack, _operation| stack.len() > 100);
        let stack = stacks.capture(frames).expect("capture should succeed");
        let operation = ActiveOperation::new(());
        assert!(!stacks.is_user_observable(&stack, &operation));
        assert!(BacktraceStacks::new().is_user_observable(&stack, &operation));
    }

    #[test]
    fn first_captured_frame_is_the_callers() {
        let frames = NonZeroUsize::new(2).expect("two is non-zero");
        let stacks = BacktraceStacks::new().symbolize(true).tracker_prefixes([
            "backtrace::",
            "tether_trace_capture::",
            "tether_runtime::collaborators::BacktraceStacks",
        ]);
        let stack = stacks.capture(frames).expect("capture should succeed");
        assert!(stack.len() <= 2);
        let first = stack.frames()[0]
            .symbol
            .as_deref()
            .expect("test binaries carry symbols");
        assert!(
            first.contains("first_captured_frame_is_the_callers"),
            "first frame should be this test, got {first}"
        );
    }
}
