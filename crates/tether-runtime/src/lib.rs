//! Lifecycle-driven causality tracking.
//!
//! The host runtime reports every asynchronous resource it creates, resumes,
//! settles, and tears down. [`Tracker`] turns that stream into a graph of
//! [`tether_types::AsyncSequence`] nodes, so that when some piece of async
//! work runs, [`current_sequence`] can say which I/O, which awaited value,
//! and which earlier step led there.
//!
//! The graph is best-effort. Where the host's trigger ids do not reveal the
//! true dependency, the handlers apply heuristics and document them.

mod collaborators;
mod config;
mod global;
mod liveness;
mod tracker;

pub use collaborators::{
    ActiveOperation, BacktraceStacks, ExtractError, Host, NoActiveOperation, NoOwner, NoStacks,
    OwnerSource, RequestScope, StackSource, TRACKER_FRAME_PREFIXES,
};
pub use config::{
    AWAIT_STACK_FRAMES_ENV, CYCLE_CHECK_BUDGET_ENV, IO_STACK_FRAMES_ENV, PROMISE_STACK_FRAMES_ENV,
    TrackerConfig,
};
pub use global::{
    InstallError, before, current_sequence, destroy, init, install, installed, replace, resolve,
    sequence_for_value, truncate_at_root, uninstall,
};
pub use tracker::{Tracker, TrackerBuilder, TrackerStats};
