//! Causality graph model shared by the tether crates.
//!
//! The central type is [`AsyncSequence`]: one node describing an asynchronous
//! operation (an I/O wait, a promise, or an await point), linked to what it
//! was waiting on (`awaited`) and what ran before it (`previous`). Nodes are
//! shared handles; the runtime resolves them in place, so every holder sees
//! the settled state.

use std::error::Error;
use std::fmt;

mod ids;
mod resource;
mod sequence;
mod snapshot;
mod stack;
mod time;

pub use ids::{AsyncId, JS_SAFE_INT_MAX_U64, SequenceId};
pub use resource::ResourceKind;
pub use sequence::{AsyncSequence, Chain, Owner, SequenceKind, SequenceState, ValueHandle, WeakValueHandle};
pub use snapshot::{GraphSnapshot, SequenceSnapshot};
pub use stack::{Stack, StackFrame, StackSlot};
pub use time::Timestamp;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantError {
    ZeroId(&'static str),
    IdOutOfRange {
        field: &'static str,
        max: u64,
        got: u64,
    },
    EmptyStackFrames,
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroId(field) => write!(f, "{field} must be non-zero"),
            Self::IdOutOfRange { field, max, got } => {
                write!(f, "{field} must be <= {max}, got {got}")
            }
            Self::EmptyStackFrames => write!(f, "stack frames must be non-empty"),
        }
    }
}

impl Error for InvariantError {}
