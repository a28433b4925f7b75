use facet::Facet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::InvariantError;

pub const JS_SAFE_INT_MAX_U64: u64 = (1u64 << 53) - 1;

/// Identifier the host runtime assigns to one asynchronous resource.
///
/// Ephemeral: hosts may hand the same value out again once the resource it
/// named has been torn down. Zero is a legal value (hosts commonly use it for
/// "no trigger").
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[facet(transparent)]
pub struct AsyncId(u64);

impl AsyncId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AsyncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for AsyncId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

macro_rules! define_u64_id {
    (
        $(#[$meta:meta])*
        $name:ident,
        field = $field:literal
        , max = $max:expr
    ) => {
        #[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[facet(transparent)]
        $(#[$meta])*
        pub struct $name(u64);

        impl $name {
            pub fn new(value: u64) -> Result<Self, InvariantError> {
                if value == 0 {
                    return Err(InvariantError::ZeroId($field));
                }
                if value > $max {
                    return Err(InvariantError::IdOutOfRange {
                        field: $field,
                        max: $max,
                        got: value,
                    });
                }
                Ok(Self(value))
            }

            pub fn next_process_local() -> Self {
                static NEXT_COUNTER: AtomicU64 = AtomicU64::new(1);
                let counter = NEXT_COUNTER.fetch_add(1, Ordering::Relaxed);
                // Wrapping past 2^53 ids in one process is not a real concern.
                Self(counter & $max)
            }

            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_u64_id!(
    /// Stable, process-local identity of one sequence node.
    ///
    /// Unlike [`AsyncId`] this is never reused, so it can name a node in a
    /// snapshot after the resource it described is gone.
    SequenceId,
    field = "sequence_id",
    max = JS_SAFE_INT_MAX_U64
);
