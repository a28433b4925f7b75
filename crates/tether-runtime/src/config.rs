use std::num::NonZeroUsize;

use tether_types::ResourceKind;
use tracing::warn;

pub const PROMISE_STACK_FRAMES_ENV: &str = "TETHER_PROMISE_STACK_FRAMES";
pub const AWAIT_STACK_FRAMES_ENV: &str = "TETHER_AWAIT_STACK_FRAMES";
pub const IO_STACK_FRAMES_ENV: &str = "TETHER_IO_STACK_FRAMES";
pub const CYCLE_CHECK_BUDGET_ENV: &str = "TETHER_CYCLE_CHECK_BUDGET";

const DEFAULT_PROMISE_STACK_FRAMES: usize = 5;
const DEFAULT_AWAIT_STACK_FRAMES: usize = 5;
const DEFAULT_IO_STACK_FRAMES: usize = 3;
const DEFAULT_CYCLE_CHECK_BUDGET: usize = 256;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Frames captured for a promise created under an owner.
    pub promise_stack_frames: NonZeroUsize,
    /// Frames captured for an await point inside an active operation.
    pub await_stack_frames: NonZeroUsize,
    /// Frames captured for an I/O sequence started without an owner.
    pub io_stack_frames: NonZeroUsize,
    /// Deferred-callback bookkeeping kinds that never get a node of their own.
    pub ignored_kinds: Vec<ResourceKind>,
    /// Nodes the cycle check may visit before refusing a repaired link.
    pub cycle_check_budget: NonZeroUsize,
}

impl TrackerConfig {
    /// Defaults, with frame depths and the cycle check budget overridden from
    /// the environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let setting = |name: &str, default: NonZeroUsize| match lookup(name) {
            None => default,
            Some(raw) => match raw.trim().parse::<NonZeroUsize>() {
                Ok(value) => value,
                Err(err) => {
                    warn!(var = name, value = %raw, %err, "ignoring invalid setting");
                    default
                }
            },
        };
        config.promise_stack_frames = setting(PROMISE_STACK_FRAMES_ENV, config.promise_stack_frames);
        config.await_stack_frames = setting(AWAIT_STACK_FRAMES_ENV, config.await_stack_frames);
        config.io_stack_frames = setting(IO_STACK_FRAMES_ENV, config.io_stack_frames);
        config.cycle_check_budget = setting(CYCLE_CHECK_BUDGET_ENV, config.cycle_check_budget);
        config
    }

    pub fn is_ignored(&self, kind: &ResourceKind) -> bool {
        self.ignored_kinds.contains(kind)
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            promise_stack_frames: non_zero(DEFAULT_PROMISE_STACK_FRAMES),
            await_stack_frames: non_zero(DEFAULT_AWAIT_STACK_FRAMES),
            io_stack_frames: non_zero(DEFAULT_IO_STACK_FRAMES),
            ignored_kinds: vec![
                ResourceKind::Microtask,
                ResourceKind::TickObject,
                ResourceKind::Immediate,
            ],
            cycle_check_budget: non_zero(DEFAULT_CYCLE_CHECK_BUDGET),
        }
    }
}

fn non_zero(value: usize) -> NonZeroUsize {
    NonZeroUsize::new(value).expect("invariant violated: defaults must be non-zero")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_ignore_deferred_callbacks_only() {
        let config = TrackerConfig::default();
        assert!(config.is_ignored(&ResourceKind::Microtask));
        assert!(config.is_ignored(&ResourceKind::TickObject));
        assert!(config.is_ignored(&ResourceKind::Immediate));
        assert!(!config.is_ignored(&ResourceKind::Timeout));
        assert!(!config.is_ignored(&ResourceKind::Promise));
    }

    #[test]
    fn environment_overrides_stack_depths() {
        let config = TrackerConfig::from_lookup(|name| match name {
            AWAIT_STACK_FRAMES_ENV => Some("12".to_owned()),
            IO_STACK_FRAMES_ENV => Some("0".to_owned()),
            PROMISE_STACK_FRAMES_ENV => Some("lots".to_owned()),
            CYCLE_CHECK_BUDGET_ENV => Some(" 64 ".to_owned()),
            _ => None,
        });
        assert_eq!(config.cycle_check_budget.get(), 64);
        assert_eq!(config.await_stack_frames.get(), 12);
        assert_eq!(config.io_stack_frames.get(), DEFAULT_IO_STACK_FRAMES);
        assert_eq!(config.promise_stack_frames.get(), DEFAULT_PROMISE_STACK_FRAMES);
    }
}
