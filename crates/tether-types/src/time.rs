use facet::Facet;
use std::fmt;
use std::time::Duration;

/// Monotonic timestamp in nanoseconds since the host clock's epoch.
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[facet(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Self = Self(0);

    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub fn from_duration(since_epoch: Duration) -> Self {
        Self(since_epoch.as_nanos().min(u64::MAX as u128) as u64)
    }

    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    pub fn as_millis_f64(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    pub fn saturating_since(self, earlier: Timestamp) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}ms", self.as_millis_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_conversion_saturates() {
        let huge = Duration::from_secs(u64::MAX);
        assert_eq!(Timestamp::from_duration(huge).as_nanos(), u64::MAX);
    }

    #[test]
    fn saturating_since_never_underflows() {
        let early = Timestamp::from_nanos(10);
        let late = Timestamp::from_nanos(25);
        assert_eq!(late.saturating_since(early), Duration::from_nanos(15));
        assert_eq!(early.saturating_since(late), Duration::ZERO);
    }
}
