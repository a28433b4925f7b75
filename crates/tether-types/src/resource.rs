use facet::Facet;
use std::fmt;

/// Type tag the host attaches to a resource creation event.
#[derive(Facet, Debug, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A promise-like value that settles exactly once.
    Promise,
    /// Deferred microtask callback.
    Microtask,
    /// Next-tick style deferred callback.
    TickObject,
    /// Immediate-queue deferred callback.
    Immediate,
    /// Timer.
    Timeout,
    /// Spawned task driven by an executor.
    Task,
    /// Socket, file handle, or anything else the host names itself.
    Other(String),
}

impl ResourceKind {
    /// Maps a host type name onto a kind. Unknown names become [`ResourceKind::Other`].
    pub fn from_name(name: &str) -> Self {
        match name {
            "PROMISE" | "Promise" => Self::Promise,
            "Microtask" => Self::Microtask,
            "TickObject" => Self::TickObject,
            "Immediate" => Self::Immediate,
            "Timeout" => Self::Timeout,
            "Task" => Self::Task,
            other => Self::Other(other.to_owned()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Promise => "PROMISE",
            Self::Microtask => "Microtask",
            Self::TickObject => "TickObject",
            Self::Immediate => "Immediate",
            Self::Timeout => "Timeout",
            Self::Task => "Task",
            Self::Other(name) => name,
        }
    }

    pub fn is_promise(&self) -> bool {
        matches!(self, Self::Promise)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
