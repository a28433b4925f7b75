//! Tokio-backed tether host.
//!
//! With the `diagnostics` feature, every wrapper here reports lifecycle
//! events to the process-wide tracker, which is installed automatically at
//! startup. Without it, the same API compiles to plain Tokio.

#[doc(hidden)]
pub use tether_types;
#[doc(hidden)]
pub use tokio;

#[cfg(target_arch = "wasm32")]
compile_error!("`tether-tokio` is native-only");

#[cfg(not(feature = "diagnostics"))]
mod disabled;
#[cfg(feature = "diagnostics")]
mod enabled;

#[cfg(not(feature = "diagnostics"))]
pub use disabled::*;
#[cfg(feature = "diagnostics")]
pub use enabled::*;
