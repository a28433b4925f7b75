//! # tether
//!
//! Answers "what led here?" for async work. Every instrumented future, task,
//! timer and deferred value is announced to a tracker, which keeps a graph
//! of sequences: what each step was waiting on (`awaited`) and what ran
//! right before it (`previous`).
//!
//! ```rust,ignore
//! use tether::FutureExt;
//!
//! #[tokio::main]
//! async fn main() {
//!     // No init call needed: the tracker installs itself via `ctor`.
//!     let loader = tether::spawn("loader", async {
//!         tether::sleep(std::time::Duration::from_millis(5)).await;
//!         tether::current_sequence()
//!     });
//!     let sequence = tether::await_on(loader).tracked().await;
//! }
//! ```
//!
//! # Cargo features
//!
//! | Feature | Effect |
//! |---------|--------|
//! | *(default, none)* | All wrappers compile to pass-throughs; every query answers `None`. |
//! | `diagnostics` | Installs the tracker and reports lifecycle events. |
//!
//! # Configuration
//!
//! Stack depths come from `TETHER_PROMISE_STACK_FRAMES`,
//! `TETHER_AWAIT_STACK_FRAMES` and `TETHER_IO_STACK_FRAMES`.
//!
//! # What is instrumented
//!
//! - **Futures**: [`track`], [`FutureExt::tracked`], [`await_on`]
//! - **Deferred values**: [`deferred`]
//! - **Tasks**: [`spawn`]
//! - **Time**: [`sleep`], [`interval`]

pub use tether_tokio::*;
