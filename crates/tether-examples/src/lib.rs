//! Scenarios that drive the Tokio adapter and return the graph behind the
//! point they finish at.

pub mod scenarios;
