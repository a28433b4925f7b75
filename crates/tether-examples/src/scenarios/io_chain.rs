//! Two timers awaited back to back inside one task.
//!
//! The second timer is started from the first await's context, so it opens a
//! new I/O sequence chained after that await.

use std::time::Duration;

use tether_types::GraphSnapshot;

use super::graph_of;

pub async fn run() -> Result<GraphSnapshot, String> {
    let profile = tether::spawn("fetch.profile", async {
        tether::await_on(tether::sleep(Duration::from_millis(2))).await;
        tether::await_on(tether::sleep(Duration::from_millis(1))).await;
        tether::current_sequence()
    });
    let sequence = profile
        .await
        .map_err(|e| format!("fetch.profile task failed: {e}"))?;
    graph_of(sequence, "io-chain")
}
