//! A consumer awaits a deferred value that a separate producer task settles.
//!
//! The consumer's await is resumed by the producer, so its causal edge is
//! split: the first leg still awaits the deferred value, the live node awaits
//! the producer's context.

use std::time::Duration;

use tether_types::GraphSnapshot;

use super::graph_of;

pub async fn run() -> Result<GraphSnapshot, String> {
    let (pending, settle) = tether::deferred::<u32>();

    let consumer = tether::spawn("consumer", async move {
        let value = tether::await_on(pending).await;
        (value, tether::current_sequence())
    });
    let producer = tether::spawn("producer", async move {
        tether::await_on(tether::sleep(Duration::from_millis(1))).await;
        settle.settle(7).is_ok()
    });

    let delivered = producer
        .await
        .map_err(|e| format!("producer task failed: {e}"))?;
    if !delivered {
        return Err("producer could not deliver: consumer dropped the deferred value".to_owned());
    }
    let (value, sequence) = consumer
        .await
        .map_err(|e| format!("consumer task failed: {e}"))?;
    let value = value.map_err(|e| format!("deferred value was never settled: {e}"))?;
    if value != 7 {
        return Err(format!("consumer received {value}, expected 7"));
    }
    graph_of(sequence, "cross-context-settle")
}
