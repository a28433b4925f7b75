//! Nested tracked futures: an outer body awaits an inner one, which awaits a
//! timer. Each promise ends up awaiting the await that finished it.

use std::time::Duration;

use tether::FutureExt as _;
use tether_types::GraphSnapshot;

use super::graph_of;

pub async fn run() -> Result<GraphSnapshot, String> {
    let render = tether::spawn("render.page", async {
        let outer = async {
            let inner = async {
                tether::await_on(tether::sleep(Duration::from_millis(1))).await;
                21_u32
            }
            .tracked();
            tether::await_on(inner).await * 2
        }
        .tracked();
        let answer = tether::await_on(outer).await;
        (answer, tether::current_sequence())
    });
    let (answer, sequence) = render
        .await
        .map_err(|e| format!("render.page task failed: {e}"))?;
    if answer != 42 {
        return Err(format!("await-chain computed {answer}, expected 42"));
    }
    graph_of(sequence, "await-chain")
}
