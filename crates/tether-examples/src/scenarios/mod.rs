pub mod await_chain;
pub mod cross_context_settle;
pub mod io_chain;

use tether_types::{AsyncSequence, GraphSnapshot};
use tracing::debug;

pub(crate) fn graph_of(sequence: Option<AsyncSequence>, scenario: &str) -> Result<GraphSnapshot, String> {
    let sequence = sequence.ok_or_else(|| {
        format!("{scenario}: nothing tracked led to the final step; is the tracker installed?")
    })?;
    let graph = sequence.graph_snapshot();
    debug!(scenario, nodes = graph.nodes.len(), root = %graph.root, "captured causality graph");
    Ok(graph)
}
