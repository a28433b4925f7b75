use facet::Facet;
use std::collections::HashSet;

use crate::{AsyncSequence, SequenceId, SequenceKind, Stack, StackSlot};

/// Serializable view of one node. Links are expressed as [`SequenceId`]s.
#[derive(Facet, Debug, Clone, PartialEq)]
pub struct SequenceSnapshot {
    pub id: SequenceId,
    pub kind: SequenceKind,
    pub owner: Option<String>,
    pub stack: Option<Stack>,
    /// An awaited ancestor carries the stack for this node.
    pub stack_inherited: bool,
    pub start_ns: u64,
    pub end_ns: Option<u64>,
    /// Whether the described value was still alive when the snapshot was taken.
    pub promise_live: bool,
    pub awaited: Option<SequenceId>,
    pub previous: Option<SequenceId>,
}

/// Every node reachable from `root`, root first.
#[derive(Facet, Debug, Clone, PartialEq)]
pub struct GraphSnapshot {
    pub root: SequenceId,
    pub nodes: Vec<SequenceSnapshot>,
}

impl GraphSnapshot {
    pub fn node(&self, id: SequenceId) -> Option<&SequenceSnapshot> {
        self.nodes.iter().find(|node| node.id == id)
    }
}

impl AsyncSequence {
    pub fn snapshot(&self) -> SequenceSnapshot {
        let id = self.id();
        self.read(|state| SequenceSnapshot {
            id,
            kind: state.kind,
            owner: state.owner.as_ref().map(|owner| owner.name().to_owned()),
            stack: state.stack.captured().cloned(),
            stack_inherited: matches!(state.stack, StackSlot::Inherited),
            start_ns: state.start.as_nanos(),
            end_ns: state.end.map(|end| end.as_nanos()),
            promise_live: state.promise().is_some(),
            awaited: state.awaited.as_ref().map(AsyncSequence::id),
            previous: state.previous.as_ref().map(AsyncSequence::id),
        })
    }

    /// Snapshots this node and everything it causally depends on.
    pub fn graph_snapshot(&self) -> GraphSnapshot {
        let mut nodes = Vec::new();
        let mut visited = HashSet::new();
        let mut pending = vec![self.clone()];
        while let Some(node) = pending.pop() {
            if !visited.insert(node.id()) {
                continue;
            }
            // previous pushed first so awaited is walked first
            pending.extend(node.previous());
            pending.extend(node.awaited());
            nodes.push(node.snapshot());
        }
        GraphSnapshot {
            root: self.id(),
            nodes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Owner, SequenceState, Timestamp};

    fn node(kind: SequenceKind, awaited: Option<&AsyncSequence>, previous: Option<&AsyncSequence>) -> AsyncSequence {
        AsyncSequence::new(SequenceState {
            kind,
            owner: Some(Owner::named("page")),
            stack: StackSlot::Inherited,
            start: Timestamp::from_nanos(10),
            end: Some(Timestamp::from_nanos(20)),
            promise: None,
            awaited: awaited.cloned(),
            previous: previous.cloned(),
        })
    }

    #[test]
    fn graph_snapshot_visits_shared_nodes_once() {
        let io = node(SequenceKind::Io, None, None);
        let promise = node(SequenceKind::Promise, Some(&io), None);
        let await_node = node(SequenceKind::Await, Some(&promise), Some(&io));

        let graph = await_node.graph_snapshot();
        assert_eq!(graph.root, await_node.id());
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.nodes[0].id, await_node.id());

        let root = graph.node(await_node.id()).expect("root is in the graph");
        assert_eq!(root.awaited, Some(promise.id()));
        assert_eq!(root.previous, Some(io.id()));
        assert_eq!(root.owner.as_deref(), Some("page"));
        assert!(root.stack_inherited);
        assert_eq!(root.end_ns, Some(20));
    }

    #[test]
    fn snapshot_serializes_as_json() {
        let io = node(SequenceKind::Io, None, None);
        let bytes = facet_json::to_vec(&io.graph_snapshot()).expect("graph snapshot serializes");
        let json = String::from_utf8(bytes).expect("json is utf-8");
        assert!(json.contains("\"start_ns\":10"), "unexpected json: {json}");
    }
}
