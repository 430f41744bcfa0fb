//! Portable process snapshots
//!
//! These shapes are the contract between a [`Process`](crate::process::Process)
//! and whatever stores or transports it:
//!
//! ```json
//! { "id": "…", "version": 3,
//!   "graph": { "options": { "allowSelfLoops": false, "multi": false, "type": "directed" },
//!              "nodes": [ { "key": "A", "attributes": { "state": "completed" } } ],
//!              "edges": [ { "key": "A->B", "source": "A", "target": "B" } ] } }
//! ```

use crate::dag::TaskGraph;
use crate::error::Result;
use crate::models::{ProcessId, TaskState, Version};
use serde::{Deserialize, Serialize};

/// Self-contained serialized process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub id: ProcessId,
    pub version: Option<Version>,
    pub graph: GraphSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub options: GraphOptions,
    pub nodes: Vec<NodeSnapshot>,
    #[serde(default)]
    pub edges: Vec<EdgeSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphOptions {
    pub allow_self_loops: bool,
    pub multi: bool,
    #[serde(rename = "type")]
    pub graph_type: GraphType,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            allow_self_loops: false,
            multi: false,
            graph_type: GraphType::Directed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphType {
    Directed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub key: String,
    pub attributes: NodeAttributes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAttributes {
    pub state: TaskState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSnapshot {
    pub key: String,
    pub source: String,
    pub target: String,
}

impl EdgeSnapshot {
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            key: format!("{source}->{target}"),
            source: source.to_string(),
            target: target.to_string(),
        }
    }
}

impl From<&TaskGraph> for GraphSnapshot {
    fn from(graph: &TaskGraph) -> Self {
        Self {
            options: GraphOptions::default(),
            nodes: graph
                .nodes()
                .map(|(name, state)| NodeSnapshot {
                    key: name.to_string(),
                    attributes: NodeAttributes { state },
                })
                .collect(),
            edges: graph
                .edges()
                .map(|(source, target)| EdgeSnapshot::new(source, target))
                .collect(),
        }
    }
}

impl GraphSnapshot {
    /// Rebuild an owned graph. The same validation as construction applies,
    /// so a tampered snapshot cannot smuggle in a cycle or a dangling edge.
    pub fn to_graph(&self) -> Result<TaskGraph> {
        let mut graph = TaskGraph::new();
        for node in &self.nodes {
            graph.add_task_with_state(&node.key, node.attributes.state)?;
        }
        for edge in &self.edges {
            graph.add_dependency(&edge.source, &edge.target)?;
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlowError;
    use serde_json::json;

    #[test]
    fn test_graph_snapshot_shape() {
        let mut graph = TaskGraph::new();
        graph.add_task("A").unwrap();
        graph.add_task("B").unwrap();
        graph.add_dependency("A", "B").unwrap();
        graph.set_state("A", TaskState::Completed).unwrap();

        let value = serde_json::to_value(GraphSnapshot::from(&graph)).unwrap();
        assert_eq!(
            value,
            json!({
                "options": { "allowSelfLoops": false, "multi": false, "type": "directed" },
                "nodes": [
                    { "key": "A", "attributes": { "state": "completed" } },
                    { "key": "B", "attributes": { "state": "pending" } }
                ],
                "edges": [ { "key": "A->B", "source": "A", "target": "B" } ]
            })
        );
    }

    #[test]
    fn test_to_graph_rejects_cycles() {
        let snapshot: GraphSnapshot = serde_json::from_value(json!({
            "nodes": [
                { "key": "A", "attributes": { "state": "pending" } },
                { "key": "B", "attributes": { "state": "pending" } }
            ],
            "edges": [
                { "key": "A->B", "source": "A", "target": "B" },
                { "key": "B->A", "source": "B", "target": "A" }
            ]
        }))
        .unwrap();

        assert!(matches!(
            snapshot.to_graph(),
            Err(FlowError::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_to_graph_rejects_dangling_edge() {
        let snapshot = GraphSnapshot {
            options: GraphOptions::default(),
            nodes: vec![NodeSnapshot {
                key: "A".to_string(),
                attributes: NodeAttributes {
                    state: TaskState::Pending,
                },
            }],
            edges: vec![EdgeSnapshot::new("A", "ghost")],
        };

        assert!(matches!(
            snapshot.to_graph(),
            Err(FlowError::TaskNotFound(name)) if name == "ghost"
        ));
    }
}
