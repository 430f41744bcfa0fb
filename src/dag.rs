//! DAG of task nodes with per-node state

use crate::error::{FlowError, Result};
use crate::models::TaskState;
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashMap;

/// Node payload: the task name and its current state
#[derive(Debug, Clone, PartialEq, Eq)]
struct TaskNode {
    name: String,
    state: TaskState,
}

/// Directed acyclic graph of tasks.
///
/// An edge `u -> v` means "v requires u completed". Nodes keep insertion
/// order, and so do edges, since nothing is ever removed. Cycles and self
/// loops are rejected before an edge is inserted, so the graph is acyclic at
/// every point of its life. `Clone` yields a fully independent copy.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    graph: DiGraph<TaskNode, ()>,
    task_indices: HashMap<String, NodeIndex>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `Pending` task node
    pub fn add_task(&mut self, name: &str) -> Result<()> {
        self.add_task_with_state(name, TaskState::Pending)
    }

    /// Add a task node in a given state (used when restoring snapshots)
    pub fn add_task_with_state(&mut self, name: &str, state: TaskState) -> Result<()> {
        if self.task_indices.contains_key(name) {
            return Err(FlowError::DuplicateTask(name.to_string()));
        }

        let index = self.graph.add_node(TaskNode {
            name: name.to_string(),
            state,
        });
        self.task_indices.insert(name.to_string(), index);
        Ok(())
    }

    /// Add the edge `from -> to` ("to needs from").
    ///
    /// Fails with `CycleDetected` if `from` is already reachable from `to`
    /// (including `from == to`). Adding an existing edge again is a no-op.
    pub fn add_dependency(&mut self, from: &str, to: &str) -> Result<()> {
        let from_index = self.index_of(from)?;
        let to_index = self.index_of(to)?;

        if self.will_create_cycle(from_index, to_index) {
            return Err(FlowError::CycleDetected {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        if self.graph.find_edge(from_index, to_index).is_none() {
            self.graph.add_edge(from_index, to_index, ());
        }
        Ok(())
    }

    fn will_create_cycle(&self, from: NodeIndex, to: NodeIndex) -> bool {
        from == to || has_path_connecting(&self.graph, to, from, None)
    }

    fn index_of(&self, name: &str) -> Result<NodeIndex> {
        self.task_indices
            .get(name)
            .copied()
            .ok_or_else(|| FlowError::TaskNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.task_indices.contains_key(name)
    }

    /// Number of task nodes
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn state(&self, name: &str) -> Option<TaskState> {
        self.task_indices
            .get(name)
            .map(|&index| self.graph[index].state)
    }

    pub fn set_state(&mut self, name: &str, state: TaskState) -> Result<()> {
        let index = self.index_of(name)?;
        self.graph[index].state = state;
        Ok(())
    }

    /// Task names with their state, in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = (&str, TaskState)> + '_ {
        self.graph
            .node_indices()
            .map(move |index| (self.graph[index].name.as_str(), self.graph[index].state))
    }

    /// Edges as `(source, target)` names, in insertion order
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.graph.edge_references().map(move |edge| {
            (
                self.graph[edge.source()].name.as_str(),
                self.graph[edge.target()].name.as_str(),
            )
        })
    }

    /// Direct dependencies of a task
    pub fn dependencies(&self, name: &str) -> Vec<String> {
        match self.task_indices.get(name) {
            Some(&index) => self
                .graph
                .neighbors_directed(index, Direction::Incoming)
                .map(|idx| self.graph[idx].name.clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Direct dependents of a task
    pub fn dependents(&self, name: &str) -> Vec<String> {
        match self.task_indices.get(name) {
            Some(&index) => self
                .graph
                .neighbors_directed(index, Direction::Outgoing)
                .map(|idx| self.graph[idx].name.clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Nodes that are not completed and whose predecessors all are.
    /// Roots count as satisfied.
    pub fn ready_nodes(&self) -> impl Iterator<Item = (&str, TaskState)> + '_ {
        self.graph.node_indices().filter_map(move |index| {
            let node = &self.graph[index];
            if node.state == TaskState::Completed {
                return None;
            }

            let satisfied = self
                .graph
                .neighbors_directed(index, Direction::Incoming)
                .all(|parent| self.graph[parent].state == TaskState::Completed);

            satisfied.then_some((node.name.as_str(), node.state))
        })
    }

    pub fn completed_count(&self) -> usize {
        self.graph
            .node_indices()
            .filter(|&index| self.graph[index].state == TaskState::Completed)
            .count()
    }

    /// Topologically sorted task names
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let sorted = toposort(&self.graph, None).map_err(|cycle| {
            let name = self.graph[cycle.node_id()].name.clone();
            FlowError::CycleDetected {
                from: name.clone(),
                to: name,
            }
        })?;

        Ok(sorted
            .into_iter()
            .map(|index| self.graph[index].name.clone())
            .collect())
    }
}
