//! A running process: a task DAG plus an optimistic concurrency version

use crate::dag::TaskGraph;
use crate::error::{FlowError, Result};
use crate::models::{
    ActiveTask, DefinitionLimits, ProcessDefinition, ProcessId, TaskState, Version,
};
use crate::parser::parse_definition;
use crate::snapshot::{GraphSnapshot, ProcessSnapshot};
use std::collections::HashSet;

/// One running instance of a process definition.
///
/// A process is only mutated through [`complete`](Process::complete) and
/// [`fail`](Process::fail). Neither cascades; callers re-read
/// [`active_tasks`](Process::active_tasks) afterwards.
#[derive(Debug)]
pub struct Process {
    id: ProcessId,
    version: Option<Version>,
    graph: TaskGraph,
}

impl Process {
    /// Build a process from YAML definition text using default limits
    pub fn start(source: &str) -> Result<Self> {
        Self::start_with_limits(source, &DefinitionLimits::default())
    }

    pub fn start_with_limits(source: &str, limits: &DefinitionLimits) -> Result<Self> {
        let definition = parse_definition(source, limits)?;
        Self::from_definition(&definition)
    }

    /// Build a process from an already parsed definition.
    ///
    /// Explicit `needs` add one edge per entry. A task without `needs` that is
    /// not the first one depends on the task declared immediately before it,
    /// and only on that task.
    pub fn from_definition(definition: &ProcessDefinition) -> Result<Self> {
        if definition.tasks.is_empty() {
            return Err(FlowError::EmptyDefinition);
        }

        let mut seen = HashSet::with_capacity(definition.tasks.len());
        for task in &definition.tasks {
            if !seen.insert(task.name.as_str()) {
                return Err(FlowError::DuplicateTask(task.name.clone()));
            }
        }

        let mut graph = TaskGraph::new();
        for task in &definition.tasks {
            graph.add_task(&task.name)?;
        }

        for (index, task) in definition.tasks.iter().enumerate() {
            match task.explicit_needs() {
                Some(needs) => {
                    for need in needs {
                        if !graph.contains(need) {
                            return Err(FlowError::MissingDependency {
                                task: task.name.clone(),
                                dependency: need.clone(),
                            });
                        }
                        graph.add_dependency(need, &task.name)?;
                    }
                }
                None if index > 0 => {
                    let previous = &definition.tasks[index - 1];
                    graph.add_dependency(&previous.name, &task.name)?;
                }
                None => {}
            }
        }

        Ok(Self {
            id: ProcessId::new(),
            version: None,
            graph,
        })
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// `None` until the process has been persisted once
    pub fn version(&self) -> Option<Version> {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: Version) {
        self.version = Some(version);
    }

    /// Tasks that are not completed and whose dependencies all are.
    /// Order is not significant.
    pub fn active_tasks(&self) -> Vec<ActiveTask> {
        self.graph
            .ready_nodes()
            .map(|(name, state)| ActiveTask {
                pid: self.id,
                name: name.to_string(),
                state,
            })
            .collect()
    }

    /// Completed percentage, truncated
    pub fn progress(&self) -> u8 {
        let total = self.graph.len();
        if total == 0 {
            return 100;
        }
        (100 * self.graph.completed_count() / total) as u8
    }

    /// True when nothing is active. A failed task stays active, so a process
    /// blocked behind one never reports complete.
    pub fn is_complete(&self) -> bool {
        self.graph.ready_nodes().next().is_none()
    }

    pub fn complete(&mut self, task: &str) -> Result<()> {
        self.graph.set_state(task, TaskState::Completed)
    }

    pub fn fail(&mut self, task: &str) -> Result<()> {
        self.graph.set_state(task, TaskState::Failed)
    }

    pub fn task_state(&self, task: &str) -> Option<TaskState> {
        self.graph.state(task)
    }

    /// All task names with their states, in declaration order
    pub fn tasks(&self) -> impl Iterator<Item = (&str, TaskState)> + '_ {
        self.graph.nodes()
    }

    pub fn topological_order(&self) -> Result<Vec<String>> {
        self.graph.topological_order()
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn export(&self) -> ProcessSnapshot {
        ProcessSnapshot {
            id: self.id,
            version: self.version,
            graph: GraphSnapshot::from(&self.graph),
        }
    }

    /// Rebuild a process from a snapshot. The result shares nothing with the
    /// snapshot or with any other process.
    pub fn import(snapshot: &ProcessSnapshot) -> Result<Self> {
        Ok(Self {
            id: snapshot.id,
            version: snapshot.version,
            graph: snapshot.graph.to_graph()?,
        })
    }
}
