//! Core data models for flowboard

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// Default definition limits
pub const DEFAULT_MAX_DEFINITION_SIZE: usize = 1_048_576; // 1 MB
pub const DEFAULT_MAX_TASK_COUNT: usize = 1_000;
pub const DEFAULT_MAX_TASK_NAME_LEN: usize = 128;

/// Process definition parsed from YAML
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessDefinition {
    pub tasks: Vec<TaskDefinition>,
}

/// One declared task. `needs: None` (or an empty list) means "chain onto the
/// previous task".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs: Option<Vec<String>>,
}

impl TaskDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            needs: None,
        }
    }

    pub fn with_needs<I, S>(mut self, needs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.needs = Some(needs.into_iter().map(Into::into).collect());
        self
    }

    /// Explicit dependencies, or `None` when the implicit chaining rule applies
    pub fn explicit_needs(&self) -> Option<&[String]> {
        match &self.needs {
            Some(needs) if !needs.is_empty() => Some(needs.as_slice()),
            _ => None,
        }
    }
}

/// Limits enforced while parsing a definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DefinitionLimits {
    #[serde(default = "default_max_definition_size")]
    pub max_definition_size: usize,
    #[serde(default = "default_max_task_count")]
    pub max_task_count: usize,
    #[serde(default = "default_max_task_name_len")]
    pub max_task_name_len: usize,
}

impl Default for DefinitionLimits {
    fn default() -> Self {
        Self {
            max_definition_size: default_max_definition_size(),
            max_task_count: default_max_task_count(),
            max_task_name_len: default_max_task_name_len(),
        }
    }
}

fn default_max_definition_size() -> usize {
    DEFAULT_MAX_DEFINITION_SIZE
}

fn default_max_task_count() -> usize {
    DEFAULT_MAX_TASK_COUNT
}

fn default_max_task_name_len() -> usize {
    DEFAULT_MAX_TASK_NAME_LEN
}

/// Process identifier, assigned once at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(Uuid);

impl ProcessId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ProcessId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Board ticket identifier, distinct from the task name it refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(Uuid);

impl TicketId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Optimistic concurrency token. Only ever compared for equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// State of a task node inside a process graph
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Pending,
    Scheduled,
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Pending => write!(f, "pending"),
            TaskState::Scheduled => write!(f, "scheduled"),
            TaskState::InProgress => write!(f, "in-progress"),
            TaskState::Completed => write!(f, "completed"),
            TaskState::Failed => write!(f, "failed"),
        }
    }
}

/// State of a board ticket
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TicketState {
    Scheduled,
    InProgress,
    Completed,
    Failed,
}

impl TicketState {
    /// Live tickets are the ones `fetch()` shows and `schedule()` dedupes against
    pub fn is_live(self) -> bool {
        matches!(self, TicketState::Scheduled | TicketState::InProgress)
    }
}

impl fmt::Display for TicketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TicketState::Scheduled => write!(f, "scheduled"),
            TicketState::InProgress => write!(f, "in-progress"),
            TicketState::Completed => write!(f, "completed"),
            TicketState::Failed => write!(f, "failed"),
        }
    }
}

/// A task whose dependencies are satisfied and which is not yet completed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveTask {
    pub pid: ProcessId,
    pub name: String,
    pub state: TaskState,
}

/// A claimable unit of work on the board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: TicketId,
    pub name: String,
    pub pid: ProcessId,
    pub state: TicketState,
    pub assigned_to: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) seq: u64,
}

impl Ticket {
    pub fn is_live(&self) -> bool {
        self.state.is_live()
    }
}

/// Progress summary of a stored process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStatus {
    pub pid: ProcessId,
    pub progress: u8,
    pub complete: bool,
    pub active: Vec<String>,
}
