//! Error types for flowboard

use thiserror::Error;

/// Flowboard error types
#[derive(Error, Debug)]
pub enum FlowError {
    /// YAML parsing errors
    #[error("Could not load process definition: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// Definition text exceeded the configured size limit
    #[error("Process definition exceeds {limit} bytes (size: {size} bytes)")]
    DefinitionSizeExceeded { size: usize, limit: usize },

    /// Definition declares no tasks
    #[error("Process definition declares no tasks")]
    EmptyDefinition,

    /// Task count exceeded limit
    #[error("Task count {count} exceeds limit of {limit}")]
    TaskCountExceeded { count: usize, limit: usize },

    /// Task name validation error
    #[error("Task name '{name}' exceeds {max} characters")]
    TaskNameTooLong { name: String, max: usize },

    /// Empty or otherwise unusable task name
    #[error("Invalid task name '{name}'")]
    InvalidTaskName { name: String },

    /// Task names must be unique within a definition
    #[error("Task names must be unique: '{0}' is declared more than once")]
    DuplicateTask(String),

    /// `needs` references a task that was never declared
    #[error("\"{task}\" references non-existent \"{dependency}\" task")]
    MissingDependency { task: String, dependency: String },

    /// Adding `from -> to` would close a loop
    #[error("Loops in the process definition are not allowed: {from} -> {to}")]
    CycleDetected { from: String, to: String },

    #[error("Process {0} not found")]
    ProcessNotFound(String),

    #[error("Ticket {0} not found")]
    TicketNotFound(String),

    /// Unknown task name inside a known process
    #[error("Task '{0}' not found")]
    TaskNotFound(String),

    /// Stale version on persist
    #[error("Process {pid} has changed since last fetched. Try again.")]
    Conflict { pid: String },

    /// Ticket already owned by a different worker
    #[error("Ticket {ticket} is already claimed by {owner}")]
    ClaimConflict { ticket: String, owner: String },

    /// Complete/fail by a worker that does not hold the ticket
    #[error("Ticket {ticket} is not assigned to {worker}")]
    AssignmentMismatch { ticket: String, worker: String },

    /// Snapshot (de)serialization errors
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

/// Coarse classification of [`FlowError`] for callers deciding whether to retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Definition,
    Cycle,
    NotFound,
    Conflict,
    ClaimConflict,
    AssignmentMismatch,
    Internal,
}

impl ErrorKind {
    /// Whether re-fetching and retrying can succeed
    pub fn is_recoverable(self) -> bool {
        matches!(self, ErrorKind::Conflict | ErrorKind::ClaimConflict)
    }
}

impl FlowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FlowError::YamlParse(_)
            | FlowError::DefinitionSizeExceeded { .. }
            | FlowError::EmptyDefinition
            | FlowError::TaskCountExceeded { .. }
            | FlowError::TaskNameTooLong { .. }
            | FlowError::InvalidTaskName { .. }
            | FlowError::DuplicateTask(_)
            | FlowError::MissingDependency { .. } => ErrorKind::Definition,
            FlowError::CycleDetected { .. } => ErrorKind::Cycle,
            FlowError::ProcessNotFound(_)
            | FlowError::TicketNotFound(_)
            | FlowError::TaskNotFound(_) => ErrorKind::NotFound,
            FlowError::Conflict { .. } => ErrorKind::Conflict,
            FlowError::ClaimConflict { .. } => ErrorKind::ClaimConflict,
            FlowError::AssignmentMismatch { .. } => ErrorKind::AssignmentMismatch,
            FlowError::Snapshot(_) | FlowError::Io(_) | FlowError::Config(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Result type alias using FlowError
pub type Result<T> = std::result::Result<T, FlowError>;
