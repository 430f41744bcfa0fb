//! Engine façade tying processes, the store and the task board together

use crate::board::TaskBoard;
use crate::error::Result;
use crate::models::{
    DefinitionLimits, ProcessDefinition, ProcessId, ProcessStatus, Ticket, TicketId,
};
use crate::parser::parse_definition;
use crate::process::Process;
use crate::store::{MemoryBackend, ProcessStore, SnapshotBackend};
use tracing::{debug, info};

/// Coordinates the [`ProcessStore`] and the [`TaskBoard`].
///
/// Every write goes to both, so the board always mirrors what the stored
/// DAGs consider actionable. Errors are returned as-is; nothing is retried.
#[derive(Debug)]
pub struct Engine<B = MemoryBackend> {
    processes: ProcessStore<B>,
    board: TaskBoard,
    limits: DefinitionLimits,
}

impl Engine<MemoryBackend> {
    /// Engine over an in-memory store and an empty board
    pub fn in_memory() -> Self {
        Self::new(ProcessStore::in_memory(), TaskBoard::new())
    }
}

impl Default for Engine<MemoryBackend> {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl<B: SnapshotBackend> Engine<B> {
    pub fn new(processes: ProcessStore<B>, board: TaskBoard) -> Self {
        Self {
            processes,
            board,
            limits: DefinitionLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: DefinitionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn processes(&self) -> &ProcessStore<B> {
        &self.processes
    }

    pub fn board(&self) -> &TaskBoard {
        &self.board
    }

    /// Parse `source`, schedule its initially active tasks and persist it
    pub fn start_process(&self, source: &str) -> Result<ProcessId> {
        let definition = parse_definition(source, &self.limits)?;
        self.start_definition(&definition)
    }

    pub fn start_definition(&self, definition: &ProcessDefinition) -> Result<ProcessId> {
        let mut process = Process::from_definition(definition)?;

        for task in process.active_tasks() {
            self.board.schedule(&task);
        }

        self.processes.persist(&mut process)?;
        info!(
            pid = %process.id(),
            tasks = definition.tasks.len(),
            "Process started"
        );

        Ok(process.id())
    }

    pub fn fetch_tasks(&self) -> Vec<Ticket> {
        self.board.fetch()
    }

    pub fn claim_task(&self, id: &TicketId, worker: &str) -> Result<()> {
        self.board.claim(id, worker)
    }

    pub fn release_task(&self, id: &TicketId) {
        self.board.release(id)
    }

    /// Complete the ticket's task and schedule whatever it unblocked.
    ///
    /// Every active task without a live ticket is scheduled, failed ones
    /// included: completing a sibling re-publishes a failed task for another
    /// attempt.
    ///
    /// A `Conflict` from the final persist is returned to the caller, who
    /// decides whether to retry.
    pub fn complete_task(&self, id: &TicketId, worker: &str) -> Result<()> {
        let ticket = self.board.find_live(id)?;
        let mut process = self.processes.get(&ticket.pid)?;

        process.complete(&ticket.name)?;
        self.board.complete(id, worker)?;

        let active = process.active_tasks();
        for task in &active {
            if let Some(scheduled) = self.board.schedule(task) {
                debug!(ticket = %scheduled, task = %task.name, "Unblocked task scheduled");
            }
        }

        self.processes.persist(&mut process)?;

        if active.is_empty() {
            info!(pid = %process.id(), "Process has no remaining active tasks");
        }
        Ok(())
    }

    /// Mark the ticket's task failed. Dependents of a failed task never
    /// become active. The task itself stays active and is re-published by
    /// the next sibling completion or [`reconcile`](Engine::reconcile).
    pub fn fail_task(&self, id: &TicketId, worker: &str) -> Result<()> {
        let ticket = self.board.find_live(id)?;
        let mut process = self.processes.get(&ticket.pid)?;

        process.fail(&ticket.name)?;
        self.board.fail(id, worker)?;
        self.processes.persist(&mut process)?;

        info!(pid = %process.id(), task = %ticket.name, worker, "Task failed");
        Ok(())
    }

    /// Re-publish every active task of the stored process that has no live
    /// ticket. Failed tasks stay active, so they come back too, the same as
    /// after a sibling completes in [`complete_task`](Engine::complete_task).
    ///
    /// Recovers a process whose persist lost a race after the board had
    /// already moved on. Returns the number of tickets created.
    pub fn reconcile(&self, pid: &ProcessId) -> Result<usize> {
        let process = self.processes.get(pid)?;
        let scheduled = process
            .active_tasks()
            .iter()
            .filter_map(|task| self.board.schedule(task))
            .count();

        if scheduled > 0 {
            debug!(pid = %pid, scheduled, "Process reconciled onto the board");
        }
        Ok(scheduled)
    }

    pub fn get_progress(&self, pid: &ProcessId) -> Result<u8> {
        Ok(self.processes.get(pid)?.progress())
    }

    /// Independent copy of the stored process
    pub fn process(&self, pid: &ProcessId) -> Result<Process> {
        self.processes.get(pid)
    }

    pub fn status(&self, pid: &ProcessId) -> Result<ProcessStatus> {
        let process = self.processes.get(pid)?;
        let mut active: Vec<String> = process
            .active_tasks()
            .into_iter()
            .map(|task| task.name)
            .collect();
        active.sort();

        Ok(ProcessStatus {
            pid: *pid,
            progress: process.progress(),
            complete: active.is_empty(),
            active,
        })
    }
}
