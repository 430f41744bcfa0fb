//! Task board: claimable tickets for active tasks
//!
//! Each ticket points at one `(process id, task name)` pair. At most one live
//! (scheduled or in-progress) ticket exists per pair. Tickets that reach a
//! terminal state stay on the board for auditing but drop out of
//! [`TaskBoard::fetch`].
//!
//! Arbitration happens per ticket: `claim` runs its check-and-set under the
//! ticket's own map entry, never under a board-wide lock.

use crate::error::{FlowError, Result};
use crate::models::{ActiveTask, ProcessId, Ticket, TicketId, TicketState};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

type TaskKey = (ProcessId, String);

#[derive(Debug, Default)]
pub struct TaskBoard {
    tickets: DashMap<TicketId, Ticket>,
    // Lock order: `live` before `tickets`. Never take a `live` entry while
    // holding a `tickets` guard.
    live: DashMap<TaskKey, TicketId>,
    sequence: AtomicU64,
}

impl TaskBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a ticket for `task` on the board.
    ///
    /// Returns `None` when a live ticket for the same `(pid, name)` already
    /// exists. A pair whose previous ticket completed or failed gets a new one.
    pub fn schedule(&self, task: &ActiveTask) -> Option<TicketId> {
        match self.live.entry((task.pid, task.name.clone())) {
            Entry::Occupied(mut entry) => {
                let existing = *entry.get();
                let still_live = self
                    .tickets
                    .get(&existing)
                    .map(|ticket| ticket.is_live())
                    .unwrap_or(false);
                if still_live {
                    return None;
                }

                let id = self.insert_ticket(task);
                entry.insert(id);
                Some(id)
            }
            Entry::Vacant(entry) => {
                let id = self.insert_ticket(task);
                entry.insert(id);
                Some(id)
            }
        }
    }

    fn insert_ticket(&self, task: &ActiveTask) -> TicketId {
        let id = TicketId::new();
        let ticket = Ticket {
            id,
            name: task.name.clone(),
            pid: task.pid,
            state: TicketState::Scheduled,
            assigned_to: None,
            scheduled_at: Utc::now(),
            seq: self.sequence.fetch_add(1, Ordering::Relaxed),
        };
        self.tickets.insert(id, ticket);
        debug!(ticket = %id, pid = %task.pid, task = %task.name, "Task scheduled");
        id
    }

    /// Take a ticket off the board entirely, whatever its state.
    ///
    /// Unlike `complete`/`fail` nothing is retained. Returns the removed
    /// ticket, or `None` for an unknown id.
    pub fn unschedule(&self, id: &TicketId) -> Option<Ticket> {
        let key = self
            .tickets
            .get(id)
            .map(|ticket| (ticket.pid, ticket.name.clone()))?;

        // The `tickets` guard above is already dropped; see the lock order.
        self.live.remove_if(&key, |_, live_id| live_id == id);
        let (_, ticket) = self.tickets.remove(id)?;
        debug!(ticket = %id, task = %ticket.name, "Ticket unscheduled");
        Some(ticket)
    }

    /// Live tickets in scheduling order
    pub fn fetch(&self) -> Vec<Ticket> {
        let mut tickets: Vec<Ticket> = self
            .tickets
            .iter()
            .filter(|entry| entry.is_live())
            .map(|entry| entry.value().clone())
            .collect();
        tickets.sort_by_key(|ticket| ticket.seq);
        tickets
    }

    /// Every ticket ever scheduled, terminal ones included
    pub fn history(&self) -> Vec<Ticket> {
        let mut tickets: Vec<Ticket> = self
            .tickets
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        tickets.sort_by_key(|ticket| ticket.seq);
        tickets
    }

    /// Ticket in any state
    pub fn get(&self, id: &TicketId) -> Result<Ticket> {
        self.tickets
            .get(id)
            .map(|ticket| ticket.value().clone())
            .ok_or_else(|| FlowError::TicketNotFound(id.to_string()))
    }

    /// Ticket that is still scheduled or in progress
    pub fn find_live(&self, id: &TicketId) -> Result<Ticket> {
        let ticket = self.get(id)?;
        if !ticket.is_live() {
            return Err(FlowError::TicketNotFound(id.to_string()));
        }
        Ok(ticket)
    }

    /// Number of live tickets
    pub fn len(&self) -> usize {
        self.tickets.iter().filter(|entry| entry.is_live()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Assign the ticket to `worker`.
    ///
    /// Succeeds for a fresh claim on a scheduled ticket and for a repeat
    /// claim by the current owner. A different worker gets `ClaimConflict`,
    /// as does anyone claiming a completed or failed ticket.
    pub fn claim(&self, id: &TicketId, worker: &str) -> Result<()> {
        let mut ticket = self
            .tickets
            .get_mut(id)
            .ok_or_else(|| FlowError::TicketNotFound(id.to_string()))?;

        let owned = ticket.assigned_to.as_deref() == Some(worker);
        let claimable = ticket.state == TicketState::Scheduled || owned;
        if !claimable || !ticket.is_live() {
            let owner = ticket.assigned_to.clone().unwrap_or_default();
            debug!(ticket = %id, worker, owner = %owner, "Claim rejected");
            return Err(FlowError::ClaimConflict {
                ticket: id.to_string(),
                owner,
            });
        }

        ticket.state = TicketState::InProgress;
        ticket.assigned_to = Some(worker.to_string());
        debug!(ticket = %id, worker, task = %ticket.name, "Ticket claimed");
        Ok(())
    }

    /// Put a live ticket back up for grabs, whoever holds it. Unknown or
    /// terminal tickets are left alone.
    pub fn release(&self, id: &TicketId) {
        if let Some(mut ticket) = self.tickets.get_mut(id) {
            if ticket.is_live() {
                ticket.state = TicketState::Scheduled;
                ticket.assigned_to = None;
                debug!(ticket = %id, task = %ticket.name, "Ticket released");
            }
        }
    }

    pub fn complete(&self, id: &TicketId, worker: &str) -> Result<()> {
        self.finish(id, worker, TicketState::Completed)
    }

    pub fn fail(&self, id: &TicketId, worker: &str) -> Result<()> {
        self.finish(id, worker, TicketState::Failed)
    }

    fn finish(&self, id: &TicketId, worker: &str, state: TicketState) -> Result<()> {
        let key = {
            let mut ticket = self
                .tickets
                .get_mut(id)
                .ok_or_else(|| FlowError::TicketNotFound(id.to_string()))?;

            if !ticket.is_live() {
                return Err(FlowError::TicketNotFound(id.to_string()));
            }

            if ticket.assigned_to.as_deref() != Some(worker) {
                warn!(ticket = %id, worker, "Ticket not assigned to worker");
                return Err(FlowError::AssignmentMismatch {
                    ticket: id.to_string(),
                    worker: worker.to_string(),
                });
            }

            ticket.state = state;
            debug!(ticket = %id, worker, task = %ticket.name, state = %state, "Ticket finished");
            (ticket.pid, ticket.name.clone())
        };

        self.live.remove_if(&key, |_, live_id| live_id == id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskState;

    fn task(pid: ProcessId, name: &str) -> ActiveTask {
        ActiveTask {
            pid,
            name: name.to_string(),
            state: TaskState::Pending,
        }
    }

    fn board_with_one() -> (TaskBoard, TicketId, ProcessId) {
        let board = TaskBoard::new();
        let pid = ProcessId::new();
        let id = board.schedule(&task(pid, "A")).unwrap();
        (board, id, pid)
    }

    #[test]
    fn test_schedule_creates_scheduled_ticket() {
        let (board, id, pid) = board_with_one();
        let tickets = board.fetch();

        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].id, id);
        assert_eq!(tickets[0].pid, pid);
        assert_eq!(tickets[0].name, "A");
        assert_eq!(tickets[0].state, TicketState::Scheduled);
        assert_eq!(tickets[0].assigned_to, None);
    }

    #[test]
    fn test_schedule_is_idempotent() {
        let (board, _, pid) = board_with_one();
        assert_eq!(board.schedule(&task(pid, "A")), None);
        assert_eq!(board.len(), 1);

        // Same name in a different process is a different unit of work.
        assert!(board.schedule(&task(ProcessId::new(), "A")).is_some());
        assert_eq!(board.len(), 2);
    }

    #[test]
    fn test_schedule_and_unschedule() {
        let (board, id, pid) = board_with_one();
        assert_eq!(board.len(), 1);

        let removed = board.unschedule(&id).unwrap();
        assert_eq!(removed.name, "A");
        assert_eq!(board.len(), 0);
        assert!(board.history().is_empty());
        assert!(matches!(board.get(&id), Err(FlowError::TicketNotFound(_))));

        // The pair is free again.
        assert!(board.schedule(&task(pid, "A")).is_some());
        assert_eq!(board.len(), 1);

        assert!(board.unschedule(&TicketId::new()).is_none());
    }

    #[test]
    fn test_unschedule_terminal_ticket_keeps_live_successor() {
        let (board, id, pid) = board_with_one();
        board.claim(&id, "w1").unwrap();
        board.fail(&id, "w1").unwrap();
        let retry = board.schedule(&task(pid, "A")).unwrap();

        board.unschedule(&id).unwrap();
        assert_eq!(board.history().len(), 1);
        assert_eq!(board.schedule(&task(pid, "A")), None);
        assert_eq!(board.fetch()[0].id, retry);
    }

    #[test]
    fn test_fetch_preserves_scheduling_order() {
        let board = TaskBoard::new();
        let pid = ProcessId::new();
        for name in ["C", "A", "B"] {
            board.schedule(&task(pid, name));
        }

        let names: Vec<String> = board.fetch().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_claim_and_release() {
        let (board, id, _) = board_with_one();

        board.claim(&id, "svc.worker").unwrap();
        let claimed = board.get(&id).unwrap();
        assert_eq!(claimed.assigned_to.as_deref(), Some("svc.worker"));
        assert_eq!(claimed.state, TicketState::InProgress);

        board.release(&id);
        let released = board.get(&id).unwrap();
        assert_eq!(released.assigned_to, None);
        assert_eq!(released.state, TicketState::Scheduled);

        // Unknown tickets are ignored.
        board.release(&TicketId::new());
    }

    #[test]
    fn test_claim_conflict_and_repeat_claim() {
        let (board, id, _) = board_with_one();

        board.claim(&id, "w1").unwrap();
        let err = board.claim(&id, "w2").unwrap_err();
        assert!(matches!(err, FlowError::ClaimConflict { ref owner, .. } if owner == "w1"));

        board.claim(&id, "w1").unwrap();
        let ticket = board.get(&id).unwrap();
        assert_eq!(ticket.state, TicketState::InProgress);
        assert_eq!(ticket.assigned_to.as_deref(), Some("w1"));
    }

    #[test]
    fn test_claim_unknown_ticket() {
        let board = TaskBoard::new();
        assert!(matches!(
            board.claim(&TicketId::new(), "w1"),
            Err(FlowError::TicketNotFound(_))
        ));
    }

    #[test]
    fn test_complete_requires_owner() {
        let (board, id, _) = board_with_one();
        board.claim(&id, "w1").unwrap();

        assert!(matches!(
            board.complete(&id, "other"),
            Err(FlowError::AssignmentMismatch { .. })
        ));
        assert_eq!(board.len(), 1);

        board.complete(&id, "w1").unwrap();
        assert!(board.fetch().is_empty());
        assert_eq!(board.get(&id).unwrap().state, TicketState::Completed);
        assert_eq!(board.history().len(), 1);
    }

    #[test]
    fn test_unclaimed_ticket_cannot_be_completed() {
        let (board, id, _) = board_with_one();
        assert!(matches!(
            board.complete(&id, "w1"),
            Err(FlowError::AssignmentMismatch { .. })
        ));
    }

    #[test]
    fn test_fail_requires_owner() {
        let (board, id, _) = board_with_one();
        board.claim(&id, "w1").unwrap();

        assert!(board.fail(&id, "other").is_err());
        board.fail(&id, "w1").unwrap();

        assert!(board.is_empty());
        assert_eq!(board.get(&id).unwrap().state, TicketState::Failed);
    }

    #[test]
    fn test_terminal_tickets_are_frozen() {
        let (board, id, _) = board_with_one();
        board.claim(&id, "w1").unwrap();
        board.complete(&id, "w1").unwrap();

        assert!(matches!(
            board.claim(&id, "w1"),
            Err(FlowError::ClaimConflict { .. })
        ));
        board.release(&id);
        assert_eq!(board.get(&id).unwrap().state, TicketState::Completed);
        assert!(matches!(
            board.fail(&id, "w1"),
            Err(FlowError::TicketNotFound(_))
        ));
        assert!(board.find_live(&id).is_err());
    }

    #[test]
    fn test_reschedule_after_terminal_ticket() {
        let (board, id, pid) = board_with_one();
        board.claim(&id, "w1").unwrap();
        board.fail(&id, "w1").unwrap();

        let retry = board.schedule(&task(pid, "A")).unwrap();
        assert_ne!(retry, id);
        assert_eq!(board.len(), 1);
        assert_eq!(board.history().len(), 2);
    }
}
