//! Races between concurrent callers on the board and the store

use flowboard::board::TaskBoard;
use flowboard::engine::Engine;
use flowboard::error::FlowError;
use flowboard::models::{ActiveTask, ProcessId, TaskState, TicketState};
use flowboard::process::Process;
use flowboard::store::ProcessStore;
use std::sync::Barrier;
use std::thread;

const THREADS: usize = 16;

#[test]
fn test_only_one_worker_wins_a_claim() {
    let board = TaskBoard::new();
    let task = ActiveTask {
        pid: ProcessId::new(),
        name: "A".to_string(),
        state: TaskState::Pending,
    };
    let id = board.schedule(&task).unwrap();
    let barrier = Barrier::new(THREADS);

    let results: Vec<(String, bool)> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|n| {
                let board = &board;
                let barrier = &barrier;
                s.spawn(move || {
                    let worker = format!("w{n}");
                    barrier.wait();
                    let won = board.claim(&id, &worker).is_ok();
                    (worker, won)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners: Vec<&String> = results.iter().filter(|(_, won)| *won).map(|(w, _)| w).collect();
    assert_eq!(winners.len(), 1);

    let ticket = board.get(&id).unwrap();
    assert_eq!(ticket.state, TicketState::InProgress);
    assert_eq!(ticket.assigned_to.as_ref(), Some(winners[0]));
}

#[test]
fn test_concurrent_schedule_creates_one_ticket() {
    let board = TaskBoard::new();
    let pid = ProcessId::new();
    let barrier = Barrier::new(THREADS);

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                barrier.wait();
                board.schedule(&ActiveTask {
                    pid,
                    name: "A".to_string(),
                    state: TaskState::Pending,
                });
            });
        }
    });

    assert_eq!(board.fetch().len(), 1);
    assert_eq!(board.history().len(), 1);
}

#[test]
fn test_only_one_persist_wins_per_version() {
    let store = ProcessStore::in_memory();
    let mut process = Process::start("tasks:\n  - name: A\n  - name: B\n").unwrap();
    store.persist(&mut process).unwrap();
    let pid = process.id();
    let barrier = Barrier::new(THREADS);

    let outcomes: Vec<Result<(), FlowError>> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let store = &store;
                let barrier = &barrier;
                s.spawn(move || {
                    let mut copy = store.get(&pid).unwrap();
                    copy.complete("A").unwrap();
                    barrier.wait();
                    store.persist(&mut copy).map(|_| ())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let successes = outcomes.iter().filter(|r| r.is_ok()).count();
    let conflicts = outcomes
        .iter()
        .filter(|r| matches!(r, Err(FlowError::Conflict { .. })))
        .count();
    assert_eq!(successes, 1);
    assert_eq!(conflicts, THREADS - 1);
}

#[test]
fn test_parallel_workers_drain_engine() {
    let engine = Engine::in_memory();
    let pid = engine
        .start_process(
            "tasks:\n  - name: A\n  - name: B\n    needs: [A]\n  - name: C\n    needs: [A]\n  - name: D\n    needs: [A]\n  - name: E\n    needs: [B, C, D]\n",
        )
        .unwrap();

    thread::scope(|s| {
        for n in 0..4 {
            let engine = &engine;
            s.spawn(move || {
                let worker = format!("w{n}");
                for _ in 0..100_000 {
                    // Lost persists can leave duplicate tickets behind; drain them too.
                    if engine.process(&pid).unwrap().is_complete()
                        && engine.fetch_tasks().is_empty()
                    {
                        break;
                    }
                    let Some(ticket) = engine
                        .fetch_tasks()
                        .into_iter()
                        .find(|t| t.assigned_to.is_none())
                    else {
                        engine.reconcile(&pid).unwrap();
                        thread::yield_now();
                        continue;
                    };
                    if engine.claim_task(&ticket.id, &worker).is_err() {
                        continue;
                    }
                    match engine.complete_task(&ticket.id, &worker) {
                        Ok(()) | Err(FlowError::Conflict { .. }) => {}
                        Err(err) => panic!("unexpected error: {err}"),
                    }
                }
            });
        }
    });

    assert_eq!(engine.get_progress(&pid).unwrap(), 100);
    assert!(engine.fetch_tasks().is_empty());
}
