//! CLI interface for flowboard

use crate::engine::Engine;
use crate::error::FlowError;
use crate::logging::{init_logging, LogConfig, LogFormat, LogLevel};
use crate::models::{ProcessId, TaskState};
use crate::parser::parse_definition_file;
use crate::process::Process;
use crate::settings::Settings;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Flowboard - DAG process engine with a claimable task board
#[derive(Parser, Debug)]
#[command(name = "flowboard")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "DAG process engine with a claimable task board", long_about = None)]
pub struct Cli {
    /// Settings file (yaml, toml or json)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); overrides settings
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json or pretty); overrides settings
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a process definition and show its DAG
    Validate {
        /// Path to process definition YAML file
        definition: PathBuf,
    },

    /// Start a process and drain it with a pool of simulated workers
    Run {
        /// Path to process definition YAML file
        definition: PathBuf,

        /// Number of concurrent workers
        #[arg(short, long, default_value = "2")]
        workers: usize,

        /// Simulated work time per task, in milliseconds
        #[arg(long, default_value = "50")]
        tick_ms: u64,

        /// Task name whose execution should fail
        #[arg(long)]
        fail: Option<String>,
    },
}

impl Cli {
    pub fn settings(&self) -> anyhow::Result<Settings> {
        Ok(Settings::load(self.config.as_deref())?)
    }

    /// Initialize logging from settings, with CLI flags taking precedence
    pub fn init_logging(&self, settings: &Settings) -> anyhow::Result<()> {
        let config = LogConfig {
            level: self
                .log_level
                .as_deref()
                .map(LogLevel::from)
                .unwrap_or(settings.log.level),
            format: self
                .log_format
                .as_deref()
                .map(LogFormat::from)
                .unwrap_or(settings.log.format),
        };

        init_logging(&config)
    }

    /// Execute the CLI command
    pub async fn execute(&self, settings: &Settings) -> anyhow::Result<()> {
        match &self.command {
            Commands::Validate { definition } => self.validate(definition, settings),
            Commands::Run {
                definition,
                workers,
                tick_ms,
                fail,
            } => {
                self.run(
                    definition,
                    settings,
                    *workers,
                    Duration::from_millis(*tick_ms),
                    fail.clone(),
                )
                .await
            }
        }
    }

    fn validate(&self, path: &PathBuf, settings: &Settings) -> anyhow::Result<()> {
        info!("Validating process definition: {:?}", path);

        let definition = parse_definition_file(path, &settings.limits)?;
        let process = Process::from_definition(&definition)?;
        let order = process.topological_order()?;
        let mut active: Vec<String> = process
            .active_tasks()
            .into_iter()
            .map(|task| task.name)
            .collect();
        active.sort();

        println!("Process definition is valid");
        println!("Tasks: {}", definition.tasks.len());
        println!("Dependencies: {}", process.graph().edge_count());
        println!("Execution order: {}", order.join(" -> "));
        println!("Initially active: {}", active.join(", "));

        Ok(())
    }

    async fn run(
        &self,
        path: &PathBuf,
        settings: &Settings,
        workers: usize,
        tick: Duration,
        fail: Option<String>,
    ) -> anyhow::Result<()> {
        let source = std::fs::read_to_string(path)?;
        let engine = Arc::new(Engine::in_memory().with_limits(settings.limits.clone()));
        let pid = engine.start_process(&source)?;
        info!(pid = %pid, workers, "Process started, spawning workers");

        let mut handles = Vec::with_capacity(workers);
        for n in 1..=workers.max(1) {
            let worker = Worker {
                id: format!("worker-{n}"),
                engine: Arc::clone(&engine),
                pid,
                tick,
                fail: fail.clone(),
            };
            handles.push(tokio::spawn(worker.run()));
        }

        for handle in handles {
            let (id, handled) = handle.await??;
            println!("{id}: handled {handled} task(s)");
        }

        let status = engine.status(&pid)?;
        println!("Process {pid}: {}% complete", status.progress);
        if !status.active.is_empty() {
            println!("Blocked on: {}", status.active.join(", "));
        }

        Ok(())
    }
}

/// Simulated worker polling the board
struct Worker {
    id: String,
    engine: Arc<Engine>,
    pid: ProcessId,
    tick: Duration,
    fail: Option<String>,
}

impl Worker {
    async fn run(self) -> anyhow::Result<(String, usize)> {
        let mut handled = 0;

        loop {
            let tickets = self.engine.fetch_tasks();
            let Some(ticket) = tickets
                .into_iter()
                .find(|ticket| ticket.assigned_to.is_none())
            else {
                if self.is_finished()? {
                    break;
                }
                // Only repair an idle board. While a sibling is still in
                // flight its completion re-publishes failed tasks anyway.
                if self.engine.fetch_tasks().is_empty() {
                    self.engine.reconcile(&self.pid)?;
                }
                tokio::time::sleep(self.tick).await;
                continue;
            };

            match self.engine.claim_task(&ticket.id, &self.id) {
                Ok(()) => {}
                Err(FlowError::ClaimConflict { owner, .. }) => {
                    debug!(worker = %self.id, task = %ticket.name, owner = %owner, "Lost claim");
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
            info!(worker = %self.id, task = %ticket.name, ticket = %ticket.id, "Claimed task");

            tokio::time::sleep(self.tick).await;

            let outcome = if self.fail.as_deref() == Some(ticket.name.as_str()) {
                self.engine.fail_task(&ticket.id, &self.id)
            } else {
                self.engine.complete_task(&ticket.id, &self.id)
            };

            match outcome {
                Ok(()) => handled += 1,
                Err(FlowError::Conflict { .. }) => {
                    warn!(worker = %self.id, task = %ticket.name, "Process changed underneath, reconciling");
                    self.engine.reconcile(&self.pid)?;
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok((self.id, handled))
    }

    /// No live ticket left and every task still active has failed.
    ///
    /// Failed tasks stay active, so a sibling completion can hand one out
    /// again; a worker only stops once none is on the board.
    fn is_finished(&self) -> anyhow::Result<bool> {
        if !self.engine.fetch_tasks().is_empty() {
            return Ok(false);
        }
        let process = self.engine.process(&self.pid)?;
        Ok(process
            .active_tasks()
            .iter()
            .all(|task| task.state == TaskState::Failed))
    }
}
