//! Runs one worker per configured event log and owns shutdown ordering.
//!
//! Startup: load every checkpoint, seed each reader's cursor (0 when the
//! source has none), spawn the workers. Shutdown: wait for every worker,
//! then make checkpoints durable, then close the sink.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use eventbeat_checkpoint::CheckpointStore;

use crate::config::EventLogConfig;
use crate::error::OrchestratorError;
use crate::reader::SourceReader;
use crate::sink::Sink;
use crate::worker::{SourceWorker, WorkerExit, WorkerOutcome, WorkerSettings};

/// Per-source outcomes of a finished run, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorReport {
    pub workers: Vec<WorkerOutcome>,
}

impl OrchestratorReport {
    pub fn get(&self, name: &str) -> Option<&WorkerOutcome> {
        self.workers.iter().find(|w| w.name == name)
    }

    /// Final confirmed cursor of `name`.
    pub fn cursor(&self, name: &str) -> Option<i64> {
        self.get(name).map(|w| w.cursor)
    }

    pub fn exit(&self, name: &str) -> Option<&WorkerExit> {
        self.get(name).map(|w| &w.exit)
    }

    /// True when every worker stopped because shutdown was requested.
    pub fn all_cancelled(&self) -> bool {
        self.workers.iter().all(|w| w.exit == WorkerExit::Cancelled)
    }
}

pub struct Orchestrator {
    sources: Vec<EventLogConfig>,
    sink: Arc<dyn Sink>,
    checkpoints: Arc<dyn CheckpointStore>,
    settings: WorkerSettings,
}

impl Orchestrator {
    pub fn new(
        sources: Vec<EventLogConfig>,
        sink: Arc<dyn Sink>,
        checkpoints: Arc<dyn CheckpointStore>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            sources,
            sink,
            checkpoints,
            settings,
        }
    }

    /// Run every source until all workers stop.
    ///
    /// Workers stop on their own on fatal errors; `cancel` stops the rest.
    /// A worker failure never aborts its siblings.
    pub async fn run(
        self,
        cancel: CancellationToken,
    ) -> Result<OrchestratorReport, OrchestratorError> {
        let states = match self.checkpoints.load_all() {
            Ok(states) => states,
            Err(e) => {
                error!("Failed to load checkpoints, no worker started: {}", e);
                self.release().await?;
                return Err(e.into());
            }
        };

        let mut handles: Vec<(String, i64, JoinHandle<WorkerOutcome>)> =
            Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let cursor = states
                .get(&source.name)
                .map(|s| s.record_number)
                .unwrap_or(0);
            info!(
                source = %source.name,
                path = %source.path,
                cursor,
                "Starting event log worker"
            );

            let reader = SourceReader::new(source.name.clone(), source.path.clone())
                .with_cursor(cursor)
                .with_page_size(self.settings.page_size)
                .with_cache_capacity(self.settings.cache_capacity);
            let worker = SourceWorker::new(
                reader,
                Arc::clone(&self.sink),
                Arc::clone(&self.checkpoints),
                cancel.clone(),
                self.settings.clone(),
            );
            handles.push((source.name.clone(), cursor, tokio::spawn(worker.run())));
        }

        let mut report = OrchestratorReport::default();
        for (name, seeded, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(source = %name, "Worker task failed: {}", e);
                    WorkerOutcome {
                        name,
                        exit: WorkerExit::Panicked(e.to_string()),
                        cursor: seeded,
                    }
                }
            };
            report.workers.push(outcome);
        }

        self.release().await?;
        info!(workers = report.workers.len(), "All event log workers stopped");
        Ok(report)
    }

    /// Make checkpoints durable, then close the sink. The sink is closed
    /// even when the checkpoint flush fails.
    async fn release(&self) -> Result<(), OrchestratorError> {
        // Checkpoints first: everything they hold was already accepted by the sink.
        let checkpoints = Arc::clone(&self.checkpoints);
        let flushed = tokio::task::spawn_blocking(move || checkpoints.shutdown()).await;
        if let Err(e) = self.sink.close().await {
            warn!("Failed to close sink: {}", e);
        }
        flushed??;
        Ok(())
    }
}
