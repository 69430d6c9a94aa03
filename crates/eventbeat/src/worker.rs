//! Source worker loop
//!
//! Design principles:
//! - One worker owns one `SourceReader` (cursor + cache) for its whole life
//! - Publish is awaited before the next poll: a slow sink throttles its source
//! - Cursor and checkpoint move only after `PublishOutcome::Accepted`
//! - Cancellation is checked at the top of each poll and ends any idle wait

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use eventbeat_checkpoint::CheckpointStore;

use crate::cache::DEFAULT_CAPACITY;
use crate::config::PollingConfig;
use crate::error::ReadError;
use crate::reader::{Batch, SourceReader, DEFAULT_PAGE_SIZE};
use crate::record::Record;
use crate::sink::{PublishOutcome, Sink};

/// Upper bound for the read retry backoff.
const MAX_READ_BACKOFF: Duration = Duration::from_secs(30);

/// Tunables shared by every worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    pub page_size: u32,
    pub idle_interval: Duration,
    pub cache_capacity: usize,
    /// Consecutive failed reads tolerated before the worker stops. 0 = stop on first.
    pub read_retries: u32,
    pub read_backoff: Duration,
    pub query_timeout: Option<Duration>,
    pub publish_timeout: Option<Duration>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            idle_interval: Duration::from_secs(1),
            cache_capacity: DEFAULT_CAPACITY,
            read_retries: 0,
            read_backoff: Duration::from_millis(500),
            query_timeout: None,
            publish_timeout: None,
        }
    }
}

impl From<&PollingConfig> for WorkerSettings {
    fn from(config: &PollingConfig) -> Self {
        Self {
            page_size: config.page_size,
            idle_interval: config.idle_interval(),
            cache_capacity: config.lookup_cache_capacity,
            read_retries: config.read_retries,
            read_backoff: config.read_backoff(),
            query_timeout: config.query_timeout(),
            publish_timeout: config.publish_timeout(),
        }
    }
}

/// Why a worker stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Shutdown was requested through the cancellation token.
    Cancelled,
    /// The sink reported it is shutting down.
    SinkShuttingDown,
    /// The store could not be read (after any configured retries).
    ReadFailed(String),
    /// The checkpoint store refused a write.
    CheckpointFailed(String),
    /// The worker task panicked.
    Panicked(String),
}

/// Final state of one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOutcome {
    pub name: String,
    pub exit: WorkerExit,
    /// Last cursor confirmed downstream.
    pub cursor: i64,
}

enum WorkerState {
    Polling,
    Idle { wait: Duration },
    Stopping(WorkerExit),
}

/// Drives one source: poll, publish, checkpoint.
pub struct SourceWorker {
    reader: SourceReader,
    sink: Arc<dyn Sink>,
    checkpoints: Arc<dyn CheckpointStore>,
    cancel: CancellationToken,
    settings: WorkerSettings,
    read_failures: u32,
}

impl SourceWorker {
    pub fn new(
        reader: SourceReader,
        sink: Arc<dyn Sink>,
        checkpoints: Arc<dyn CheckpointStore>,
        cancel: CancellationToken,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            reader,
            sink,
            checkpoints,
            cancel,
            settings,
            read_failures: 0,
        }
    }

    /// Run until cancelled or a fatal condition; consumes the worker.
    pub async fn run(mut self) -> WorkerOutcome {
        info!(
            source = %self.reader.name(),
            location = %self.reader.location(),
            cursor = self.reader.cursor(),
            "Worker started"
        );

        let mut state = WorkerState::Polling;
        let exit = loop {
            state = match state {
                WorkerState::Polling => self.poll().await,
                WorkerState::Idle { wait } => self.idle(wait).await,
                WorkerState::Stopping(exit) => break exit,
            };
        };

        info!(
            source = %self.reader.name(),
            cursor = self.reader.cursor(),
            exit = ?exit,
            cache = ?self.reader.cache_stats(),
            "Worker stopped"
        );
        WorkerOutcome {
            name: self.reader.name().to_string(),
            exit,
            cursor: self.reader.cursor(),
        }
    }

    async fn poll(&mut self) -> WorkerState {
        if self.cancel.is_cancelled() {
            return WorkerState::Stopping(WorkerExit::Cancelled);
        }

        let batch = match self.read().await {
            Ok(batch) => {
                self.read_failures = 0;
                batch
            }
            Err(e) => return self.on_read_error(e),
        };

        let Some((last_id, last_timestamp)) = batch.last_position() else {
            debug!(source = %self.reader.name(), "No new events");
            return WorkerState::Idle {
                wait: self.settings.idle_interval,
            };
        };
        debug!(source = %self.reader.name(), records = batch.len(), "Read events");

        match self.publish(&batch.records).await {
            PublishOutcome::Accepted => {
                self.reader.commit(last_id);
                info!(
                    source = %self.reader.name(),
                    count = batch.len(),
                    cursor = last_id,
                    "Published events"
                );
                match self
                    .checkpoints
                    .persist(self.reader.name(), last_id, last_timestamp)
                {
                    Ok(()) => WorkerState::Polling,
                    Err(e) => {
                        error!(
                            source = %self.reader.name(),
                            "Checkpoint write failed, stopping: {}",
                            e
                        );
                        WorkerState::Stopping(WorkerExit::CheckpointFailed(e.to_string()))
                    }
                }
            }
            PublishOutcome::Rejected(reason) => {
                warn!(
                    source = %self.reader.name(),
                    count = batch.len(),
                    "Failed to publish events, will retry from cursor {}: {}",
                    self.reader.cursor(),
                    reason
                );
                // The same batch is rebuilt from the store on the next poll.
                WorkerState::Idle {
                    wait: self.settings.idle_interval,
                }
            }
            PublishOutcome::ShuttingDown => {
                info!(
                    source = %self.reader.name(),
                    "Sink shutting down, stopping without checkpoint"
                );
                WorkerState::Stopping(WorkerExit::SinkShuttingDown)
            }
        }
    }

    async fn idle(&self, wait: Duration) -> WorkerState {
        tokio::select! {
            _ = self.cancel.cancelled() => WorkerState::Stopping(WorkerExit::Cancelled),
            _ = tokio::time::sleep(wait) => WorkerState::Polling,
        }
    }

    async fn read(&mut self) -> Result<Batch, ReadError> {
        match self.settings.query_timeout {
            Some(limit) => tokio::time::timeout(limit, self.reader.read_batch())
                .await
                .unwrap_or(Err(ReadError::Timeout(limit))),
            None => self.reader.read_batch().await,
        }
    }

    async fn publish(&self, records: &[Record]) -> PublishOutcome {
        match self.settings.publish_timeout {
            Some(limit) => tokio::time::timeout(limit, self.sink.publish(records))
                .await
                .unwrap_or_else(|_| {
                    PublishOutcome::Rejected(format!("publish timed out after {:?}", limit))
                }),
            None => self.sink.publish(records).await,
        }
    }

    fn on_read_error(&mut self, err: ReadError) -> WorkerState {
        if self.read_failures >= self.settings.read_retries {
            error!(
                source = %self.reader.name(),
                "Failed to read events, stopping worker: {}",
                err
            );
            return WorkerState::Stopping(WorkerExit::ReadFailed(err.to_string()));
        }

        let wait = read_backoff(self.settings.read_backoff, self.read_failures);
        self.read_failures += 1;
        warn!(
            source = %self.reader.name(),
            attempt = self.read_failures,
            retries = self.settings.read_retries,
            backoff_ms = wait.as_millis() as u64,
            "Failed to read events, retrying: {}",
            err
        );
        WorkerState::Idle { wait }
    }
}

/// `base * 2^attempt`, capped at [`MAX_READ_BACKOFF`].
fn read_backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.min(16)).min(MAX_READ_BACKOFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_backoff_doubles_and_caps() {
        let base = Duration::from_millis(500);
        assert_eq!(read_backoff(base, 0), Duration::from_millis(500));
        assert_eq!(read_backoff(base, 1), Duration::from_secs(1));
        assert_eq!(read_backoff(base, 3), Duration::from_secs(4));
        assert_eq!(read_backoff(base, 10), MAX_READ_BACKOFF);
        assert_eq!(read_backoff(base, u32::MAX), MAX_READ_BACKOFF);
    }

    #[test]
    fn test_settings_from_polling_config() {
        let settings = WorkerSettings::from(&PollingConfig::default());
        assert_eq!(settings, WorkerSettings::default());
    }
}
