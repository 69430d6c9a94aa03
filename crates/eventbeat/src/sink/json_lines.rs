//! Newline-delimited JSON sink (file or stdout).

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{PublishOutcome, Sink};
use crate::config::{OutputConfig, OutputKind};
use crate::error::SinkError;
use crate::record::Record;

enum Target {
    File(File),
    Stdout(Stdout),
}

impl Target {
    async fn write_batch(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            Target::File(file) => {
                write_and_flush(file, buf).await?;
                file.sync_data().await
            }
            Target::Stdout(stdout) => write_and_flush(stdout, buf).await,
        }
    }

    async fn shutdown(&mut self) -> std::io::Result<()> {
        match self {
            Target::File(file) => {
                file.flush().await?;
                file.sync_all().await
            }
            Target::Stdout(stdout) => stdout.flush().await,
        }
    }
}

async fn write_and_flush<W: AsyncWrite + Unpin>(writer: &mut W, buf: &[u8]) -> std::io::Result<()> {
    writer.write_all(buf).await?;
    writer.flush().await
}

/// Writes one JSON object per record.
///
/// Batches from concurrent workers are serialized by an internal lock, so
/// lines never interleave. A batch is accepted only after it has been flushed
/// (and synced, for files).
pub struct JsonLinesSink {
    label: String,
    target: Mutex<Option<Target>>,
}

impl JsonLinesSink {
    /// Sink writing to the process's stdout.
    pub fn stdout() -> Self {
        Self {
            label: "stdout".to_string(),
            target: Mutex::new(Some(Target::Stdout(tokio::io::stdout()))),
        }
    }

    /// Sink appending to `path`, created if missing.
    pub async fn open_file(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|source| SinkError::Io {
                target: path.display().to_string(),
                source,
            })?;
        info!(path = %path.display(), "JSON lines sink opened");
        Ok(Self {
            label: path.display().to_string(),
            target: Mutex::new(Some(Target::File(file))),
        })
    }

    /// Build the sink described by the `[output]` config section.
    pub async fn from_config(config: &OutputConfig) -> Result<Self, SinkError> {
        match config.kind {
            OutputKind::Stdout => Ok(Self::stdout()),
            OutputKind::File => {
                let path: &PathBuf = config.path.as_ref().ok_or_else(|| {
                    SinkError::Config("output.path is required for file output".to_string())
                })?;
                Self::open_file(path).await
            }
        }
    }

    fn encode(records: &[Record]) -> serde_json::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(records.len() * 512);
        for record in records {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }
        Ok(buf)
    }
}

#[async_trait]
impl Sink for JsonLinesSink {
    async fn publish(&self, records: &[Record]) -> PublishOutcome {
        let buf = match Self::encode(records) {
            Ok(buf) => buf,
            Err(e) => return PublishOutcome::Rejected(format!("Failed to encode batch: {}", e)),
        };

        let mut guard = self.target.lock().await;
        let Some(target) = guard.as_mut() else {
            return PublishOutcome::ShuttingDown;
        };

        match target.write_batch(&buf).await {
            Ok(()) => PublishOutcome::Accepted,
            Err(e) => {
                warn!(target = %self.label, "Failed to write batch: {}", e);
                PublishOutcome::Rejected(e.to_string())
            }
        }
    }

    async fn close(&self) -> Result<(), SinkError> {
        let Some(mut target) = self.target.lock().await.take() else {
            return Ok(());
        };
        target.shutdown().await.map_err(|source| SinkError::Io {
            target: self.label.clone(),
            source,
        })?;
        info!(target = %self.label, "JSON lines sink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CodeRef, IdentifiedRef, LegacyText};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn record(id: i64) -> Record {
        let ts = Utc.timestamp_opt(1_500_000_000 + id, 0).unwrap();
        Record {
            id,
            timestamp: ts,
            severity: 0,
            connection_id: 0,
            session_id: 0,
            transaction_status: 0,
            transaction_timestamp: ts,
            transaction_id: 0,
            user: IdentifiedRef::default(),
            computer: CodeRef::default(),
            application: CodeRef::default(),
            event_type: CodeRef::default(),
            comment: format!("event {}", id),
            metadata_codes: String::new(),
            metadata: IdentifiedRef::default(),
            session_data_split_code: 0,
            session_data_split_presentation: LegacyText::default(),
            data_type: 0,
            data: LegacyText::default(),
            data_presentation: String::new(),
            work_server: CodeRef::default(),
            primary_port: CodeRef::default(),
            secondary_port: CodeRef::default(),
        }
    }

    #[tokio::test]
    async fn test_file_sink_appends_one_line_per_record() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("events.jsonl");
        let sink = JsonLinesSink::open_file(&path).await.unwrap();

        assert_eq!(sink.publish(&[record(1), record(2)]).await, PublishOutcome::Accepted);
        assert_eq!(sink.publish(&[record(3)]).await, PublishOutcome::Accepted);
        sink.close().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let ids: Vec<i64> = content
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).unwrap();
                value["id"].as_i64().unwrap()
            })
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_publish_after_close_reports_shutdown() {
        let tmp = TempDir::new().unwrap();
        let sink = JsonLinesSink::open_file(tmp.path().join("events.jsonl")).await.unwrap();
        sink.close().await.unwrap();
        sink.close().await.unwrap();

        assert_eq!(sink.publish(&[record(1)]).await, PublishOutcome::ShuttingDown);
    }

    #[tokio::test]
    async fn test_file_output_requires_path() {
        let config = OutputConfig {
            kind: OutputKind::File,
            path: None,
        };
        assert!(matches!(
            JsonLinesSink::from_config(&config).await,
            Err(SinkError::Config(_))
        ));
    }
}
