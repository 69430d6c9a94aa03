//! Eventbeat: incremental tailing of an application event log.
//!
//! The event log is a SQLite store whose main table grows by appended rows.
//! Each configured log gets one [`worker::SourceWorker`], which:
//!
//! - reads a small page of rows after its cursor ([`reader::SourceReader`])
//! - converts legacy values on the way ([`codec`])
//! - hands the page to a shared [`sink::Sink`] and waits for the verdict
//! - advances the cursor and the checkpoint only on acceptance
//!
//! The [`orchestrator::Orchestrator`] seeds cursors from the checkpoint store,
//! runs the workers concurrently and orders shutdown.

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod reader;
pub mod record;
pub mod sink;
pub mod worker;

pub use config::{EventLogConfig, Settings};
pub use error::{CodecError, ConfigError, OrchestratorError, ReadError, SinkError};
pub use orchestrator::{Orchestrator, OrchestratorReport};
pub use reader::{Batch, SourceReader};
pub use record::{CodeRef, IdentifiedRef, LegacyText, Record};
pub use sink::{JsonLinesSink, PublishOutcome, Sink};
pub use worker::{SourceWorker, WorkerExit, WorkerOutcome, WorkerSettings};

pub use tokio_util::sync::CancellationToken;
