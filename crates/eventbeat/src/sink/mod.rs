//! Downstream sink contract.
//!
//! A sink receives one batch at a time from a source worker and must not
//! return until the batch is durably accepted or definitively refused. The
//! worker only advances its cursor on [`PublishOutcome::Accepted`].

mod json_lines;

pub use json_lines::JsonLinesSink;

use async_trait::async_trait;

use crate::error::SinkError;
use crate::record::Record;

/// Result of a publish attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Every record in the batch was delivered.
    Accepted,
    /// Delivery failed; the same batch may be offered again later.
    Rejected(String),
    /// The sink is closing; the worker should stop without checkpointing.
    ShuttingDown,
}

impl PublishOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, PublishOutcome::Accepted)
    }
}

/// Destination for published records. Shared by every source worker.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Deliver `records` and wait for confirmation.
    async fn publish(&self, records: &[Record]) -> PublishOutcome;

    /// Flush and release the destination. Later publishes report
    /// [`PublishOutcome::ShuttingDown`].
    async fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
