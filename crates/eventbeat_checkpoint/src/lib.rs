//! Checkpoint registry for eventbeat sources.
//!
//! A checkpoint records, per source name, the highest record id that the sink
//! confirmed and the timestamp of that record. Workers resume from it after a
//! restart.
//!
//! # Usage
//!
//! ```rust,ignore
//! use eventbeat_checkpoint::{CheckpointStore, FileCheckpointStore, FlushPolicy};
//!
//! let store = FileCheckpointStore::open(".eventbeat.yml", FlushPolicy::default())?;
//! let states = store.load_all()?;
//! store.persist("main", 42, chrono::Utc::now())?;
//! store.shutdown()?;
//! ```

mod error;
mod registry;

pub use error::{CheckpointError, Result};
pub use registry::{FileCheckpointStore, FlushPolicy};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default registry file name, resolved against the working directory.
pub const DEFAULT_REGISTRY_FILE: &str = ".eventbeat.yml";

/// Last confirmed position of one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub name: String,
    pub record_number: i64,
    pub timestamp: DateTime<Utc>,
}

/// Durable per-source cursor storage.
///
/// Implementations must be safe to call from every worker concurrently.
pub trait CheckpointStore: Send + Sync {
    /// All known checkpoints, keyed by source name.
    fn load_all(&self) -> Result<HashMap<String, CheckpointState>>;

    /// Record a new position for `name`. May be buffered.
    fn persist(&self, name: &str, last_id: i64, last_timestamp: DateTime<Utc>) -> Result<()>;

    /// Make every earlier `persist` durable and stop accepting writes.
    fn shutdown(&self) -> Result<()>;
}
