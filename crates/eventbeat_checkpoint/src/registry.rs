//! YAML-file checkpoint registry with buffered writes.
//!
//! Design principles:
//! - The in-memory map is the source of truth; the file is a snapshot of it
//! - `persist()` only updates memory; disk I/O happens on the flusher thread
//!   or in `shutdown()`, never on the caller's (async) thread
//! - Snapshots are written to `<file>.new`, synced and renamed over the registry
//! - The flusher writes once `max_updates` changes are pending, or every
//!   `flush_interval`, whichever comes first

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{CheckpointError, Result};
use crate::{CheckpointState, CheckpointStore};

/// When buffered checkpoints are written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    /// Request a flush once this many updates are pending.
    pub max_updates: usize,
    /// Background flush cadence.
    pub flush_interval: Duration,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            max_updates: 10,
            flush_interval: Duration::from_secs(5),
        }
    }
}

/// On-disk layout of the registry file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    event_logs: Vec<CheckpointState>,
}

struct RegistryState {
    entries: BTreeMap<String, CheckpointState>,
    pending: usize,
    closed: bool,
}

enum FlusherCommand {
    Flush,
    Stop,
}

struct Shared {
    path: PathBuf,
    state: Mutex<RegistryState>,
    /// Serializes snapshot writes; never held together with `state` during I/O.
    write_lock: Mutex<()>,
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, RegistryState>> {
        self.state.lock().map_err(|_| CheckpointError::Poisoned)
    }

    /// Snapshot pending state under the lock, then write it without the lock.
    fn flush(&self) -> Result<()> {
        let _writer = self.write_lock.lock().map_err(|_| CheckpointError::Poisoned)?;
        let (entries, flushed) = {
            let mut state = self.lock()?;
            if state.pending == 0 {
                return Ok(());
            }
            let flushed = std::mem::take(&mut state.pending);
            (state.entries.clone(), flushed)
        };

        if let Err(e) = write_snapshot(&self.path, &entries) {
            if let Ok(mut state) = self.lock() {
                state.pending += flushed;
            }
            return Err(e);
        }
        debug!(
            path = %self.path.display(),
            entries = entries.len(),
            flushed,
            "Checkpoint registry flushed"
        );
        Ok(())
    }
}

/// Checkpoint store backed by a YAML registry file.
pub struct FileCheckpointStore {
    shared: Arc<Shared>,
    policy: FlushPolicy,
    commands: mpsc::Sender<FlusherCommand>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl FileCheckpointStore {
    /// Open the registry at `path`, loading existing state if the file exists.
    ///
    /// A missing file is an empty registry; a malformed one is an error.
    pub fn open(path: impl AsRef<Path>, policy: FlushPolicy) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = read_registry(&path)?;
        info!(
            path = %path.display(),
            sources = entries.len(),
            "Checkpoint registry opened"
        );

        let shared = Arc::new(Shared {
            path,
            state: Mutex::new(RegistryState {
                entries,
                pending: 0,
                closed: false,
            }),
            write_lock: Mutex::new(()),
        });
        let (commands, command_rx) = mpsc::channel();
        let flusher = spawn_flusher(Arc::clone(&shared), command_rx, policy.flush_interval)
            .map_err(|e| CheckpointError::io(&shared.path, e))?;

        Ok(Self {
            shared,
            policy,
            commands,
            flusher: Mutex::new(Some(flusher)),
        })
    }

    /// Registry file location.
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Write pending updates now, on the calling thread.
    pub fn flush(&self) -> Result<()> {
        self.shared.flush()
    }

    fn stop_flusher(&self) -> Result<()> {
        let handle = self
            .flusher
            .lock()
            .map_err(|_| CheckpointError::Poisoned)?
            .take();
        if let Some(handle) = handle {
            let _ = self.commands.send(FlusherCommand::Stop);
            if handle.join().is_err() {
                warn!(path = %self.shared.path.display(), "Checkpoint flusher thread panicked");
            }
        }
        Ok(())
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load_all(&self) -> Result<HashMap<String, CheckpointState>> {
        let state = self.shared.lock()?;
        Ok(state
            .entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect())
    }

    fn persist(&self, name: &str, last_id: i64, last_timestamp: DateTime<Utc>) -> Result<()> {
        let mut state = self.shared.lock()?;
        if state.closed {
            return Err(CheckpointError::Closed);
        }
        state.entries.insert(
            name.to_string(),
            CheckpointState {
                name: name.to_string(),
                record_number: last_id,
                timestamp: last_timestamp,
            },
        );
        state.pending += 1;
        if state.pending >= self.policy.max_updates {
            // Flusher gone means shutdown is under way; it writes everything.
            let _ = self.commands.send(FlusherCommand::Flush);
        }
        Ok(())
    }

    /// Stops the flusher, refuses further writes and flushes synchronously.
    /// Blocking: async callers should run it on a blocking thread.
    fn shutdown(&self) -> Result<()> {
        self.stop_flusher()?;
        let first = {
            let mut state = self.shared.lock()?;
            !std::mem::replace(&mut state.closed, true)
        };
        self.shared.flush()?;
        if first {
            info!(path = %self.shared.path.display(), "Checkpoint registry closed");
        }
        Ok(())
    }
}

impl Drop for FileCheckpointStore {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(
                path = %self.shared.path.display(),
                "Failed to flush checkpoints on drop: {}",
                e
            );
        }
    }
}

fn spawn_flusher(
    shared: Arc<Shared>,
    commands: mpsc::Receiver<FlusherCommand>,
    interval: Duration,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("checkpoint-flusher".to_string())
        .spawn(move || loop {
            match commands.recv_timeout(interval) {
                Ok(FlusherCommand::Flush) | Err(RecvTimeoutError::Timeout) => {
                    if let Err(e) = shared.flush() {
                        warn!(path = %shared.path.display(), "Checkpoint flush failed: {}", e);
                    }
                }
                Ok(FlusherCommand::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            }
        })
}

fn read_registry(path: &Path) -> Result<BTreeMap<String, CheckpointState>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(CheckpointError::io(path, e)),
    };
    if content.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    let registry: RegistryFile =
        serde_yaml::from_str(&content).map_err(|e| CheckpointError::format(path, e))?;
    Ok(registry
        .event_logs
        .into_iter()
        .map(|entry| (entry.name.clone(), entry))
        .collect())
}

fn write_snapshot(path: &Path, entries: &BTreeMap<String, CheckpointState>) -> Result<()> {
    let registry = RegistryFile {
        event_logs: entries.values().cloned().collect(),
    };
    let content = serde_yaml::to_string(&registry).map_err(|e| CheckpointError::format(path, e))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| CheckpointError::io(parent, e))?;
    }

    let tmp_path = temp_path(path);
    let mut file = File::create(&tmp_path).map_err(|e| CheckpointError::io(&tmp_path, e))?;
    file.write_all(content.as_bytes())
        .and_then(|_| file.sync_all())
        .map_err(|e| CheckpointError::io(&tmp_path, e))?;
    fs::rename(&tmp_path, path).map_err(|e| CheckpointError::io(path, e))?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".new");
    path.with_file_name(name)
}
