//! Logging setup for the eventbeat binary.
//!
//! Installs a `tracing` registry with two layers: a daily log file under
//! `~/.eventbeat/logs` written through a non-blocking appender, and
//! human-readable stderr output. Library crates only emit through `tracing`
//! macros and never touch the subscriber.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "eventbeat=info,eventbeat_checkpoint=info";
const VERBOSE_LOG_FILTER: &str = "eventbeat=debug,eventbeat_checkpoint=debug";
/// Daily files kept before the oldest is deleted.
const MAX_LOG_FILES: usize = 5;

/// Logging options chosen on the command line.
pub struct LogConfig<'a> {
    /// Log file prefix (`<app_name>.<date>.log`).
    pub app_name: &'a str,
    /// Mirror debug output to stderr.
    pub verbose: bool,
}

/// Keeps the background log writer alive. Buffered lines are flushed when
/// this is dropped, so hold it until the process exits.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Initialize tracing with a daily log file and stderr output.
///
/// `RUST_LOG` overrides the default filter for both layers. When the log
/// directory cannot be created, logging continues on stderr only.
pub fn init_logging(config: LogConfig<'_>) -> Result<LogGuard> {
    let appender = ensure_logs_dir().and_then(|dir| file_appender(&dir, config.app_name));
    let (file_layer, guard) = match appender {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(env_filter(DEFAULT_LOG_FILTER));
            (Some(layer), Some(guard))
        }
        Err(e) => {
            eprintln!("Warning: file logging disabled: {:#}", e);
            (None, None)
        }
    };

    let console_filter = if config.verbose {
        EnvFilter::new(VERBOSE_LOG_FILTER)
    } else {
        env_filter(DEFAULT_LOG_FILTER)
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(LogGuard { _file: guard })
}

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Daily-rotated appender in `dir`, keeping the last [`MAX_LOG_FILES`] days.
pub fn file_appender(dir: &Path, app_name: &str) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(sanitize_name(app_name))
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(dir)
        .with_context(|| format!("Failed to open log file in {}", dir.display()))
}

/// Get the eventbeat home directory: `~/.eventbeat`, or `$EVENTBEAT_HOME`.
pub fn eventbeat_home() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var("EVENTBEAT_HOME") {
        return Ok(PathBuf::from(override_path));
    }
    dirs::home_dir()
        .map(|home| home.join(".eventbeat"))
        .context("Could not determine home directory (set EVENTBEAT_HOME)")
}

/// Get the logs directory: `~/.eventbeat/logs`
pub fn logs_dir() -> Result<PathBuf> {
    Ok(eventbeat_home()?.join("logs"))
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir()?;
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
