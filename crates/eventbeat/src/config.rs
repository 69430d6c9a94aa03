//! Configuration file model for eventbeat

use eventbeat_checkpoint::{FlushPolicy, DEFAULT_REGISTRY_FILE};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::DEFAULT_CAPACITY;
use crate::error::ConfigError;

/// Top-level configuration. Unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Checkpoint registry file
    #[serde(default = "default_registry_file")]
    pub registry_file: PathBuf,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    #[serde(default)]
    pub output: OutputConfig,

    /// Event logs to tail
    #[serde(default)]
    pub event_logs: Vec<EventLogConfig>,
}

/// One event log source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventLogConfig {
    /// Unique name, also the checkpoint key
    pub name: String,
    /// Path to the SQLite event log, or a `sqlite:` URL
    pub path: String,
}

/// Per-worker polling behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollingConfig {
    /// Rows fetched per poll
    pub page_size: u32,
    /// Sleep between polls when a source is caught up
    pub idle_interval_ms: u64,
    /// Session data split presentations kept per source
    pub lookup_cache_capacity: usize,
    /// Consecutive read failures tolerated before the worker stops
    pub read_retries: u32,
    /// First retry delay; doubles per attempt
    pub read_backoff_ms: u64,
    /// 0 disables the timeout
    pub query_timeout_ms: u64,
    /// 0 disables the timeout
    pub publish_timeout_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            page_size: 3,
            idle_interval_ms: 1_000,
            lookup_cache_capacity: DEFAULT_CAPACITY,
            read_retries: 0,
            read_backoff_ms: 500,
            query_timeout_ms: 0,
            publish_timeout_ms: 0,
        }
    }
}

impl PollingConfig {
    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn read_backoff(&self) -> Duration {
        Duration::from_millis(self.read_backoff_ms)
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        non_zero_millis(self.query_timeout_ms)
    }

    pub fn publish_timeout(&self) -> Option<Duration> {
        non_zero_millis(self.publish_timeout_ms)
    }
}

/// Checkpoint registry flush cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CheckpointConfig {
    pub max_updates: usize,
    pub flush_interval_ms: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        let policy = FlushPolicy::default();
        Self {
            max_updates: policy.max_updates,
            flush_interval_ms: policy.flush_interval.as_millis() as u64,
        }
    }
}

impl CheckpointConfig {
    pub fn flush_policy(&self) -> FlushPolicy {
        FlushPolicy {
            max_updates: self.max_updates,
            flush_interval: Duration::from_millis(self.flush_interval_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    #[default]
    Stdout,
    File,
}

/// Where published records go.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default)]
    pub kind: OutputKind,
    /// Required for `kind = "file"`
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_registry_file() -> PathBuf {
    PathBuf::from(DEFAULT_REGISTRY_FILE)
}

fn non_zero_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl Settings {
    /// Load, validate and normalize a TOML config file.
    ///
    /// A relative `registry_file` is resolved against the working directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut settings = Self::from_toml_str(&content)?;
        settings.validate()?;

        if settings.registry_file.is_relative() {
            let cwd = std::env::current_dir().map_err(|source| ConfigError::Io {
                path: ".".to_string(),
                source,
            })?;
            settings.registry_file = cwd.join(&settings.registry_file);
        }
        Ok(settings)
    }

    /// Parse without validating.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Check semantic constraints, reporting every problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.event_logs.is_empty() {
            errors.push(
                "At least one event log must be configured as part of event_logs".to_string(),
            );
        }

        let mut seen = HashSet::new();
        for (idx, log) in self.event_logs.iter().enumerate() {
            if log.name.trim().is_empty() {
                errors.push(format!("event_logs[{}]: name must not be empty", idx));
            } else if !seen.insert(log.name.as_str()) {
                errors.push(format!("event_logs[{}]: duplicate name '{}'", idx, log.name));
            }
            if log.path.trim().is_empty() {
                errors.push(format!("event_logs[{}]: path must not be empty", idx));
            }
        }

        if self.polling.page_size == 0 {
            errors.push("polling.page_size must be greater than 0".to_string());
        }
        if self.polling.lookup_cache_capacity == 0 {
            errors.push("polling.lookup_cache_capacity must be greater than 0".to_string());
        }
        if self.checkpoint.max_updates == 0 {
            errors.push("checkpoint.max_updates must be greater than 0".to_string());
        }
        if self.checkpoint.flush_interval_ms == 0 {
            errors.push("checkpoint.flush_interval_ms must be greater than 0".to_string());
        }
        if self.output.kind == OutputKind::File && self.output.path.is_none() {
            errors.push("output.path is required when output.kind = \"file\"".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
        [[event_logs]]
        name = "main"
        path = "/srv/app/1Cv8.lgd"
    "#;

    #[test]
    fn test_defaults() {
        let settings = Settings::from_toml_str(MINIMAL).unwrap();
        settings.validate().unwrap();
        assert_eq!(settings.registry_file, PathBuf::from(".eventbeat.yml"));
        assert_eq!(settings.polling.page_size, 3);
        assert_eq!(settings.polling.idle_interval(), Duration::from_secs(1));
        assert_eq!(settings.polling.lookup_cache_capacity, 64);
        assert_eq!(settings.polling.query_timeout(), None);
        assert_eq!(settings.polling.publish_timeout(), None);
        assert_eq!(settings.checkpoint.flush_policy(), FlushPolicy::default());
        assert_eq!(settings.output.kind, OutputKind::Stdout);
    }

    #[test]
    fn test_full_config() {
        let settings = Settings::from_toml_str(
            r#"
            registry_file = "/var/lib/eventbeat/registry.yml"

            [polling]
            page_size = 50
            idle_interval_ms = 250
            read_retries = 3
            query_timeout_ms = 10000

            [checkpoint]
            max_updates = 1

            [output]
            kind = "file"
            path = "/var/log/events.jsonl"

            [[event_logs]]
            name = "main"
            path = "/srv/main/1Cv8.lgd"

            [[event_logs]]
            name = "audit"
            path = "sqlite:///srv/audit/1Cv8.lgd"
            "#,
        )
        .unwrap();
        settings.validate().unwrap();

        assert_eq!(settings.polling.page_size, 50);
        assert_eq!(settings.polling.idle_interval(), Duration::from_millis(250));
        assert_eq!(settings.polling.read_backoff(), Duration::from_millis(500));
        assert_eq!(settings.polling.query_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(settings.checkpoint.max_updates, 1);
        assert_eq!(settings.checkpoint.flush_interval_ms, 5_000);
        assert_eq!(settings.output.kind, OutputKind::File);
        assert_eq!(settings.event_logs.len(), 2);
        assert_eq!(settings.event_logs[1].name, "audit");
    }

    #[test]
    fn test_requires_at_least_one_event_log() {
        let settings = Settings::from_toml_str("").unwrap();
        let err = settings.validate().unwrap_err().to_string();
        assert!(
            err.contains("At least one event log must be configured as part of event_logs"),
            "got: {}",
            err
        );
    }

    #[test]
    fn test_rejects_unknown_top_level_key() {
        let err = Settings::from_toml_str("other = \"value\"\n").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("unknown field `other`"), "got: {}", msg);
        assert!(msg.contains("event_logs"), "valid keys should be listed: {}", msg);
    }

    #[test]
    fn test_collects_all_problems() {
        let settings = Settings::from_toml_str(
            r#"
            [polling]
            page_size = 0

            [output]
            kind = "file"

            [[event_logs]]
            name = "main"
            path = ""

            [[event_logs]]
            name = "main"
            path = "/b"
            "#,
        )
        .unwrap();

        match settings.validate() {
            Err(ConfigError::Invalid(errors)) => {
                assert_eq!(errors.len(), 4, "got: {:?}", errors);
                assert!(errors.iter().any(|e| e.contains("duplicate name 'main'")));
                assert!(errors.iter().any(|e| e.contains("path must not be empty")));
                assert!(errors.iter().any(|e| e.contains("page_size")));
                assert!(errors.iter().any(|e| e.contains("output.path")));
            }
            other => panic!("expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_load_resolves_relative_registry_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("eventbeat.toml");
        std::fs::write(&path, MINIMAL).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert!(settings.registry_file.is_absolute());
        assert!(settings.registry_file.ends_with(".eventbeat.yml"));
    }

    #[test]
    fn test_load_missing_file() {
        let tmp = TempDir::new().unwrap();
        let result = Settings::load(&tmp.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
