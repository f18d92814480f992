//! Typed runtime settings.
//!
//! Every field has a default, so an empty JSON object is a complete
//! configuration.

use crate::logging::LoggerConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_RETRY_RELOAD_DELAY_SECS: u64 = 5;
const DEFAULT_TASK_TIMEOUT_SECS: u64 = 300;

/// Errors raised while loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document is not valid settings JSON.
    #[error("invalid settings document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Root settings document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Dependency reconciliation controller.
    pub controller: ControllerSettings,
    /// Read-cache resync.
    pub resync: ResyncSettings,
    /// Task dispatch and execution.
    pub task: TaskSettings,
    /// Logging.
    pub logging: LoggerConfig,
}

impl Settings {
    /// Parses settings from JSON, defaulting every absent field.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON or mistyped fields.
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(document)?)
    }
}

/// Worker pool sizes and retry delay of the reconciliation controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    /// Workers on the reconcile queue.
    pub reconcile_workers: usize,
    /// Workers on the reload-dependents queue.
    pub reload_workers: usize,
    /// Workers on the publish-event queue.
    pub publish_workers: usize,
    /// Delay before a busy reload is retried; `0` means the default.
    pub retry_reload_delay_secs: u64,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            reconcile_workers: 1,
            reload_workers: 10,
            publish_workers: 2,
            retry_reload_delay_secs: DEFAULT_RETRY_RELOAD_DELAY_SECS,
        }
    }
}

impl ControllerSettings {
    /// Returns the busy-reload retry delay, substituting the default for `0`.
    #[must_use]
    pub const fn retry_reload_delay(&self) -> Duration {
        if self.retry_reload_delay_secs == 0 {
            Duration::from_secs(DEFAULT_RETRY_RELOAD_DELAY_SECS)
        } else {
            Duration::from_secs(self.retry_reload_delay_secs)
        }
    }
}

/// Resync cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResyncSettings {
    /// Seconds between periodic resyncs.
    pub interval_secs: u64,
    /// Seconds to wait after a transaction conflict.
    pub conflict_backoff_secs: u64,
}

impl Default for ResyncSettings {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            conflict_backoff_secs: 5,
        }
    }
}

impl ResyncSettings {
    /// Returns the periodic resync interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Returns the conflict backoff.
    #[must_use]
    pub const fn conflict_backoff(&self) -> Duration {
        Duration::from_secs(self.conflict_backoff_secs)
    }
}

/// Task dispatch, polling, and retry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskSettings {
    /// Soft timeout used when a caller passes `0`.
    pub default_timeout_secs: u64,
    /// Interval between state polls of synchronous callers.
    pub poll_interval_secs: u64,
    /// Lifetime of a task state in the broker.
    pub results_expire_in_secs: u64,
    /// Maximum handlers the broker runs at once.
    pub worker_concurrency: usize,
    /// Attempts made by the retrying mutation variants.
    pub busy_retry_attempts: u32,
    /// Delay between retrying attempts.
    pub busy_retry_delay_secs: u64,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            default_timeout_secs: DEFAULT_TASK_TIMEOUT_SECS,
            poll_interval_secs: 1,
            results_expire_in_secs: 3600,
            worker_concurrency: 100,
            busy_retry_attempts: 5,
            busy_retry_delay_secs: 2,
        }
    }
}

impl TaskSettings {
    /// Resolves a caller-supplied timeout, substituting the default for `0`.
    #[must_use]
    pub const fn effective_timeout_secs(&self, requested: u64) -> u64 {
        if requested == 0 {
            self.default_timeout_secs
        } else {
            requested
        }
    }

    /// Returns the poll interval of synchronous callers.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Returns the broker state lifetime.
    #[must_use]
    pub const fn results_expire_in(&self) -> Duration {
        Duration::from_secs(self.results_expire_in_secs)
    }

    /// Returns the delay between retrying attempts.
    #[must_use]
    pub const fn busy_retry_delay(&self) -> Duration {
        Duration::from_secs(self.busy_retry_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::Settings;
    use crate::logging::LoggerFormat;
    use rstest::rstest;
    use std::time::Duration;

    #[rstest]
    fn empty_document_yields_defaults() {
        let settings = Settings::from_json("{}");
        assert_eq!(settings.ok(), Some(Settings::default()));
    }

    #[rstest]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.controller.reconcile_workers, 1);
        assert_eq!(settings.controller.reload_workers, 10);
        assert_eq!(settings.controller.publish_workers, 2);
        assert_eq!(settings.controller.retry_reload_delay(), Duration::from_secs(5));
        assert_eq!(settings.resync.conflict_backoff(), Duration::from_secs(5));
        assert_eq!(settings.task.effective_timeout_secs(0), 300);
        assert_eq!(settings.task.busy_retry_attempts, 5);
        assert_eq!(settings.task.busy_retry_delay(), Duration::from_secs(2));
        assert_eq!(settings.logging.format, LoggerFormat::Text);
    }

    #[rstest]
    fn zero_retry_delay_falls_back_to_default() {
        let settings = Settings::from_json(r#"{"controller": {"retry_reload_delay_secs": 0}}"#)
            .unwrap_or_default();
        assert_eq!(settings.controller.retry_reload_delay(), Duration::from_secs(5));
        assert_eq!(settings.controller.reload_workers, 10);
    }

    #[rstest]
    fn partial_document_overrides_only_named_fields() {
        let settings = Settings::from_json(
            r#"{"task": {"default_timeout_secs": 60}, "logging": {"format": "json"}}"#,
        )
        .unwrap_or_default();
        assert_eq!(settings.task.effective_timeout_secs(0), 60);
        assert_eq!(settings.task.effective_timeout_secs(7), 7);
        assert_eq!(settings.task.poll_interval(), Duration::from_secs(1));
        assert_eq!(settings.logging.format, LoggerFormat::Json);
    }

    #[rstest]
    fn mistyped_field_is_rejected() {
        assert!(Settings::from_json(r#"{"task": {"worker_concurrency": "many"}}"#).is_err());
    }
}
