//! Background worker configuration.

use serde::{Deserialize, Serialize};

/// Largest accepted `max_backoff_seconds` (one day).
pub const MAX_BACKOFF_SECONDS: u64 = 86_400;

/// How the delay before a retry grows with the number of failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// Always wait the job's `retry_delay_ms`.
    #[default]
    Fixed,
    /// Double the job's `retry_delay_ms` for every previous retry.
    Exponential,
}

/// Background job worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Whether the worker loop is started.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Interval in seconds between job queue polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Move successful jobs to the archive table instead of deleting them.
    #[serde(default)]
    pub archive_completed: bool,
    /// Retry backoff strategy.
    #[serde(default)]
    pub backoff: BackoffKind,
    /// Upper bound for an exponential retry delay, in seconds.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            poll_interval_seconds: default_poll_interval(),
            archive_completed: false,
            backoff: BackoffKind::default(),
            max_backoff_seconds: default_max_backoff(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    5
}

fn default_max_backoff() -> u64 {
    3600
}
