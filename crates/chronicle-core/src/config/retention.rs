//! Retention configuration for terminal jobs.

use serde::{Deserialize, Serialize};

/// Longest accepted retention window (about a century).
pub const MAX_RETENTION_DAYS: i64 = 36_500;

/// Periodic cleanup of `failed` and `cancelled` jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Whether the cleanup schedule is registered at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Terminal jobs created more than this many days ago are purged.
    #[serde(default = "default_days")]
    pub days: i64,
    /// Six-field cron expression (with seconds) for the cleanup run.
    #[serde(default = "default_schedule")]
    pub schedule: String,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            days: default_days(),
            schedule: default_schedule(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_days() -> i64 {
    30
}

fn default_schedule() -> String {
    "0 0 3 * * *".to_string()
}
