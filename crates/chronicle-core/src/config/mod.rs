//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section.

pub mod database;
pub mod logging;
pub mod retention;
pub mod worker;

use serde::{Deserialize, Serialize};

pub use self::database::DatabaseConfig;
pub use self::logging::{LogFormat, LoggingConfig};
pub use self::retention::{MAX_RETENTION_DAYS, RetentionConfig};
pub use self::worker::{BackoffKind, MAX_BACKOFF_SECONDS, WorkerConfig};

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database connection settings.
    pub database: DatabaseConfig,
    /// Background worker settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Terminal job retention settings.
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges `config/default.toml` with an environment-specific overlay
    /// (`config/<env>.toml`) and environment variables prefixed with
    /// `CHRONICLE__` (e.g. `CHRONICLE__DATABASE__URL`).
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("CHRONICLE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        Self::deserialize_from(config)
    }

    /// Load configuration from a single explicit file path.
    pub fn load_file(path: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("CHRONICLE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        Self::deserialize_from(config)
    }

    fn deserialize_from(config: config::Config) -> Result<Self, AppError> {
        let config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the worker and the retention cleanup cannot act on.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.worker.poll_interval_seconds == 0 {
            return Err(AppError::configuration(
                "worker.poll_interval_seconds must be at least 1",
            ));
        }
        if self.worker.max_backoff_seconds > MAX_BACKOFF_SECONDS {
            return Err(AppError::configuration(format!(
                "worker.max_backoff_seconds must be at most {MAX_BACKOFF_SECONDS}, got {}",
                self.worker.max_backoff_seconds
            )));
        }
        if !(0..=MAX_RETENTION_DAYS).contains(&self.retention.days) {
            return Err(AppError::configuration(format!(
                "retention.days must be between 0 and {MAX_RETENTION_DAYS}, got {}",
                self.retention.days
            )));
        }
        Ok(())
    }
}
