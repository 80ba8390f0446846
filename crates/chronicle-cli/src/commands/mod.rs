//! CLI command definitions and dispatch.

pub mod jobs;
pub mod migrate;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use chronicle_core::config::AppConfig;
use chronicle_core::error::AppError;
use chronicle_core::traits::clock::SystemClock;
use chronicle_database::{DatabasePool, PgJobStore};

use crate::output::OutputFormat;

/// Chronicle scheduled job administration
#[derive(Debug, Parser)]
#[command(name = "chronicle", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Log more (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Database migration management
    Migrate(migrate::MigrateArgs),
    /// Scheduled job inspection and management
    Jobs(jobs::JobsArgs),
}

impl Cli {
    /// Load configuration, run the subcommand and close the pool.
    pub async fn execute(&self) -> Result<(), AppError> {
        let mut config = AppConfig::load_file(&self.config)?;
        config.database.application_name = format!("{}-cli", config.database.application_name);
        let pool = DatabasePool::connect(&config.database).await?;

        let result = match &self.command {
            Commands::Migrate(args) => migrate::execute(args, &pool, self.format).await,
            Commands::Jobs(args) => {
                let store = PgJobStore::new(pool.pool().clone(), Arc::new(SystemClock));
                jobs::execute(args, &store, &config, self.format).await
            }
        };

        pool.close().await;
        result
    }
}
