//! Schema migration commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use chronicle_core::error::AppError;
use chronicle_database::DatabasePool;
use chronicle_database::migration::{self, MigrationStatus};

#[derive(Debug, Args)]
pub struct MigrateArgs {
    #[command(subcommand)]
    pub command: MigrateCommand,
}

#[derive(Debug, Subcommand)]
pub enum MigrateCommand {
    /// Apply pending migrations
    Run,
    /// Show which migrations have been applied
    Status,
}

#[derive(Debug, Serialize, Tabled)]
struct MigrationRow {
    version: i64,
    description: String,
    applied: String,
}

impl From<MigrationStatus> for MigrationRow {
    fn from(status: MigrationStatus) -> Self {
        Self {
            version: status.version,
            description: status.description,
            applied: if status.applied { "yes" } else { "pending" }.to_string(),
        }
    }
}

pub async fn execute(
    args: &MigrateArgs,
    pool: &DatabasePool,
    format: OutputFormat,
) -> Result<(), AppError> {
    match &args.command {
        MigrateCommand::Run => {
            migration::run_migrations(pool.pool()).await?;
            output::print_success("Job schema is up to date");
        }
        MigrateCommand::Status => {
            let rows: Vec<MigrationRow> = migration::migration_status(pool.pool())
                .await?
                .into_iter()
                .map(MigrationRow::from)
                .collect();
            output::print_list(&rows, format);
        }
    }

    Ok(())
}
