//! Scheduled job CLI commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use serde_json::json;
use tabled::Tabled;
use uuid::Uuid;

use crate::output::{self, OutputFormat};
use chronicle_core::config::AppConfig;
use chronicle_core::error::AppError;
use chronicle_database::store::JobStore;
use chronicle_entity::job::{ArchivedJob, Job, JobFilter, JobStatus, JobType, RetryOutcome};

/// Arguments for job commands
#[derive(Debug, Args)]
pub struct JobsArgs {
    /// Job subcommand
    #[command(subcommand)]
    pub command: JobsCommand,
}

/// Job subcommands
#[derive(Debug, Subcommand)]
pub enum JobsCommand {
    /// List jobs, newest first
    List {
        /// Only jobs in this status (pending, running, failed, cancelled)
        #[arg(long)]
        status: Option<JobStatus>,
        /// Only jobs of this type (publish_post, publish_adv, send_notification)
        #[arg(long = "type")]
        job_type: Option<JobType>,
        /// Only jobs with this key
        #[arg(long)]
        key: Option<String>,
        /// Maximum number of jobs
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Show a single job
    Show {
        /// Job ID
        id: Uuid,
    },
    /// Count jobs per status
    Stats,
    /// Re-queue a failed job
    Retry {
        /// Job ID
        id: Uuid,
    },
    /// Cancel a pending job
    Cancel {
        /// Job ID
        id: Uuid,
    },
    /// Delete old failed and cancelled jobs
    Cleanup {
        /// Age in days; defaults to the configured retention
        #[arg(long)]
        days: Option<i64>,
        /// Skip confirmation
        #[arg(long)]
        force: bool,
    },
    /// List archived jobs
    Archived {
        /// Maximum number of jobs
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
}

/// Job display row
#[derive(Debug, Serialize, Tabled)]
struct JobRow {
    /// Job ID
    id: String,
    /// Job type
    job_type: String,
    /// Status
    status: String,
    /// Priority
    priority: i32,
    /// Scheduled for
    scheduled_for: String,
    /// Retries
    retries: String,
    /// Business key
    key: String,
}

impl From<&Job> for JobRow {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.to_string(),
            job_type: job.job_type().to_string(),
            status: job.status.to_string(),
            priority: job.priority,
            scheduled_for: job.scheduled_for.format("%Y-%m-%d %H:%M:%S").to_string(),
            retries: format!("{}/{}", job.retry_count, job.max_retries),
            key: job.job_key.clone().unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// Archived job display row
#[derive(Debug, Serialize, Tabled)]
struct ArchivedRow {
    /// Job ID
    id: String,
    /// Job type
    job_type: String,
    /// Retries it took
    retries: i32,
    /// Completed at
    completed_at: String,
    /// Handler result
    result: String,
}

impl From<&ArchivedJob> for ArchivedRow {
    fn from(job: &ArchivedJob) -> Self {
        Self {
            id: job.id.to_string(),
            job_type: job.payload.job_type().to_string(),
            retries: job.retry_count,
            completed_at: job.completed_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            result: job
                .result
                .as_ref()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// Execute job commands
pub async fn execute(
    args: &JobsArgs,
    store: &dyn JobStore,
    config: &AppConfig,
    format: OutputFormat,
) -> Result<(), AppError> {
    match &args.command {
        JobsCommand::List {
            status,
            job_type,
            key,
            limit,
        } => {
            let filter = JobFilter {
                status: *status,
                job_type: *job_type,
                job_key: key.clone(),
                limit: *limit,
            };
            let jobs = store.list(&filter).await?;
            let rows: Vec<JobRow> = jobs.iter().map(JobRow::from).collect();
            output::print_list(&rows, format);
        }
        JobsCommand::Show { id } => {
            let job = store
                .find_by_id(*id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("Job {id} not found")))?;
            output::print_item(&job, format);
        }
        JobsCommand::Stats => {
            let mut counts = Vec::new();
            for status in JobStatus::all() {
                counts.push((status, store.count_by_status(status).await?));
            }

            match format {
                OutputFormat::Table => {
                    println!("Job Status:");
                    for (status, count) in &counts {
                        output::print_kv(status.as_str(), &count.to_string());
                    }
                    output::print_kv("Worker Enabled", &config.worker.enabled.to_string());
                    output::print_kv(
                        "Poll Interval",
                        &format!("{}s", config.worker.poll_interval_seconds),
                    );
                }
                OutputFormat::Json => {
                    let map: serde_json::Map<String, serde_json::Value> = counts
                        .iter()
                        .map(|(status, count)| (status.as_str().to_string(), json!(count)))
                        .collect();
                    output::print_item(&map, format);
                }
            }
        }
        JobsCommand::Retry { id } => match store.retry(*id, None).await? {
            RetryOutcome::Rescheduled {
                retry_count,
                next_retry_at,
            } => output::print_success(&format!(
                "Job {id} re-queued (retry {retry_count}, due {next_retry_at})"
            )),
            RetryOutcome::Exhausted => {
                output::print_warning(&format!("Job {id} has no retries left; marked failed"))
            }
        },
        JobsCommand::Cancel { id } => {
            if store.cancel(*id).await? {
                output::print_success(&format!("Job {id} cancelled"));
            } else {
                output::print_warning(&format!("Job {id} is not pending; nothing cancelled"));
            }
        }
        JobsCommand::Cleanup { days, force } => {
            let days = days.unwrap_or(config.retention.days);
            if !force {
                let confirm = dialoguer::Confirm::new()
                    .with_prompt(format!(
                        "Delete failed and cancelled jobs older than {days} days?"
                    ))
                    .default(false)
                    .interact()
                    .map_err(|e| AppError::internal(format!("Input error: {e}")))?;

                if !confirm {
                    println!("Cancelled.");
                    return Ok(());
                }
            }

            let removed = store.cleanup_older_than(days).await?;
            output::print_success(&format!("Deleted {removed} jobs"));
        }
        JobsCommand::Archived { limit } => {
            let jobs = store.list_archived(*limit).await?;
            let rows: Vec<ArchivedRow> = jobs.iter().map(ArchivedRow::from).collect();
            output::print_list(&rows, format);
        }
    }

    Ok(())
}
