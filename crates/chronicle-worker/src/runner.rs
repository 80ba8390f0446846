//! Worker loop that polls for due jobs and executes them.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use uuid::Uuid;

use chronicle_core::config::WorkerConfig;
use chronicle_core::result::AppResult;
use chronicle_database::store::JobStore;
use chronicle_entity::job::{Job, RetryOutcome};

use crate::backoff::BackoffPolicy;
use crate::executor::{JobExecutionError, JobExecutor};
use crate::ticker::SingleFlight;

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No job was due.
    Idle,
    /// The job succeeded and left the queue.
    Completed(Uuid),
    /// The job failed and was handed to the retry policy.
    Retried {
        /// The failed job.
        id: Uuid,
        /// Whether it was re-queued or failed for good.
        outcome: RetryOutcome,
    },
    /// The job failed but was deleted while it ran, so there is nothing to
    /// retry.
    Discarded(Uuid),
}

/// Polls the job store and resolves one job per tick
#[derive(Debug)]
pub struct WorkerRunner {
    /// Job store to claim from
    store: Arc<dyn JobStore>,
    /// Job executor for dispatching
    executor: Arc<JobExecutor>,
    /// Worker configuration
    config: WorkerConfig,
    /// Retry delay policy
    backoff: BackoffPolicy,
    /// Guards against overlapping ticks
    flight: SingleFlight,
}

impl WorkerRunner {
    /// Create a new worker runner
    pub fn new(store: Arc<dyn JobStore>, executor: Arc<JobExecutor>, config: WorkerConfig) -> Self {
        let backoff = BackoffPolicy::from_config(&config);
        Self {
            store,
            executor,
            config,
            backoff,
            flight: SingleFlight::new(),
        }
    }

    /// Whether a tick is currently executing
    pub fn is_busy(&self) -> bool {
        self.flight.is_busy()
    }

    /// Run until the cancel signal is received, then wait for the in-flight
    /// tick to finish.
    pub async fn run(self: Arc<Self>, mut cancel: watch::Receiver<bool>) {
        tracing::info!(
            poll_interval_seconds = self.config.poll_interval_seconds,
            archive_completed = self.config.archive_completed,
            backoff = ?self.backoff,
            handlers = ?self.executor.registered_types(),
            "Worker started"
        );

        let period = Duration::from_secs(self.config.poll_interval_seconds.max(1));
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *cancel.borrow() {
                break;
            }
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        tracing::info!("Worker received shutdown signal");
                        break;
                    }
                }
                _ = interval.tick() => self.spawn_tick(),
            }
        }

        if self.flight.is_busy() {
            tracing::info!("Worker waiting for the in-flight job to complete...");
        }
        self.flight.wait_idle().await;

        tracing::info!("Worker shut down complete");
    }

    /// Start a tick in the background unless one is still running.
    fn spawn_tick(self: &Arc<Self>) {
        let Some(permit) = self.flight.try_enter() else {
            tracing::trace!("Previous tick still running, skipping");
            return;
        };

        let runner = Arc::clone(self);
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = runner.run_once().await {
                tracing::error!(error = %e, "Worker tick failed");
            }
        });
    }

    /// Claim and resolve at most one due job.
    ///
    /// Store errors end the tick early; the job stays in whatever state the
    /// last successful store operation left it in.
    pub async fn run_once(&self) -> AppResult<TickOutcome> {
        let Some(job) = self.store.claim_next().await? else {
            tracing::trace!("No due jobs");
            return Ok(TickOutcome::Idle);
        };

        match self.executor.execute(&job).await {
            Ok(result) => {
                self.complete(&job, result).await?;
                Ok(TickOutcome::Completed(job.id))
            }
            Err(err) => self.fail(&job, &err).await,
        }
    }

    async fn complete(&self, job: &Job, result: Option<Value>) -> AppResult<()> {
        if self.config.archive_completed {
            self.store.archive_completed(job.id, result).await?;
        } else if !self.store.delete_by_id(job.id).await? {
            tracing::debug!(job.id = %job.id, "Completed job was already removed");
        }

        tracing::info!(job.id = %job.id, job_type = %job.job_type(), "Job completed successfully");
        Ok(())
    }

    async fn fail(&self, job: &Job, err: &JobExecutionError) -> AppResult<TickOutcome> {
        let message = err.to_string();
        let stack = err.stack();
        tracing::warn!(
            job.id = %job.id,
            job_type = %job.job_type(),
            retry_count = job.retry_count,
            error = %message,
            "Job failed"
        );

        self.store
            .mark_failed(job.id, &message, stack.as_deref())
            .await?;

        let outcome = match self.store.retry(job.id, self.backoff.delay_for(job)).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_not_found() => {
                tracing::warn!(job.id = %job.id, "Failed job was removed before it could be retried");
                return Ok(TickOutcome::Discarded(job.id));
            }
            Err(e) => return Err(e),
        };

        match outcome {
            RetryOutcome::Rescheduled {
                retry_count,
                next_retry_at,
            } => tracing::info!(
                job.id = %job.id,
                retry_count,
                %next_retry_at,
                "Job re-queued"
            ),
            RetryOutcome::Exhausted => tracing::error!(
                job.id = %job.id,
                job_type = %job.job_type(),
                max_retries = job.max_retries,
                "Job failed permanently: max retries exceeded"
            ),
        }

        Ok(TickOutcome::Retried {
            id: job.id,
            outcome,
        })
    }
}
