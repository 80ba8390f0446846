//! Job entity model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use chronicle_core::error::AppError;
use chronicle_core::result::AppResult;

use super::payload::JobPayload;
use super::status::{JobStatus, JobType};

/// Priority given to jobs when the caller does not choose one.
pub const DEFAULT_PRIORITY: i32 = 5;
/// Retries allowed after the first failed attempt.
pub const DEFAULT_MAX_RETRIES: i32 = 3;
/// Delay before a failed job becomes claimable again.
pub const DEFAULT_RETRY_DELAY_MS: i64 = 5_000;
/// Longest per-job retry delay a store accepts (one day).
pub const MAX_RETRY_DELAY_MS: i64 = 86_400_000;

/// A scheduled job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier.
    pub id: Uuid,
    /// Business key used for deduplication (e.g. `"publish_post:article:<id>"`).
    pub job_key: Option<String>,
    /// Typed payload; its variant is the job type.
    #[serde(flatten)]
    pub payload: JobPayload,
    /// Current job status.
    pub status: JobStatus,
    /// Rank, lower runs first.
    pub priority: i32,
    /// The job must not run before this instant.
    pub scheduled_for: DateTime<Utc>,
    /// When the worker claimed the job.
    pub started_at: Option<DateTime<Utc>>,
    /// When the last attempt finished.
    pub completed_at: Option<DateTime<Utc>>,
    /// Number of times the job has been re-queued after a failure.
    pub retry_count: i32,
    /// Maximum number of re-queues.
    pub max_retries: i32,
    /// Delay between a failure and the next attempt.
    pub retry_delay_ms: i64,
    /// When the next retry becomes due.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Last failure.
    pub error: Option<JobError>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// The handler type for this job.
    pub fn job_type(&self) -> JobType {
        self.payload.job_type()
    }

    /// Whether the worker may claim this job at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.scheduled_for <= now
    }

    /// Whether another failure would exceed the retry budget.
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// The job's configured retry delay.
    pub fn retry_delay(&self) -> Duration {
        Duration::try_milliseconds(self.retry_delay_ms).unwrap_or(Duration::MAX)
    }

    /// When the next attempt becomes due, using `override_delay` if given and
    /// the job's own delay otherwise.
    pub fn next_retry_at(
        &self,
        now: DateTime<Utc>,
        override_delay: Option<Duration>,
    ) -> AppResult<DateTime<Utc>> {
        let delay = override_delay.unwrap_or_else(|| self.retry_delay());
        if delay < Duration::zero() {
            return Err(AppError::validation(format!(
                "Retry delay for job {} must not be negative",
                self.id
            )));
        }
        now.checked_add_signed(delay).ok_or_else(|| {
            AppError::validation(format!(
                "Retry delay of {delay} for job {} is out of range",
                self.id
            ))
        })
    }
}

/// A recorded failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    /// Error message.
    pub message: String,
    /// Chain of underlying causes, if any.
    pub stack: Option<String>,
    /// When the failure was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Scheduling fields shared by inserts and upserts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleOptions {
    /// Earliest run time; `None` means "now".
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Rank, 1 (first) to 10 (last).
    pub priority: i32,
    /// Applied on insert only.
    pub max_retries: i32,
    /// Applied on insert only.
    pub retry_delay_ms: i64,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            scheduled_for: None,
            priority: DEFAULT_PRIORITY,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl ScheduleOptions {
    /// Run as soon as possible.
    pub fn immediate() -> Self {
        Self::default()
    }

    /// Run at `scheduled_for`.
    pub fn at(scheduled_for: DateTime<Utc>) -> Self {
        Self {
            scheduled_for: Some(scheduled_for),
            ..Self::default()
        }
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the retry budget.
    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the retry delay.
    pub fn with_retry_delay_ms(mut self, retry_delay_ms: i64) -> Self {
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    /// Check the ranges a store accepts.
    pub fn validate(&self) -> AppResult<()> {
        if !(1..=10).contains(&self.priority) {
            return Err(AppError::validation(format!(
                "priority must be between 1 and 10, got {}",
                self.priority
            )));
        }
        if self.max_retries < 0 {
            return Err(AppError::validation("max_retries must not be negative"));
        }
        if !(0..=MAX_RETRY_DELAY_MS).contains(&self.retry_delay_ms) {
            return Err(AppError::validation(format!(
                "retry_delay_ms must be between 0 and {MAX_RETRY_DELAY_MS}, got {}",
                self.retry_delay_ms
            )));
        }
        Ok(())
    }
}

/// Data required to insert a new job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJob {
    /// Optional business key.
    pub job_key: Option<String>,
    /// Typed payload.
    pub payload: JobPayload,
    /// Scheduling fields.
    pub options: ScheduleOptions,
}

impl NewJob {
    /// A job without a business key.
    pub fn new(payload: JobPayload, options: ScheduleOptions) -> Self {
        Self {
            job_key: None,
            payload,
            options,
        }
    }

    /// Attach a business key.
    pub fn with_key(mut self, job_key: impl Into<String>) -> Self {
        self.job_key = Some(job_key.into());
        self
    }
}

/// What `retry` decided for a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryOutcome {
    /// Back to `pending`, due again at `next_retry_at`.
    Rescheduled {
        /// Retry count after the increment.
        retry_count: i32,
        /// When the job becomes claimable.
        next_retry_at: DateTime<Utc>,
    },
    /// Retries exhausted, the job stays `failed`.
    Exhausted,
}

/// Filter for listing jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFilter {
    /// Only jobs in this status.
    pub status: Option<JobStatus>,
    /// Only jobs of this type.
    pub job_type: Option<JobType>,
    /// Only jobs with this key.
    pub job_key: Option<String>,
    /// Maximum rows returned.
    pub limit: i64,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self {
            status: None,
            job_type: None,
            job_key: None,
            limit: 50,
        }
    }
}

impl JobFilter {
    /// Whether `job` passes every set criterion.
    pub fn matches(&self, job: &Job) -> bool {
        self.status.is_none_or(|s| job.status == s)
            && self.job_type.is_none_or(|t| job.job_type() == t)
            && self
                .job_key
                .as_deref()
                .is_none_or(|k| job.job_key.as_deref() == Some(k))
    }
}

/// A successfully completed job kept for auditing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedJob {
    /// Original job identifier.
    pub id: Uuid,
    /// Business key.
    pub job_key: Option<String>,
    /// Typed payload.
    #[serde(flatten)]
    pub payload: JobPayload,
    /// Priority at completion.
    pub priority: i32,
    /// Value returned by the handler.
    pub result: Option<serde_json::Value>,
    /// Retries it took.
    pub retry_count: i32,
    /// When the successful attempt started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the handler finished.
    pub completed_at: DateTime<Utc>,
    /// When the job was first created.
    pub created_at: DateTime<Utc>,
    /// When the job moved into the archive.
    pub archived_at: DateTime<Utc>,
}
