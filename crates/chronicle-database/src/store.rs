//! The job store contract.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use uuid::Uuid;

use chronicle_core::result::AppResult;
use chronicle_entity::job::{
    ArchivedJob, Job, JobFilter, JobPayload, JobStatus, JobType, NewJob, PayloadMatch,
    RetryOutcome, ScheduleOptions,
};

/// Durable collection of scheduled jobs.
///
/// This is the only shared mutable resource of the subsystem: the reconciler
/// and the worker interact with jobs exclusively through it. Every method is
/// a single atomic operation against the backing store. Transport failures
/// surface as `ErrorKind::Database` errors carrying the driver error as
/// source; nothing is retried or swallowed here.
#[async_trait]
pub trait JobStore: Send + Sync + std::fmt::Debug + 'static {
    /// Insert a new `pending` job with a fresh id.
    async fn insert(&self, job: NewJob) -> AppResult<Job>;

    /// Find a job by id.
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Job>>;

    /// List jobs matching `filter`, newest first.
    async fn list(&self, filter: &JobFilter) -> AppResult<Vec<Job>>;

    /// Number of jobs in `status`.
    async fn count_by_status(&self, status: JobStatus) -> AppResult<i64>;

    /// Atomically claim the next due job.
    ///
    /// Picks one `pending` job with `scheduled_for <= now`, lowest priority
    /// value first and earliest `scheduled_for` among equal priorities, and
    /// marks it `running` in the same step. Concurrent callers never receive
    /// the same job.
    async fn claim_next(&self) -> AppResult<Option<Job>>;

    /// Record a failure: `status = failed` plus the error and a timestamp.
    async fn mark_failed(&self, id: Uuid, message: &str, stack: Option<&str>) -> AppResult<()>;

    /// Cancel a `pending` job. Returns `false` if the job is missing or
    /// not pending.
    async fn cancel(&self, id: Uuid) -> AppResult<bool>;

    /// Delete a job by id. Returns whether a row was removed.
    async fn delete_by_id(&self, id: Uuid) -> AppResult<bool>;

    /// Delete every job carrying `job_key`.
    async fn delete_by_key(&self, job_key: &str) -> AppResult<u64>;

    /// Delete jobs of `job_type` whose payload contains `pattern`.
    ///
    /// With `pending_only`, running and terminal jobs are left alone.
    async fn delete_by_payload_match(
        &self,
        job_type: JobType,
        pattern: &PayloadMatch,
        pending_only: bool,
    ) -> AppResult<u64>;

    /// Create or reschedule the job identified by `(job_key, payload type)`.
    ///
    /// An existing job gets the new `scheduled_for`, `priority` and
    /// `payload` and goes back to `pending`; otherwise a job is inserted.
    /// Any other record sharing the pair is purged afterwards.
    async fn upsert_by_key(
        &self,
        job_key: &str,
        payload: JobPayload,
        options: &ScheduleOptions,
    ) -> AppResult<Job>;

    /// Like [`upsert_by_key`](Self::upsert_by_key), keyed by a payload
    /// sub-match. Without an explicit payload the pattern itself is used.
    async fn upsert_by_payload_match(
        &self,
        job_type: JobType,
        pattern: &PayloadMatch,
        payload: Option<JobPayload>,
        options: &ScheduleOptions,
    ) -> AppResult<Job>;

    /// Re-queue a failed job, or fail it for good once retries are spent.
    ///
    /// `override_delay` replaces the job's own `retry_delay_ms`. Returns
    /// `NotFound` when the job no longer exists.
    async fn retry(&self, id: Uuid, override_delay: Option<Duration>) -> AppResult<RetryOutcome>;

    /// Move a successfully completed job into the archive with its result.
    async fn archive_completed(&self, id: Uuid, result: Option<Value>) -> AppResult<()>;

    /// Most recently archived jobs first.
    async fn list_archived(&self, limit: i64) -> AppResult<Vec<ArchivedJob>>;

    /// Delete `failed` and `cancelled` jobs created more than `days` ago.
    ///
    /// A negative or unrepresentable `days` is a `Validation` error.
    async fn cleanup_older_than(&self, days: i64) -> AppResult<u64>;
}

/// Resolve the payload for an upsert keyed by payload match.
///
/// Shared by every store implementation so that both accept and reject the
/// same inputs.
pub(crate) fn resolve_match_payload(
    job_type: JobType,
    pattern: &PayloadMatch,
    payload: Option<JobPayload>,
) -> AppResult<JobPayload> {
    use chronicle_core::error::{AppError, ErrorKind};

    let payload = match payload {
        Some(payload) => payload,
        None => JobPayload::from_document(job_type, pattern.to_value()).map_err(|e| {
            AppError::with_source(
                ErrorKind::Validation,
                format!("Payload match is not a valid {job_type} payload"),
                e,
            )
        })?,
    };

    if payload.job_type() != job_type {
        return Err(AppError::validation(format!(
            "Payload of type {} cannot be scheduled as {job_type}",
            payload.job_type()
        )));
    }

    // A payload outside its own match would never be found again.
    if !payload.matches(pattern) {
        return Err(AppError::validation(
            "Payload does not satisfy the payload match it is keyed by",
        ));
    }

    Ok(payload)
}

/// Creation time before which terminal jobs fall out of a `days` retention
/// window.
pub(crate) fn retention_cutoff(now: DateTime<Utc>, days: i64) -> AppResult<DateTime<Utc>> {
    use chronicle_core::error::AppError;

    if days < 0 {
        return Err(AppError::validation(format!(
            "Retention days must not be negative, got {days}"
        )));
    }
    Duration::try_days(days)
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or_else(|| AppError::validation(format!("Retention of {days} days is out of range")))
}
