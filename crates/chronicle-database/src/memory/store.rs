//! In-memory job store.
//!
//! Mirrors the PostgreSQL store's semantics so that the reconciler and the
//! worker can be exercised without a database. All state sits behind one
//! lock, which makes every operation atomic with respect to the others.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use chronicle_core::error::AppError;
use chronicle_core::result::AppResult;
use chronicle_core::traits::clock::{Clock, SystemClock};
use chronicle_entity::job::{
    ArchivedJob, Job, JobError, JobFilter, JobPayload, JobStatus, JobType, NewJob, PayloadMatch,
    RetryOutcome, ScheduleOptions,
};

use crate::store::{JobStore, resolve_match_payload, retention_cutoff};

#[derive(Debug, Default)]
struct State {
    jobs: HashMap<Uuid, Job>,
    archive: Vec<ArchivedJob>,
}

impl State {
    /// Ids matching `pred`, oldest first.
    fn ids_where(&self, pred: impl Fn(&Job) -> bool) -> Vec<Uuid> {
        let mut found: Vec<&Job> = self.jobs.values().filter(|j| pred(j)).collect();
        found.sort_by_key(|j| (j.created_at, j.id));
        found.into_iter().map(|j| j.id).collect()
    }

    fn remove_where(&mut self, pred: impl Fn(&Job) -> bool) -> u64 {
        let before = self.jobs.len();
        self.jobs.retain(|_, job| !pred(job));
        (before - self.jobs.len()) as u64
    }

    /// Reschedule the first job matching `pred` or insert a new one, then
    /// drop every other job matching `pred`.
    fn upsert(
        &mut self,
        pred: impl Fn(&Job) -> bool,
        job_key: Option<&str>,
        payload: JobPayload,
        options: &ScheduleOptions,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Job {
        let scheduled_for = options.scheduled_for.unwrap_or(now);

        let kept = match self.ids_where(&pred).first().copied() {
            Some(id) => {
                let job = self.jobs.get_mut(&id);
                if let Some(job) = job {
                    job.status = JobStatus::Pending;
                    job.scheduled_for = scheduled_for;
                    job.priority = options.priority;
                    job.payload = payload;
                    job.updated_at = now;
                }
                id
            }
            None => {
                let job = new_job(job_key.map(str::to_string), payload, options, now);
                let id = job.id;
                self.jobs.insert(id, job);
                id
            }
        };

        let purged = self.remove_where(|j| j.id != kept && pred(j));
        if purged > 0 {
            debug!(job.id = %kept, purged, "Purged duplicate jobs after upsert");
        }

        self.jobs[&kept].clone()
    }
}

fn new_job(
    job_key: Option<String>,
    payload: JobPayload,
    options: &ScheduleOptions,
    now: chrono::DateTime<chrono::Utc>,
) -> Job {
    Job {
        id: Uuid::now_v7(),
        job_key,
        payload,
        status: JobStatus::Pending,
        priority: options.priority,
        scheduled_for: options.scheduled_for.unwrap_or(now),
        started_at: None,
        completed_at: None,
        retry_count: 0,
        max_retries: options.max_retries,
        retry_delay_ms: options.retry_delay_ms,
        next_retry_at: None,
        error: None,
        created_at: now,
        updated_at: now,
    }
}

/// Job store held entirely in process memory.
#[derive(Debug, Clone)]
pub struct MemoryJobStore {
    state: Arc<RwLock<State>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryJobStore {
    /// Create an empty store on wall-clock time.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store that reads time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            clock,
        }
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: NewJob) -> AppResult<Job> {
        job.options.validate()?;
        let job = new_job(job.job_key, job.payload, &job.options, self.clock.now());
        self.state.write().await.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Job>> {
        Ok(self.state.read().await.jobs.get(&id).cloned())
    }

    async fn list(&self, filter: &JobFilter) -> AppResult<Vec<Job>> {
        let state = self.state.read().await;
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|j| filter.matches(j))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        jobs.truncate(usize::try_from(filter.limit).unwrap_or(0));
        Ok(jobs)
    }

    async fn count_by_status(&self, status: JobStatus) -> AppResult<i64> {
        let state = self.state.read().await;
        Ok(state.jobs.values().filter(|j| j.status == status).count() as i64)
    }

    async fn claim_next(&self) -> AppResult<Option<Job>> {
        let now = self.clock.now();
        let mut state = self.state.write().await;

        let next = state
            .jobs
            .values()
            .filter(|j| j.is_due(now))
            .min_by_key(|j| (j.priority, j.scheduled_for, j.created_at, j.id))
            .map(|j| j.id);

        Ok(next.and_then(|id| {
            let job = state.jobs.get_mut(&id)?;
            job.status = JobStatus::Running;
            job.started_at = Some(now);
            job.updated_at = now;
            Some(job.clone())
        }))
    }

    async fn mark_failed(&self, id: Uuid, message: &str, stack: Option<&str>) -> AppResult<()> {
        let now = self.clock.now();
        if let Some(job) = self.state.write().await.jobs.get_mut(&id) {
            job.status = JobStatus::Failed;
            job.error = Some(JobError {
                message: message.to_string(),
                stack: stack.map(str::to_string),
                timestamp: now,
            });
            job.completed_at = Some(now);
            job.updated_at = now;
        }
        Ok(())
    }

    async fn cancel(&self, id: Uuid) -> AppResult<bool> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        match state.jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Pending => {
                job.status = JobStatus::Cancelled;
                job.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_by_id(&self, id: Uuid) -> AppResult<bool> {
        Ok(self.state.write().await.jobs.remove(&id).is_some())
    }

    async fn delete_by_key(&self, job_key: &str) -> AppResult<u64> {
        let mut state = self.state.write().await;
        Ok(state.remove_where(|j| j.job_key.as_deref() == Some(job_key)))
    }

    async fn delete_by_payload_match(
        &self,
        job_type: JobType,
        pattern: &PayloadMatch,
        pending_only: bool,
    ) -> AppResult<u64> {
        let mut state = self.state.write().await;
        Ok(state.remove_where(|j| {
            j.job_type() == job_type
                && j.payload.matches(pattern)
                && (!pending_only || j.status == JobStatus::Pending)
        }))
    }

    async fn upsert_by_key(
        &self,
        job_key: &str,
        payload: JobPayload,
        options: &ScheduleOptions,
    ) -> AppResult<Job> {
        options.validate()?;
        let job_type = payload.job_type();
        let now = self.clock.now();
        let mut state = self.state.write().await;

        Ok(state.upsert(
            |j| j.job_key.as_deref() == Some(job_key) && j.job_type() == job_type,
            Some(job_key),
            payload,
            options,
            now,
        ))
    }

    async fn upsert_by_payload_match(
        &self,
        job_type: JobType,
        pattern: &PayloadMatch,
        payload: Option<JobPayload>,
        options: &ScheduleOptions,
    ) -> AppResult<Job> {
        options.validate()?;
        let payload = resolve_match_payload(job_type, pattern, payload)?;
        let now = self.clock.now();
        let mut state = self.state.write().await;

        Ok(state.upsert(
            |j| j.job_type() == job_type && j.payload.matches(pattern),
            None,
            payload,
            options,
            now,
        ))
    }

    async fn retry(&self, id: Uuid, override_delay: Option<Duration>) -> AppResult<RetryOutcome> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let job = state
            .jobs
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("Job {id} not found")))?;

        if job.retries_exhausted() {
            let last = job.error.as_ref().map(|e| format!("last error: {}", e.message));
            job.updated_at = now;
            job.status = JobStatus::Failed;
            job.error = Some(JobError {
                message: "Max retries exceeded".to_string(),
                stack: last,
                timestamp: now,
            });
            return Ok(RetryOutcome::Exhausted);
        }

        let next_retry_at = job.next_retry_at(now, override_delay)?;
        job.updated_at = now;
        job.status = JobStatus::Pending;
        job.retry_count += 1;
        job.scheduled_for = next_retry_at;
        job.next_retry_at = Some(next_retry_at);
        job.started_at = None;
        job.completed_at = None;

        Ok(RetryOutcome::Rescheduled {
            retry_count: job.retry_count,
            next_retry_at,
        })
    }

    async fn archive_completed(&self, id: Uuid, result: Option<Value>) -> AppResult<()> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let job = state
            .jobs
            .remove(&id)
            .ok_or_else(|| AppError::not_found(format!("Job {id} not found")))?;

        state.archive.push(ArchivedJob {
            id: job.id,
            job_key: job.job_key,
            payload: job.payload,
            priority: job.priority,
            result,
            retry_count: job.retry_count,
            started_at: job.started_at,
            completed_at: now,
            created_at: job.created_at,
            archived_at: now,
        });
        Ok(())
    }

    async fn list_archived(&self, limit: i64) -> AppResult<Vec<ArchivedJob>> {
        let state = self.state.read().await;
        Ok(state
            .archive
            .iter()
            .rev()
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn cleanup_older_than(&self, days: i64) -> AppResult<u64> {
        let cutoff = retention_cutoff(self.clock.now(), days)?;
        let mut state = self.state.write().await;
        Ok(state.remove_where(|j| {
            matches!(j.status, JobStatus::Failed | JobStatus::Cancelled) && j.created_at < cutoff
        }))
    }
}
