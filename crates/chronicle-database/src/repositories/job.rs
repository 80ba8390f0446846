//! PostgreSQL job store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use chronicle_core::error::{AppError, ErrorKind};
use chronicle_core::result::AppResult;
use chronicle_core::traits::clock::Clock;
use chronicle_entity::job::{
    ArchivedJob, Job, JobError, JobFilter, JobPayload, JobStatus, JobType, NewJob, PayloadMatch,
    RetryOutcome, ScheduleOptions,
};

use crate::store::{JobStore, resolve_match_payload, retention_cutoff};

const JOB_COLUMNS: &str = "id, job_key, job_type, status, priority, scheduled_for, started_at, \
     completed_at, retry_count, max_retries, retry_delay_ms, next_retry_at, payload, error, \
     created_at, updated_at";

const ARCHIVE_COLUMNS: &str = "id, job_key, job_type, priority, payload, result, retry_count, \
     started_at, completed_at, created_at, archived_at";

/// A `cron_jobs` row before its payload is decoded.
#[derive(Debug, FromRow)]
struct JobRow {
    id: Uuid,
    job_key: Option<String>,
    job_type: JobType,
    status: JobStatus,
    priority: i32,
    scheduled_for: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    retry_count: i32,
    max_retries: i32,
    retry_delay_ms: i64,
    next_retry_at: Option<DateTime<Utc>>,
    payload: Value,
    error: Option<Json<JobError>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = AppError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let payload = decode_payload(row.id, row.job_type, row.payload)?;
        Ok(Job {
            id: row.id,
            job_key: row.job_key,
            payload,
            status: row.status,
            priority: row.priority,
            scheduled_for: row.scheduled_for,
            started_at: row.started_at,
            completed_at: row.completed_at,
            retry_count: row.retry_count,
            max_retries: row.max_retries,
            retry_delay_ms: row.retry_delay_ms,
            next_retry_at: row.next_retry_at,
            error: row.error.map(|Json(e)| e),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A `cron_jobs_archive` row before its payload is decoded.
#[derive(Debug, FromRow)]
struct ArchivedRow {
    id: Uuid,
    job_key: Option<String>,
    job_type: JobType,
    priority: i32,
    payload: Value,
    result: Option<Value>,
    retry_count: i32,
    started_at: Option<DateTime<Utc>>,
    completed_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    archived_at: DateTime<Utc>,
}

impl TryFrom<ArchivedRow> for ArchivedJob {
    type Error = AppError;

    fn try_from(row: ArchivedRow) -> Result<Self, Self::Error> {
        let payload = decode_payload(row.id, row.job_type, row.payload)?;
        Ok(ArchivedJob {
            id: row.id,
            job_key: row.job_key,
            payload,
            priority: row.priority,
            result: row.result,
            retry_count: row.retry_count,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
            archived_at: row.archived_at,
        })
    }
}

fn decode_payload(id: Uuid, job_type: JobType, payload: Value) -> AppResult<JobPayload> {
    JobPayload::from_document(job_type, payload).map_err(|e| {
        AppError::with_source(
            ErrorKind::Serialization,
            format!("Job {id} has an invalid {job_type} payload"),
            e,
        )
    })
}

fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::with_source(ErrorKind::Database, context, e)
}

/// Job store backed by the `cron_jobs` table.
#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgJobStore {
    /// Create a new job store.
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    async fn insert_row(
        conn: &mut PgConnection,
        job_key: Option<&str>,
        payload: &JobPayload,
        options: &ScheduleOptions,
        now: DateTime<Utc>,
    ) -> AppResult<Job> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "INSERT INTO cron_jobs (id, job_key, job_type, status, priority, scheduled_for, \
             retry_count, max_retries, retry_delay_ms, payload, created_at, updated_at) \
             VALUES ($1, $2, $3, 'pending', $4, $5, 0, $6, $7, $8, $9, $9) \
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(job_key)
        .bind(payload.job_type())
        .bind(options.priority)
        .bind(options.scheduled_for.unwrap_or(now))
        .bind(options.max_retries)
        .bind(options.retry_delay_ms)
        .bind(payload.to_document())
        .bind(now)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_error("Failed to insert job"))?;

        row.try_into()
    }

    async fn reschedule_row(
        conn: &mut PgConnection,
        id: Uuid,
        payload: &JobPayload,
        options: &ScheduleOptions,
        now: DateTime<Utc>,
    ) -> AppResult<Job> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "UPDATE cron_jobs SET status = 'pending', scheduled_for = $2, priority = $3, \
             payload = $4, updated_at = $5 \
             WHERE id = $1 RETURNING {JOB_COLUMNS}"
        ))
        .bind(id)
        .bind(options.scheduled_for.unwrap_or(now))
        .bind(options.priority)
        .bind(payload.to_document())
        .bind(now)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_error("Failed to reschedule job"))?;

        row.try_into()
    }

    /// Serialize writers of the same logical job for the rest of the
    /// transaction.
    async fn lock_identity(conn: &mut PgConnection, identity: &str) -> AppResult<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(identity)
            .execute(&mut *conn)
            .await
            .map_err(db_error("Failed to lock job identity"))?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: NewJob) -> AppResult<Job> {
        job.options.validate()?;
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(db_error("Failed to acquire connection"))?;

        let job = Self::insert_row(
            &mut conn,
            job.job_key.as_deref(),
            &job.payload,
            &job.options,
            self.clock.now(),
        )
        .await?;

        tracing::debug!(
            job.id = %job.id,
            job_type = %job.job_type(),
            scheduled_for = %job.scheduled_for,
            "Inserted job"
        );
        Ok(job)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM cron_jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to find job"))?;

        row.map(Job::try_from).transpose()
    }

    async fn list(&self, filter: &JobFilter) -> AppResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM cron_jobs \
             WHERE ($1::cron_job_status IS NULL OR status = $1) \
               AND ($2::cron_job_type IS NULL OR job_type = $2) \
               AND ($3::text IS NULL OR job_key = $3) \
             ORDER BY created_at DESC LIMIT $4"
        ))
        .bind(filter.status)
        .bind(filter.job_type)
        .bind(filter.job_key.as_deref())
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list jobs"))?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn count_by_status(&self, status: JobStatus) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM cron_jobs WHERE status = $1")
            .bind(status)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("Failed to count jobs"))
    }

    async fn claim_next(&self) -> AppResult<Option<Job>> {
        let now = self.clock.now();
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "UPDATE cron_jobs SET status = 'running', started_at = $1, updated_at = $1 \
             WHERE id = ( \
                SELECT id FROM cron_jobs \
                WHERE status = 'pending' AND scheduled_for <= $1 \
                ORDER BY priority ASC, scheduled_for ASC, created_at ASC \
                FOR UPDATE SKIP LOCKED \
                LIMIT 1 \
             ) RETURNING {JOB_COLUMNS}"
        ))
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to claim job"))?;

        row.map(Job::try_from).transpose()
    }

    async fn mark_failed(&self, id: Uuid, message: &str, stack: Option<&str>) -> AppResult<()> {
        let now = self.clock.now();
        let error = JobError {
            message: message.to_string(),
            stack: stack.map(str::to_string),
            timestamp: now,
        };

        let result = sqlx::query(
            "UPDATE cron_jobs SET status = 'failed', error = $2, completed_at = $3, updated_at = $3 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(Json(&error))
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to mark job as failed"))?;

        if result.rows_affected() == 0 {
            tracing::debug!(job.id = %id, "Job to mark as failed no longer exists");
        }
        Ok(())
    }

    async fn cancel(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE cron_jobs SET status = 'cancelled', updated_at = $2 \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(self.clock.now())
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to cancel job"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_id(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM cron_jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete job"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_key(&self, job_key: &str) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM cron_jobs WHERE job_key = $1")
            .bind(job_key)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete jobs by key"))?;

        Ok(result.rows_affected())
    }

    async fn delete_by_payload_match(
        &self,
        job_type: JobType,
        pattern: &PayloadMatch,
        pending_only: bool,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "DELETE FROM cron_jobs \
             WHERE job_type = $1 AND payload @> $2 AND (NOT $3 OR status = 'pending')",
        )
        .bind(job_type)
        .bind(pattern.to_value())
        .bind(pending_only)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to delete jobs by payload"))?;

        Ok(result.rows_affected())
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

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        Self::lock_identity(&mut tx, &format!("key|{job_type}|{job_key}")).await?;

        let existing = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM cron_jobs WHERE job_key = $1 AND job_type = $2 \
             ORDER BY created_at ASC LIMIT 1 FOR UPDATE",
        )
        .bind(job_key)
        .bind(job_type)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("Failed to look up job by key"))?;

        let job = match existing {
            Some(id) => Self::reschedule_row(&mut tx, id, &payload, options, now).await?,
            None => Self::insert_row(&mut tx, Some(job_key), &payload, options, now).await?,
        };

        let purged = sqlx::query(
            "DELETE FROM cron_jobs WHERE job_key = $1 AND job_type = $2 AND id <> $3",
        )
        .bind(job_key)
        .bind(job_type)
        .bind(job.id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to purge duplicate jobs"))?
        .rows_affected();

        tx.commit()
            .await
            .map_err(db_error("Failed to commit job upsert"))?;

        if purged > 0 {
            tracing::warn!(job.key = %job_key, purged, "Purged duplicate jobs after upsert");
        }
        tracing::debug!(
            job.id = %job.id,
            job.key = %job_key,
            scheduled_for = %job.scheduled_for,
            "Upserted job by key"
        );
        Ok(job)
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
        let pattern_value = pattern.to_value();
        let now = self.clock.now();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        Self::lock_identity(&mut tx, &format!("match|{job_type}|{pattern_value}")).await?;

        let existing = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM cron_jobs WHERE job_type = $1 AND payload @> $2 \
             ORDER BY created_at ASC LIMIT 1 FOR UPDATE",
        )
        .bind(job_type)
        .bind(&pattern_value)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("Failed to look up job by payload"))?;

        let job = match existing {
            Some(id) => Self::reschedule_row(&mut tx, id, &payload, options, now).await?,
            None => Self::insert_row(&mut tx, None, &payload, options, now).await?,
        };

        sqlx::query("DELETE FROM cron_jobs WHERE job_type = $1 AND payload @> $2 AND id <> $3")
            .bind(job_type)
            .bind(&pattern_value)
            .bind(job.id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to purge duplicate jobs"))?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit job upsert"))?;

        Ok(job)
    }

    async fn retry(&self, id: Uuid, override_delay: Option<Duration>) -> AppResult<RetryOutcome> {
        let now = self.clock.now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM cron_jobs WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("Failed to load job for retry"))?
        .ok_or_else(|| AppError::not_found(format!("Job {id} not found")))?;
        let job = Job::try_from(row)?;

        let outcome = if job.retries_exhausted() {
            let error = JobError {
                message: "Max retries exceeded".to_string(),
                stack: job
                    .error
                    .as_ref()
                    .map(|e| format!("last error: {}", e.message)),
                timestamp: now,
            };
            sqlx::query(
                "UPDATE cron_jobs SET status = 'failed', error = $2, updated_at = $3 WHERE id = $1",
            )
            .bind(id)
            .bind(Json(&error))
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to fail exhausted job"))?;

            RetryOutcome::Exhausted
        } else {
            let next_retry_at = job.next_retry_at(now, override_delay)?;
            sqlx::query(
                "UPDATE cron_jobs SET status = 'pending', retry_count = retry_count + 1, \
                 scheduled_for = $2, next_retry_at = $2, started_at = NULL, completed_at = NULL, \
                 updated_at = $3 WHERE id = $1",
            )
            .bind(id)
            .bind(next_retry_at)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to requeue job"))?;

            RetryOutcome::Rescheduled {
                retry_count: job.retry_count + 1,
                next_retry_at,
            }
        };

        tx.commit()
            .await
            .map_err(db_error("Failed to commit job retry"))?;

        Ok(outcome)
    }

    async fn archive_completed(&self, id: Uuid, result: Option<Value>) -> AppResult<()> {
        let now = self.clock.now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        let archived = sqlx::query(
            "INSERT INTO cron_jobs_archive (id, job_key, job_type, priority, payload, result, \
             retry_count, started_at, completed_at, created_at, archived_at) \
             SELECT id, job_key, job_type, priority, payload, $2, retry_count, started_at, $3, \
             created_at, $3 FROM cron_jobs WHERE id = $1",
        )
        .bind(id)
        .bind(result)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to archive job"))?;

        if archived.rows_affected() == 0 {
            return Err(AppError::not_found(format!("Job {id} not found")));
        }

        sqlx::query("DELETE FROM cron_jobs WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to delete archived job"))?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit job archive"))?;
        Ok(())
    }

    async fn list_archived(&self, limit: i64) -> AppResult<Vec<ArchivedJob>> {
        let rows = sqlx::query_as::<_, ArchivedRow>(&format!(
            "SELECT {ARCHIVE_COLUMNS} FROM cron_jobs_archive ORDER BY archived_at DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list archived jobs"))?;

        rows.into_iter().map(ArchivedJob::try_from).collect()
    }

    async fn cleanup_older_than(&self, days: i64) -> AppResult<u64> {
        let cutoff = retention_cutoff(self.clock.now(), days)?;
        let result = sqlx::query(
            "DELETE FROM cron_jobs WHERE status IN ('failed', 'cancelled') AND created_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to cleanup jobs"))?;

        Ok(result.rows_affected())
    }
}
