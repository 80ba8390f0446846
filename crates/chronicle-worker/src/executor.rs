//! Job executor: dispatches jobs to registered handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use chronicle_core::error::AppError;
use chronicle_entity::job::{Job, JobType};

/// Trait for job handler implementations
#[async_trait]
pub trait JobHandler: Send + Sync + std::fmt::Debug {
    /// The job type this handler processes
    fn job_type(&self) -> JobType;

    /// Execute the job. Handlers may be invoked more than once for the same
    /// job and must tolerate it.
    async fn execute(&self, job: &Job) -> Result<Option<Value>, JobExecutionError>;
}

/// Error from job execution
///
/// Every variant takes the same failure path in the worker: the job is
/// marked failed and re-queued until its retries are spent.
#[derive(Debug, thiserror::Error)]
pub enum JobExecutionError {
    /// Nothing is registered for the job's type
    #[error("No handler registered for job type '{0}'")]
    NoHandlerRegistered(JobType),

    /// The payload does not belong to the handler's job type
    #[error("Invalid job payload: {0}")]
    InvalidPayload(String),

    /// The handler's work failed
    #[error("Job failed: {0}")]
    Failed(#[from] AppError),
}

impl JobExecutionError {
    /// Underlying causes, for the persisted error record.
    pub fn stack(&self) -> Option<String> {
        match self {
            Self::Failed(err) => err.cause_chain(),
            _ => None,
        }
    }
}

/// Dispatches jobs to the appropriate handler based on job type
#[derive(Debug, Default)]
pub struct JobExecutor {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl JobExecutor {
    /// Create an executor with no handlers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job handler, replacing any previous one for its type
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        let job_type = handler.job_type();
        if self.handlers.insert(job_type, handler).is_some() {
            tracing::warn!(job_type = %job_type, "Replaced job handler");
        } else {
            tracing::info!(job_type = %job_type, "Registered job handler");
        }
    }

    /// Execute a job by dispatching to the correct handler
    pub async fn execute(&self, job: &Job) -> Result<Option<Value>, JobExecutionError> {
        let job_type = job.job_type();
        let handler = self
            .handlers
            .get(&job_type)
            .ok_or(JobExecutionError::NoHandlerRegistered(job_type))?;

        tracing::info!(
            job.id = %job.id,
            job_type = %job_type,
            attempt = job.retry_count + 1,
            max_attempts = job.max_retries + 1,
            "Executing job"
        );

        handler.execute(job).await
    }

    /// Check if a handler is registered for a job type
    pub fn has_handler(&self, job_type: JobType) -> bool {
        self.handlers.contains_key(&job_type)
    }

    /// The job types that currently have a handler, in declaration order
    pub fn registered_types(&self) -> Vec<JobType> {
        JobType::all()
            .into_iter()
            .filter(|t| self.handlers.contains_key(t))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use chronicle_core::error::ErrorKind;
    use chronicle_entity::job::{JobPayload, JobStatus};
    use serde_json::json;
    use uuid::Uuid;

    #[derive(Debug)]
    struct EchoHandler(JobType);

    #[async_trait]
    impl JobHandler for EchoHandler {
        fn job_type(&self) -> JobType {
            self.0
        }

        async fn execute(&self, job: &Job) -> Result<Option<Value>, JobExecutionError> {
            Ok(Some(json!({ "id": job.id })))
        }
    }

    fn job(payload: JobPayload) -> Job {
        let now = Utc::now();
        Job {
            id: Uuid::now_v7(),
            job_key: None,
            payload,
            status: JobStatus::Running,
            priority: 5,
            scheduled_for: now,
            started_at: Some(now),
            completed_at: None,
            retry_count: 0,
            max_retries: 3,
            retry_delay_ms: 5_000,
            next_retry_at: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_dispatch_by_type() {
        let mut executor = JobExecutor::new();
        executor.register(Arc::new(EchoHandler(JobType::PublishPost)));

        let job = job(JobPayload::PublishPost {
            article_id: Uuid::now_v7(),
        });
        let result = executor.execute(&job).await.unwrap();
        assert_eq!(result, Some(json!({ "id": job.id })));
    }

    #[tokio::test]
    async fn test_missing_handler() {
        let executor = JobExecutor::new();
        let job = job(JobPayload::PublishAdv {
            adv_id: Uuid::now_v7(),
        });

        let err = executor.execute(&job).await.unwrap_err();
        assert!(matches!(
            err,
            JobExecutionError::NoHandlerRegistered(JobType::PublishAdv)
        ));
        assert_eq!(
            err.to_string(),
            "No handler registered for job type 'publish_adv'"
        );
    }

    #[test]
    fn test_registered_types() {
        let mut executor = JobExecutor::new();
        executor.register(Arc::new(EchoHandler(JobType::SendNotification)));
        executor.register(Arc::new(EchoHandler(JobType::PublishPost)));
        executor.register(Arc::new(EchoHandler(JobType::PublishPost)));

        assert!(executor.has_handler(JobType::PublishPost));
        assert!(!executor.has_handler(JobType::PublishAdv));
        assert_eq!(
            executor.registered_types(),
            vec![JobType::PublishPost, JobType::SendNotification]
        );
    }

    #[test]
    fn test_stack_from_cause_chain() {
        let io = std::io::Error::other("socket closed");
        let err = JobExecutionError::Failed(AppError::with_source(
            ErrorKind::Database,
            "Failed to publish article",
            io,
        ));
        assert_eq!(err.stack().as_deref(), Some("socket closed"));
        assert_eq!(JobExecutionError::InvalidPayload("x".into()).stack(), None);
    }
}
