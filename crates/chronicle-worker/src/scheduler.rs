//! Cron scheduler for retention maintenance.

use std::sync::Arc;

use tokio_cron_scheduler::{Job as CronJob, JobScheduler};

use chronicle_core::config::RetentionConfig;
use chronicle_core::error::{AppError, ErrorKind};
use chronicle_core::result::AppResult;
use chronicle_database::store::JobStore;

/// Periodically purges old `failed` and `cancelled` jobs.
pub struct MaintenanceScheduler {
    /// The underlying job scheduler
    scheduler: JobScheduler,
    /// Store to clean up
    store: Arc<dyn JobStore>,
}

impl std::fmt::Debug for MaintenanceScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaintenanceScheduler").finish()
    }
}

impl MaintenanceScheduler {
    /// Create a new scheduler with no tasks
    pub async fn new(store: Arc<dyn JobStore>) -> AppResult<Self> {
        let scheduler = JobScheduler::new().await.map_err(|e| {
            AppError::with_source(ErrorKind::Scheduler, "Failed to create scheduler", e)
        })?;

        Ok(Self { scheduler, store })
    }

    /// Register the retention cleanup, unless retention is disabled
    pub async fn register_retention(&self, config: &RetentionConfig) -> AppResult<()> {
        if !config.enabled {
            tracing::info!("Retention cleanup disabled");
            return Ok(());
        }

        let store = Arc::clone(&self.store);
        let days = config.days;
        let job = CronJob::new_async(config.schedule.as_str(), move |_uuid, _lock| {
            let store = Arc::clone(&store);
            Box::pin(async move {
                match run_cleanup(store.as_ref(), days).await {
                    Ok(removed) => tracing::info!(removed, days, "Job retention cleanup finished"),
                    Err(e) => tracing::error!(error = %e, days, "Job retention cleanup failed"),
                }
            })
        })
        .map_err(|e| {
            AppError::with_source(
                ErrorKind::Scheduler,
                format!("Invalid retention schedule '{}'", config.schedule),
                e,
            )
        })?;

        self.scheduler.add(job).await.map_err(|e| {
            AppError::with_source(ErrorKind::Scheduler, "Failed to add retention schedule", e)
        })?;

        tracing::info!(schedule = %config.schedule, days, "Registered: job retention cleanup");
        Ok(())
    }

    /// Start the scheduler
    pub async fn start(&self) -> AppResult<()> {
        self.scheduler.start().await.map_err(|e| {
            AppError::with_source(ErrorKind::Scheduler, "Failed to start scheduler", e)
        })?;

        tracing::info!("Maintenance scheduler started");
        Ok(())
    }

    /// Shutdown the scheduler
    pub async fn shutdown(&mut self) -> AppResult<()> {
        self.scheduler.shutdown().await.map_err(|e| {
            AppError::with_source(ErrorKind::Scheduler, "Failed to shutdown scheduler", e)
        })?;

        tracing::info!("Maintenance scheduler shut down");
        Ok(())
    }
}

/// Delete terminal jobs created more than `days` ago.
pub async fn run_cleanup(store: &dyn JobStore, days: i64) -> AppResult<u64> {
    tracing::debug!(days, "Running job retention cleanup");
    store.cleanup_older_than(days).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use chronicle_core::traits::clock::{Clock, ManualClock};
    use chronicle_database::MemoryJobStore;
    use chronicle_entity::job::{JobPayload, NewJob, ScheduleOptions};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_run_cleanup() {
        let clock = ManualClock::new(Utc::now());
        let store = MemoryJobStore::with_clock(Arc::new(clock.clone()));
        let job = store
            .insert(NewJob::new(
                JobPayload::SendNotification {
                    notification_id: Uuid::now_v7(),
                },
                ScheduleOptions::at(clock.now() + Duration::hours(1)),
            ))
            .await
            .unwrap();
        store.cancel(job.id).await.unwrap();

        assert_eq!(run_cleanup(&store, 30).await.unwrap(), 0);
        clock.advance(Duration::days(45));
        assert_eq!(run_cleanup(&store, 30).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_run_cleanup_reports_invalid_window() {
        let store = MemoryJobStore::new();
        let err = run_cleanup(&store, -7).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_invalid_schedule_rejected() {
        let scheduler = MaintenanceScheduler::new(Arc::new(MemoryJobStore::new()))
            .await
            .unwrap();
        let config = RetentionConfig {
            schedule: "not a cron".to_string(),
            ..RetentionConfig::default()
        };

        let err = scheduler.register_retention(&config).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Scheduler);

        let disabled = RetentionConfig {
            enabled: false,
            ..config
        };
        assert!(scheduler.register_retention(&disabled).await.is_ok());
    }
}
