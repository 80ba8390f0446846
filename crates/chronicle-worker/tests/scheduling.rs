//! End-to-end scheduling flows: reconciler → store → worker → handler.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use tokio::sync::watch;
use uuid::Uuid;

use chronicle_core::config::{BackoffKind, WorkerConfig};
use chronicle_core::error::AppError;
use chronicle_core::result::AppResult;
use chronicle_core::traits::clock::{Clock, ManualClock};
use chronicle_core::traits::content::ContentPublisher;
use chronicle_database::MemoryJobStore;
use chronicle_database::store::JobStore;
use chronicle_entity::job::{
    Job, JobFilter, JobPayload, JobStatus, JobType, NewJob, RetryOutcome, ScheduleOptions,
};
use chronicle_worker::jobs::register_all;
use chronicle_worker::{
    JobExecutionError, JobExecutor, JobHandler, JobReconciler, ReconcileOutcome, ScheduleKind,
    TickOutcome, WorkerRunner,
};

#[derive(Debug, Default)]
struct Published(Mutex<Vec<Uuid>>);

#[async_trait]
impl ContentPublisher for Published {
    async fn publish_article(&self, article_id: Uuid) -> AppResult<u64> {
        self.0.lock().unwrap().push(article_id);
        Ok(1)
    }

    async fn publish_adv(&self, adv_id: Uuid) -> AppResult<u64> {
        self.0.lock().unwrap().push(adv_id);
        Ok(1)
    }

    async fn deliver_notification(&self, notification_id: Uuid) -> AppResult<u64> {
        self.0.lock().unwrap().push(notification_id);
        Ok(1)
    }
}

#[derive(Debug, Default)]
struct AlwaysFails {
    calls: AtomicUsize,
}

#[async_trait]
impl JobHandler for AlwaysFails {
    fn job_type(&self) -> JobType {
        JobType::PublishPost
    }

    async fn execute(&self, _job: &Job) -> Result<Option<Value>, JobExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AppError::internal("upstream unavailable").into())
    }
}

#[derive(Debug)]
struct Slow;

#[async_trait]
impl JobHandler for Slow {
    fn job_type(&self) -> JobType {
        JobType::SendNotification
    }

    async fn execute(&self, _job: &Job) -> Result<Option<Value>, JobExecutionError> {
        tokio::time::sleep(StdDuration::from_secs(30)).await;
        Ok(Some(json!({ "updated": 1 })))
    }
}

struct Harness {
    clock: ManualClock,
    store: Arc<MemoryJobStore>,
    published: Arc<Published>,
}

impl Harness {
    fn new() -> Self {
        let clock = ManualClock::new(Utc::now());
        let store = Arc::new(MemoryJobStore::with_clock(Arc::new(clock.clone())));
        Self {
            clock,
            store,
            published: Arc::new(Published::default()),
        }
    }

    fn reconciler(&self, kind: ScheduleKind) -> JobReconciler {
        JobReconciler::new(self.store.clone(), Arc::new(self.clock.clone()), kind)
    }

    fn runner(&self, config: WorkerConfig) -> WorkerRunner {
        let mut executor = JobExecutor::new();
        register_all(&mut executor, self.published.clone());
        WorkerRunner::new(self.store.clone(), Arc::new(executor), config)
    }

    fn runner_with(&self, handler: Arc<dyn JobHandler>, config: WorkerConfig) -> WorkerRunner {
        let mut executor = JobExecutor::new();
        executor.register(handler);
        WorkerRunner::new(self.store.clone(), Arc::new(executor), config)
    }

    async fn jobs(&self) -> Vec<Job> {
        self.store.list(&JobFilter::default()).await.unwrap()
    }
}

#[tokio::test]
async fn test_article_published_at_scheduled_time() {
    let h = Harness::new();
    let reconciler = h.reconciler(ScheduleKind::ArticlePublish);
    let runner = h.runner(WorkerConfig::default());
    let article_id = Uuid::now_v7();

    reconciler
        .on_entity_scheduled(article_id, h.clock.now() + Duration::hours(1), true)
        .await
        .unwrap();

    assert_eq!(runner.run_once().await.unwrap(), TickOutcome::Idle);
    h.clock.advance(Duration::minutes(59));
    assert_eq!(runner.run_once().await.unwrap(), TickOutcome::Idle);

    h.clock.advance(Duration::minutes(1));
    assert!(matches!(
        runner.run_once().await.unwrap(),
        TickOutcome::Completed(_)
    ));
    assert_eq!(*h.published.0.lock().unwrap(), vec![article_id]);
    assert!(h.jobs().await.is_empty());
}

#[tokio::test]
async fn test_reschedule_moves_single_job() {
    let h = Harness::new();
    let reconciler = h.reconciler(ScheduleKind::AdvPublish);
    let runner = h.runner(WorkerConfig::default());
    let adv_id = Uuid::now_v7();

    reconciler
        .on_entity_scheduled(adv_id, h.clock.now() + Duration::hours(1), true)
        .await
        .unwrap();
    reconciler
        .on_entity_scheduled(adv_id, h.clock.now() + Duration::hours(2), true)
        .await
        .unwrap();

    let jobs = h.jobs().await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].scheduled_for, h.clock.now() + Duration::hours(2));

    h.clock.advance(Duration::minutes(90));
    assert_eq!(runner.run_once().await.unwrap(), TickOutcome::Idle);

    h.clock.advance(Duration::minutes(30));
    runner.run_once().await.unwrap();
    assert_eq!(*h.published.0.lock().unwrap(), vec![adv_id]);
}

#[tokio::test]
async fn test_deleted_entity_never_runs() {
    let h = Harness::new();
    let reconciler = h.reconciler(ScheduleKind::ArticlePublish);
    let runner = h.runner(WorkerConfig::default());
    let article_id = Uuid::now_v7();

    reconciler
        .on_entity_scheduled(article_id, h.clock.now() + Duration::hours(1), true)
        .await
        .unwrap();
    assert_eq!(reconciler.on_entity_removed(article_id).await.unwrap(), 1);

    h.clock.advance(Duration::hours(2));
    assert_eq!(runner.run_once().await.unwrap(), TickOutcome::Idle);
    assert!(h.published.0.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let h = Harness::new();
    let reconciler = h.reconciler(ScheduleKind::NotificationDelivery);
    let id = Uuid::now_v7();
    let at = h.clock.now() + Duration::days(1);

    let mut ids = Vec::new();
    for _ in 0..5 {
        match reconciler.on_entity_scheduled(id, at, true).await.unwrap() {
            ReconcileOutcome::Scheduled(job) => ids.push(job.id),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(h.jobs().await.len(), 1);
}

#[tokio::test]
async fn test_retries_exhaust_into_failed() {
    let h = Harness::new();
    let handler = Arc::new(AlwaysFails::default());
    let runner = h.runner_with(handler.clone(), WorkerConfig::default());
    let job = h
        .store
        .insert(NewJob::new(
            JobPayload::PublishPost {
                article_id: Uuid::now_v7(),
            },
            ScheduleOptions::immediate()
                .with_max_retries(2)
                .with_retry_delay_ms(1_000),
        ))
        .await
        .unwrap();

    for expected in 1..=2 {
        let outcome = runner.run_once().await.unwrap();
        assert!(matches!(
            outcome,
            TickOutcome::Retried {
                outcome: RetryOutcome::Rescheduled { retry_count, .. },
                ..
            } if retry_count == expected
        ));
        assert_eq!(runner.run_once().await.unwrap(), TickOutcome::Idle);
        h.clock.advance(Duration::seconds(1));
    }

    assert_eq!(
        runner.run_once().await.unwrap(),
        TickOutcome::Retried {
            id: job.id,
            outcome: RetryOutcome::Exhausted,
        }
    );
    assert_eq!(handler.calls.load(Ordering::SeqCst), 3);

    let failed = h.store.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.retry_count, 2);
    assert_eq!(failed.error.unwrap().message, "Max retries exceeded");

    h.clock.advance(Duration::days(1));
    assert_eq!(runner.run_once().await.unwrap(), TickOutcome::Idle);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_exponential_backoff_spaces_retries() {
    let h = Harness::new();
    let config = WorkerConfig {
        backoff: BackoffKind::Exponential,
        max_backoff_seconds: 3_600,
        ..WorkerConfig::default()
    };
    let runner = h.runner_with(Arc::new(AlwaysFails::default()), config);
    h.store
        .insert(NewJob::new(
            JobPayload::PublishPost {
                article_id: Uuid::now_v7(),
            },
            ScheduleOptions::immediate().with_retry_delay_ms(1_000),
        ))
        .await
        .unwrap();

    let mut delays = Vec::new();
    for _ in 0..3 {
        let before = h.clock.now();
        let TickOutcome::Retried {
            outcome: RetryOutcome::Rescheduled { next_retry_at, .. },
            ..
        } = runner.run_once().await.unwrap()
        else {
            panic!("expected a rescheduled job");
        };
        delays.push(next_retry_at - before);
        h.clock.set(next_retry_at);
    }

    assert_eq!(
        delays,
        vec![
            Duration::seconds(1),
            Duration::seconds(2),
            Duration::seconds(4)
        ]
    );
}

#[tokio::test]
async fn test_priority_orders_due_jobs() {
    let h = Harness::new();
    let runner = h.runner(WorkerConfig::default());
    let low = Uuid::now_v7();
    let high = Uuid::now_v7();

    h.store
        .insert(NewJob::new(
            JobPayload::PublishPost { article_id: low },
            ScheduleOptions::immediate().with_priority(9),
        ))
        .await
        .unwrap();
    h.store
        .insert(NewJob::new(
            JobPayload::PublishAdv { adv_id: high },
            ScheduleOptions::immediate().with_priority(1),
        ))
        .await
        .unwrap();

    runner.run_once().await.unwrap();
    runner.run_once().await.unwrap();
    assert_eq!(*h.published.0.lock().unwrap(), vec![high, low]);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_drains_in_flight_job() {
    let h = Harness::new();
    let runner = Arc::new(h.runner_with(Arc::new(Slow), WorkerConfig::default()));
    let job = h
        .store
        .insert(NewJob::new(
            JobPayload::SendNotification {
                notification_id: Uuid::now_v7(),
            },
            ScheduleOptions::immediate(),
        ))
        .await
        .unwrap();

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(Arc::clone(&runner).run(rx));

    tokio::time::sleep(StdDuration::from_secs(1)).await;
    assert!(runner.is_busy());
    tx.send(true).unwrap();

    handle.await.unwrap();
    assert!(!runner.is_busy());
    assert!(h.store.find_by_id(job.id).await.unwrap().is_none());
}
