//! Turns domain lifecycle events into job upserts and deletes.
//!
//! The domain layer calls the reconciler after it has committed an entity
//! write. Each call converges the job store towards "exactly one pending job
//! for this entity, due at its effective time", or "no job" when the entity
//! should not run. Calls are idempotent and independent per key.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use chronicle_core::result::AppResult;
use chronicle_core::traits::clock::Clock;
use chronicle_database::store::JobStore;
use chronicle_entity::job::{
    DEFAULT_PRIORITY, Job, JobPayload, JobType, ScheduleOptions, entity_job_key,
};

/// The kinds of deferred work an entity can schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    /// An article going live at its publication date.
    ArticlePublish,
    /// An ad going live at its publication date.
    AdvPublish,
    /// A notification sent at its delivery time.
    NotificationDelivery,
}

impl ScheduleKind {
    /// Job type created for this kind.
    pub fn job_type(self) -> JobType {
        match self {
            Self::ArticlePublish => JobType::PublishPost,
            Self::AdvPublish => JobType::PublishAdv,
            Self::NotificationDelivery => JobType::SendNotification,
        }
    }

    /// Entity kind segment of the job key.
    pub fn entity_kind(self) -> &'static str {
        match self {
            Self::ArticlePublish => "article",
            Self::AdvPublish => "adv",
            Self::NotificationDelivery => "notification",
        }
    }

    /// Payload for the job acting on `entity_id`.
    pub fn payload(self, entity_id: Uuid) -> JobPayload {
        match self {
            Self::ArticlePublish => JobPayload::PublishPost {
                article_id: entity_id,
            },
            Self::AdvPublish => JobPayload::PublishAdv { adv_id: entity_id },
            Self::NotificationDelivery => JobPayload::SendNotification {
                notification_id: entity_id,
            },
        }
    }

    /// The stable job key for `entity_id`.
    pub fn job_key(self, entity_id: Uuid) -> String {
        entity_job_key(self.job_type(), self.entity_kind(), entity_id)
    }
}

/// Editorial workflow state of a content entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EditorialStatus {
    /// Not ready for publication.
    Draft,
    /// Approved for publication.
    Published,
}

/// Publication flags carried by an entity write.
///
/// Older entities only carry the `published` flag; newer ones carry an
/// editorial status, which takes precedence when present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PublicationState {
    /// Legacy publication flag.
    pub published: bool,
    /// Editorial status, if the entity has one.
    pub status: Option<EditorialStatus>,
}

impl PublicationState {
    /// Whether the entity wants its publication job to run.
    pub fn should_run(&self) -> bool {
        match self.status {
            Some(status) => status == EditorialStatus::Published,
            None => self.published,
        }
    }
}

/// What a reconciliation call did to the job store.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// The entity's job is pending at its effective time.
    Scheduled(Job),
    /// The entity has no job; `removed` jobs were deleted.
    Cleared {
        /// Number of jobs deleted.
        removed: u64,
    },
}

/// Keeps one entity kind's jobs in step with its entities.
#[derive(Debug, Clone)]
pub struct JobReconciler {
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    kind: ScheduleKind,
}

impl JobReconciler {
    /// Create a reconciler for `kind`.
    pub fn new(store: Arc<dyn JobStore>, clock: Arc<dyn Clock>, kind: ScheduleKind) -> Self {
        Self { store, clock, kind }
    }

    /// The kind this reconciler manages.
    pub fn kind(&self) -> ScheduleKind {
        self.kind
    }

    /// React to an entity being created or updated.
    ///
    /// Schedules the entity's job at `effective_at` when `should_run` and the
    /// time is still ahead; otherwise removes any job for it. A past
    /// `effective_at` takes effect through the domain write itself, so no job
    /// is needed.
    pub async fn on_entity_scheduled(
        &self,
        entity_id: Uuid,
        effective_at: DateTime<Utc>,
        should_run: bool,
    ) -> AppResult<ReconcileOutcome> {
        let job_key = self.kind.job_key(entity_id);

        if !should_run || effective_at <= self.clock.now() {
            let removed = self.delete(&job_key).await?;
            return Ok(ReconcileOutcome::Cleared { removed });
        }

        let options = ScheduleOptions::at(effective_at).with_priority(DEFAULT_PRIORITY);
        let job = self
            .store
            .upsert_by_key(&job_key, self.kind.payload(entity_id), &options)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    job.key = %job_key,
                    error = %e,
                    "Failed to schedule job; the entity will not be processed at its effective time"
                );
            })?;

        tracing::debug!(job.id = %job.id, job.key = %job_key, scheduled_for = %effective_at, "Job scheduled");
        Ok(ReconcileOutcome::Scheduled(job))
    }

    /// [`on_entity_scheduled`](Self::on_entity_scheduled) driven by an
    /// entity's publication flags.
    pub async fn on_publication_changed(
        &self,
        entity_id: Uuid,
        effective_at: DateTime<Utc>,
        state: PublicationState,
    ) -> AppResult<ReconcileOutcome> {
        self.on_entity_scheduled(entity_id, effective_at, state.should_run())
            .await
    }

    /// React to an entity being deleted. Returns the number of jobs removed.
    pub async fn on_entity_removed(&self, entity_id: Uuid) -> AppResult<u64> {
        self.delete(&self.kind.job_key(entity_id)).await
    }

    async fn delete(&self, job_key: &str) -> AppResult<u64> {
        let removed = self.store.delete_by_key(job_key).await.inspect_err(|e| {
            tracing::error!(
                job.key = %job_key,
                error = %e,
                "Failed to remove job; a stale job may still run"
            );
        })?;

        if removed > 0 {
            tracing::debug!(job.key = %job_key, removed, "Job removed");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use chronicle_core::traits::clock::ManualClock;
    use chronicle_database::MemoryJobStore;
    use chronicle_entity::job::{JobFilter, JobStatus};

    fn setup(kind: ScheduleKind) -> (JobReconciler, Arc<MemoryJobStore>, ManualClock) {
        let clock = ManualClock::new(Utc::now());
        let store = Arc::new(MemoryJobStore::with_clock(Arc::new(clock.clone())));
        let reconciler = JobReconciler::new(store.clone(), Arc::new(clock.clone()), kind);
        (reconciler, store, clock)
    }

    #[test]
    fn test_job_keys() {
        let id = Uuid::nil();
        assert_eq!(
            ScheduleKind::AdvPublish.job_key(id),
            "publish_adv:adv:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            ScheduleKind::NotificationDelivery.payload(id).job_type(),
            JobType::SendNotification
        );
    }

    #[test]
    fn test_editorial_status_wins() {
        let state = PublicationState {
            published: true,
            status: Some(EditorialStatus::Draft),
        };
        assert!(!state.should_run());

        let state = PublicationState {
            published: false,
            status: Some(EditorialStatus::Published),
        };
        assert!(state.should_run());

        assert!(
            PublicationState {
                published: true,
                status: None
            }
            .should_run()
        );
        assert!(!PublicationState::default().should_run());
    }

    #[tokio::test]
    async fn test_future_publication_scheduled() {
        let (reconciler, store, clock) = setup(ScheduleKind::ArticlePublish);
        let article_id = Uuid::now_v7();
        let at = clock.now() + Duration::hours(3);

        let outcome = reconciler
            .on_entity_scheduled(article_id, at, true)
            .await
            .unwrap();

        let ReconcileOutcome::Scheduled(job) = outcome else {
            panic!("expected a scheduled job");
        };
        assert_eq!(job.scheduled_for, at);
        assert_eq!(job.priority, DEFAULT_PRIORITY);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.payload, JobPayload::PublishPost { article_id });
        assert_eq!(
            job.job_key.as_deref(),
            Some(format!("publish_post:article:{article_id}").as_str())
        );
        assert_eq!(store.list(&JobFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_events_converge() {
        let (reconciler, store, clock) = setup(ScheduleKind::ArticlePublish);
        let article_id = Uuid::now_v7();
        let at = clock.now() + Duration::hours(1);

        let first = reconciler.on_entity_scheduled(article_id, at, true).await.unwrap();
        let second = reconciler.on_entity_scheduled(article_id, at, true).await.unwrap();

        let (ReconcileOutcome::Scheduled(a), ReconcileOutcome::Scheduled(b)) = (first, second)
        else {
            panic!("expected scheduled jobs");
        };
        assert_eq!(a.id, b.id);
        assert_eq!(store.list(&JobFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unpublish_clears_job() {
        let (reconciler, store, clock) = setup(ScheduleKind::AdvPublish);
        let adv_id = Uuid::now_v7();
        let at = clock.now() + Duration::hours(1);

        reconciler.on_entity_scheduled(adv_id, at, true).await.unwrap();
        let outcome = reconciler
            .on_publication_changed(
                adv_id,
                at,
                PublicationState {
                    published: true,
                    status: Some(EditorialStatus::Draft),
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Cleared { removed: 1 });
        assert!(store.list(&JobFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_past_effective_time_clears_job() {
        let (reconciler, store, clock) = setup(ScheduleKind::ArticlePublish);
        let article_id = Uuid::now_v7();

        reconciler
            .on_entity_scheduled(article_id, clock.now() + Duration::hours(1), true)
            .await
            .unwrap();
        let outcome = reconciler
            .on_entity_scheduled(article_id, clock.now(), true)
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Cleared { removed: 1 });
        assert!(store.list(&JobFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_removal_is_idempotent() {
        let (reconciler, _, clock) = setup(ScheduleKind::NotificationDelivery);
        let id = Uuid::now_v7();
        reconciler
            .on_entity_scheduled(id, clock.now() + Duration::minutes(5), true)
            .await
            .unwrap();

        assert_eq!(reconciler.on_entity_removed(id).await.unwrap(), 1);
        assert_eq!(reconciler.on_entity_removed(id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_kinds_do_not_collide() {
        let clock = ManualClock::new(Utc::now());
        let store = Arc::new(MemoryJobStore::with_clock(Arc::new(clock.clone())));
        let articles =
            JobReconciler::new(store.clone(), Arc::new(clock.clone()), ScheduleKind::ArticlePublish);
        let advs = JobReconciler::new(store.clone(), Arc::new(clock.clone()), ScheduleKind::AdvPublish);
        let id = Uuid::now_v7();
        let at = clock.now() + Duration::hours(1);

        articles.on_entity_scheduled(id, at, true).await.unwrap();
        advs.on_entity_scheduled(id, at, true).await.unwrap();
        articles.on_entity_removed(id).await.unwrap();

        let left = store.list(&JobFilter::default()).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].job_type(), JobType::PublishAdv);
    }
}
