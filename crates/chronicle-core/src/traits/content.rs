//! Port into the content domain used by the built-in job handlers.

use async_trait::async_trait;
use uuid::Uuid;

use crate::result::AppResult;

/// Domain mutations that scheduled jobs perform.
///
/// Each method returns the number of records it changed, or a `NotFound`
/// error when the entity no longer exists. Implementations must be safe to
/// call more than once for the same entity: jobs are delivered at least once.
#[async_trait]
pub trait ContentPublisher: Send + Sync + std::fmt::Debug + 'static {
    /// Mark an article as published.
    async fn publish_article(&self, article_id: Uuid) -> AppResult<u64>;

    /// Mark an ad as published and stamp its publication date.
    async fn publish_adv(&self, adv_id: Uuid) -> AppResult<u64>;

    /// Mark a scheduled notification as sent.
    async fn deliver_notification(&self, notification_id: Uuid) -> AppResult<u64>;
}
