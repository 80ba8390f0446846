//! Publication side effects against the CMS content tables.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use chronicle_core::error::{AppError, ErrorKind};
use chronicle_core::result::AppResult;
use chronicle_core::traits::clock::Clock;
use chronicle_core::traits::content::ContentPublisher;

/// Flips publication flags on `articles`, `advs` and `notifications`.
///
/// The tables are owned by the CMS; only the columns touched here are
/// assumed to exist.
#[derive(Debug, Clone)]
pub struct PgContentRepository {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgContentRepository {
    /// Create a new content repository.
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    fn ensure_updated(rows: u64, entity: &str, id: Uuid) -> AppResult<u64> {
        if rows == 0 {
            return Err(AppError::not_found(format!("{entity} {id} not found")));
        }
        Ok(rows)
    }
}

#[async_trait]
impl ContentPublisher for PgContentRepository {
    async fn publish_article(&self, article_id: Uuid) -> AppResult<u64> {
        let result = sqlx::query("UPDATE articles SET published = TRUE, updated_at = $2 WHERE id = $1")
            .bind(article_id)
            .bind(self.clock.now())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to publish article", e))?;

        Self::ensure_updated(result.rows_affected(), "Article", article_id)
    }

    async fn publish_adv(&self, adv_id: Uuid) -> AppResult<u64> {
        let now = self.clock.now();
        let result = sqlx::query(
            "UPDATE advs SET published = TRUE, published_date = $2, updated_at = $2 WHERE id = $1",
        )
        .bind(adv_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to publish adv", e))?;

        Self::ensure_updated(result.rows_affected(), "Adv", adv_id)
    }

    async fn deliver_notification(&self, notification_id: Uuid) -> AppResult<u64> {
        let now = self.clock.now();
        let result = sqlx::query(
            "UPDATE notifications SET status = 'sent', sent_at = $2, updated_at = $2 WHERE id = $1",
        )
        .bind(notification_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to deliver notification", e)
        })?;

        Self::ensure_updated(result.rows_affected(), "Notification", notification_id)
    }
}
