//! Built-in job handler implementations.

pub mod publish_adv;
pub mod publish_post;
pub mod send_notification;

use std::sync::Arc;

use chronicle_core::traits::content::ContentPublisher;

use crate::executor::JobExecutor;

pub use publish_adv::PublishAdvHandler;
pub use publish_post::PublishPostHandler;
pub use send_notification::SendNotificationHandler;

/// Register a handler for every built-in job type.
pub fn register_all(executor: &mut JobExecutor, publisher: Arc<dyn ContentPublisher>) {
    executor.register(Arc::new(PublishPostHandler::new(Arc::clone(&publisher))));
    executor.register(Arc::new(PublishAdvHandler::new(Arc::clone(&publisher))));
    executor.register(Arc::new(SendNotificationHandler::new(publisher)));
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use uuid::Uuid;

    use chronicle_core::error::AppError;
    use chronicle_core::result::AppResult;
    use chronicle_core::traits::content::ContentPublisher;

    /// Records every call; ids in `missing` report `NotFound`.
    #[derive(Debug, Default)]
    pub struct RecordingPublisher {
        pub calls: Mutex<Vec<(&'static str, Uuid)>>,
        pub missing: Vec<Uuid>,
    }

    impl RecordingPublisher {
        fn record(&self, what: &'static str, id: Uuid) -> AppResult<u64> {
            if self.missing.contains(&id) {
                return Err(AppError::not_found(format!("{what} {id} not found")));
            }
            self.calls.lock().unwrap().push((what, id));
            Ok(1)
        }
    }

    #[async_trait]
    impl ContentPublisher for RecordingPublisher {
        async fn publish_article(&self, article_id: Uuid) -> AppResult<u64> {
            self.record("article", article_id)
        }

        async fn publish_adv(&self, adv_id: Uuid) -> AppResult<u64> {
            self.record("adv", adv_id)
        }

        async fn deliver_notification(&self, notification_id: Uuid) -> AppResult<u64> {
            self.record("notification", notification_id)
        }
    }
}
