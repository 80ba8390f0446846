//! Scheduled notification delivery.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use chronicle_core::traits::content::ContentPublisher;
use chronicle_entity::job::{Job, JobPayload, JobType};

use crate::executor::{JobExecutionError, JobHandler};

/// Marks a scheduled notification as sent
#[derive(Debug)]
pub struct SendNotificationHandler {
    publisher: Arc<dyn ContentPublisher>,
}

impl SendNotificationHandler {
    /// Create a new notification delivery handler
    pub fn new(publisher: Arc<dyn ContentPublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl JobHandler for SendNotificationHandler {
    fn job_type(&self) -> JobType {
        JobType::SendNotification
    }

    async fn execute(&self, job: &Job) -> Result<Option<Value>, JobExecutionError> {
        let JobPayload::SendNotification { notification_id } = job.payload else {
            return Err(JobExecutionError::InvalidPayload(format!(
                "expected a send_notification payload, got {}",
                job.job_type()
            )));
        };

        let updated = self.publisher.deliver_notification(notification_id).await?;
        tracing::info!(
            job.id = %job.id,
            notification_id = %notification_id,
            "Notification delivered"
        );

        Ok(Some(json!({ "updated": updated })))
    }
}
