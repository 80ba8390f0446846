//! Ad publication job handler.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use chronicle_core::traits::content::ContentPublisher;
use chronicle_entity::job::{Job, JobPayload, JobType};

use crate::executor::{JobExecutionError, JobHandler};

/// Publishes an ad and stamps its publication date
#[derive(Debug)]
pub struct PublishAdvHandler {
    publisher: Arc<dyn ContentPublisher>,
}

impl PublishAdvHandler {
    /// Create a new ad publication handler
    pub fn new(publisher: Arc<dyn ContentPublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl JobHandler for PublishAdvHandler {
    fn job_type(&self) -> JobType {
        JobType::PublishAdv
    }

    async fn execute(&self, job: &Job) -> Result<Option<Value>, JobExecutionError> {
        let JobPayload::PublishAdv { adv_id } = job.payload else {
            return Err(JobExecutionError::InvalidPayload(format!(
                "expected a publish_adv payload, got {}",
                job.job_type()
            )));
        };

        let updated = self.publisher.publish_adv(adv_id).await?;
        tracing::info!(job.id = %job.id, adv_id = %adv_id, "Adv published");

        Ok(Some(json!({ "updated": updated })))
    }
}
