//! Article publication job handler.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use chronicle_core::traits::content::ContentPublisher;
use chronicle_entity::job::{Job, JobPayload, JobType};

use crate::executor::{JobExecutionError, JobHandler};

/// Publishes the article named in the payload
#[derive(Debug)]
pub struct PublishPostHandler {
    publisher: Arc<dyn ContentPublisher>,
}

impl PublishPostHandler {
    /// Create a new article publication handler
    pub fn new(publisher: Arc<dyn ContentPublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl JobHandler for PublishPostHandler {
    fn job_type(&self) -> JobType {
        JobType::PublishPost
    }

    async fn execute(&self, job: &Job) -> Result<Option<Value>, JobExecutionError> {
        let JobPayload::PublishPost { article_id } = job.payload else {
            return Err(JobExecutionError::InvalidPayload(format!(
                "expected a publish_post payload, got {}",
                job.job_type()
            )));
        };

        let updated = self.publisher.publish_article(article_id).await?;
        tracing::info!(job.id = %job.id, article_id = %article_id, "Article published");

        Ok(Some(json!({ "updated": updated })))
    }
}
