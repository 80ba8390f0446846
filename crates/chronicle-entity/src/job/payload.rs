//! Typed job payload definitions.
//!
//! Each job type owns exactly one payload shape. The row stores the tag in
//! its `job_type` column and the inner object as the JSON payload document.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use super::status::JobType;

/// Typed payloads for known job types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "job_type", content = "payload", rename_all = "snake_case")]
pub enum JobPayload {
    /// Publish an article.
    PublishPost {
        /// Article to publish.
        article_id: Uuid,
    },
    /// Publish an ad.
    PublishAdv {
        /// Ad to publish.
        adv_id: Uuid,
    },
    /// Deliver a notification.
    SendNotification {
        /// Notification to deliver.
        notification_id: Uuid,
    },
}

impl JobPayload {
    /// The job type this payload belongs to.
    pub fn job_type(&self) -> JobType {
        match self {
            Self::PublishPost { .. } => JobType::PublishPost,
            Self::PublishAdv { .. } => JobType::PublishAdv,
            Self::SendNotification { .. } => JobType::SendNotification,
        }
    }

    /// The inner payload document, without the type tag.
    pub fn to_document(&self) -> Value {
        match self {
            Self::PublishPost { article_id } => json!({ "article_id": article_id }),
            Self::PublishAdv { adv_id } => json!({ "adv_id": adv_id }),
            Self::SendNotification { notification_id } => {
                json!({ "notification_id": notification_id })
            }
        }
    }

    /// Rebuild a payload from its stored type tag and document.
    pub fn from_document(job_type: JobType, document: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(json!({ "job_type": job_type, "payload": document }))
    }

    /// Whether the stored document contains every field of `pattern`.
    pub fn matches(&self, pattern: &PayloadMatch) -> bool {
        pattern.is_satisfied_by(&self.to_document())
    }
}

/// A sub-document match against job payloads.
///
/// A job matches when every field of the pattern is present in its payload
/// with an equal value. An empty pattern matches every payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadMatch(Map<String, Value>);

impl PayloadMatch {
    /// An empty pattern.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field` to equal `value`.
    pub fn field(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Require `field` to hold the given entity id.
    pub fn entity(self, field: impl Into<String>, id: Uuid) -> Self {
        self.field(field, id.to_string())
    }

    /// The pattern as a JSON object (suitable for a JSONB `@>` query).
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Whether `document` satisfies the pattern.
    pub fn is_satisfied_by(&self, document: &Value) -> bool {
        self.0
            .iter()
            .all(|(field, expected)| document.get(field) == Some(expected))
    }

    /// Whether the pattern has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for PayloadMatch {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
