//! Job status and type enumerations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a scheduled job.
///
/// Successful completion is not a status: a finished job is deleted (or
/// moved to the archive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "cron_job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for its scheduled time and a worker.
    Pending,
    /// Claimed by the worker and executing.
    Running,
    /// Failed; terminal once retries are exhausted.
    Failed,
    /// Cancelled by an operator before it ran.
    Cancelled,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled)
    }

    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// All statuses, in lifecycle order.
    pub fn all() -> [Self; 4] {
        [Self::Pending, Self::Running, Self::Failed, Self::Cancelled]
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

/// Which handler executes a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "cron_job_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Publish an article at its scheduled date.
    PublishPost,
    /// Publish an ad at its scheduled date.
    PublishAdv,
    /// Deliver a scheduled notification.
    SendNotification,
}

impl JobType {
    /// Return the job type as its persisted name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PublishPost => "publish_post",
            Self::PublishAdv => "publish_adv",
            Self::SendNotification => "send_notification",
        }
    }

    /// All known job types.
    pub fn all() -> [Self; 3] {
        [Self::PublishPost, Self::PublishAdv, Self::SendNotification]
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown job type '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn test_job_type_names_parse_back() {
        for job_type in JobType::all() {
            assert_eq!(job_type.as_str().parse::<JobType>().unwrap(), job_type);
            assert_eq!(
                serde_json::to_value(job_type).unwrap(),
                serde_json::Value::String(job_type.as_str().to_string())
            );
        }
        assert!("publish_everything".parse::<JobType>().is_err());
    }
}
