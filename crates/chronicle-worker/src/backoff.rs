//! Delay before a failed job is attempted again.

use chrono::Duration;

use chronicle_core::config::{BackoffKind, MAX_BACKOFF_SECONDS, WorkerConfig};
use chronicle_entity::job::Job;

/// Chooses the retry delay passed to the job store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffPolicy {
    /// Use the job's own `retry_delay_ms` every time.
    #[default]
    Fixed,
    /// `retry_delay_ms * 2^retry_count`, never above `max`.
    Exponential {
        /// Upper bound for the delay.
        max: Duration,
    },
}

impl BackoffPolicy {
    /// Build the policy selected in the worker configuration.
    pub fn from_config(config: &WorkerConfig) -> Self {
        match config.backoff {
            BackoffKind::Fixed => Self::Fixed,
            BackoffKind::Exponential => {
                let seconds = config.max_backoff_seconds.min(MAX_BACKOFF_SECONDS);
                Self::Exponential {
                    max: Duration::seconds(seconds as i64),
                }
            }
        }
    }

    /// Delay override for the next retry of `job`.
    ///
    /// `None` lets the store apply the job's configured delay.
    pub fn delay_for(&self, job: &Job) -> Option<Duration> {
        match self {
            Self::Fixed => None,
            Self::Exponential { max } => {
                let factor = 1_i64 << job.retry_count.clamp(0, 62);
                let ms = job.retry_delay_ms.saturating_mul(factor);
                Some(Duration::milliseconds(ms.min(max.num_milliseconds())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use chronicle_entity::job::{JobPayload, JobStatus};
    use uuid::Uuid;

    fn job(retry_count: i32, retry_delay_ms: i64) -> Job {
        let now = Utc::now();
        Job {
            id: Uuid::now_v7(),
            job_key: None,
            payload: JobPayload::PublishPost {
                article_id: Uuid::now_v7(),
            },
            status: JobStatus::Failed,
            priority: 5,
            scheduled_for: now,
            started_at: Some(now),
            completed_at: Some(now),
            retry_count,
            max_retries: 10,
            retry_delay_ms,
            next_retry_at: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_fixed_defers_to_job() {
        assert_eq!(BackoffPolicy::Fixed.delay_for(&job(4, 1_000)), None);
    }

    #[test]
    fn test_exponential_doubles_and_caps() {
        let policy = BackoffPolicy::Exponential {
            max: Duration::seconds(60),
        };
        assert_eq!(policy.delay_for(&job(0, 5_000)), Some(Duration::seconds(5)));
        assert_eq!(policy.delay_for(&job(1, 5_000)), Some(Duration::seconds(10)));
        assert_eq!(policy.delay_for(&job(3, 5_000)), Some(Duration::seconds(40)));
        assert_eq!(policy.delay_for(&job(4, 5_000)), Some(Duration::seconds(60)));
        assert_eq!(policy.delay_for(&job(200, 5_000)), Some(Duration::seconds(60)));
    }

    #[test]
    fn test_from_config() {
        let mut config = WorkerConfig::default();
        assert_eq!(BackoffPolicy::from_config(&config), BackoffPolicy::Fixed);

        config.backoff = BackoffKind::Exponential;
        config.max_backoff_seconds = 120;
        assert_eq!(
            BackoffPolicy::from_config(&config),
            BackoffPolicy::Exponential {
                max: Duration::seconds(120)
            }
        );

        config.max_backoff_seconds = u64::MAX;
        assert_eq!(
            BackoffPolicy::from_config(&config),
            BackoffPolicy::Exponential {
                max: Duration::days(1)
            }
        );
    }
}
