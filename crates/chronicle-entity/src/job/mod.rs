//! Scheduled job domain entities.

pub mod key;
pub mod model;
pub mod payload;
pub mod status;

pub use key::entity_job_key;
pub use model::{
    ArchivedJob, Job, JobError, JobFilter, NewJob, RetryOutcome, ScheduleOptions,
    DEFAULT_MAX_RETRIES, DEFAULT_PRIORITY, DEFAULT_RETRY_DELAY_MS, MAX_RETRY_DELAY_MS,
};
pub use payload::{JobPayload, PayloadMatch};
pub use status::{JobStatus, JobType};
