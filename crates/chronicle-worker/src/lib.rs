//! Scheduled job processing for Chronicle.
//!
//! This crate provides:
//! - A reconciler that turns domain lifecycle events into job upserts
//! - A job executor that dispatches jobs to the handler for their type
//! - Built-in handlers for publishing content and delivering notifications
//! - A worker runner that polls the job store and resolves each attempt
//! - A cron scheduler for retention maintenance

pub mod backoff;
pub mod executor;
pub mod jobs;
pub mod reconciler;
pub mod runner;
pub mod scheduler;
pub mod ticker;

pub use backoff::BackoffPolicy;
pub use executor::{JobExecutionError, JobExecutor, JobHandler};
pub use reconciler::{EditorialStatus, JobReconciler, PublicationState, ReconcileOutcome, ScheduleKind};
pub use runner::{TickOutcome, WorkerRunner};
pub use scheduler::MaintenanceScheduler;
pub use ticker::SingleFlight;
