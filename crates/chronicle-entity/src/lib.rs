//! # chronicle-entity
//!
//! Entity models for Chronicle's scheduled-job subsystem. Every struct in
//! this crate represents a persisted job record or a value object used to
//! create, match or reschedule one. All entities derive `Debug`, `Clone`,
//! `Serialize` and `Deserialize`.

pub mod job;
