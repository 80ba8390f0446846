//! PostgreSQL repositories.

pub mod content;
pub mod job;
