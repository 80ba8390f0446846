//! # chronicle-core
//!
//! Core crate for Chronicle. Contains configuration schemas, the unified
//! error system, the clock abstraction used for every scheduling decision,
//! and the port through which job handlers reach the content domain.
//!
//! This crate has **no** internal dependencies on other Chronicle crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;

pub use error::AppError;
pub use result::AppResult;
