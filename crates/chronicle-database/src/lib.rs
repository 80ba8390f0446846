//! # chronicle-database
//!
//! The job store: the [`JobStore`] trait every other component talks to,
//! its PostgreSQL implementation, an in-memory implementation for tests and
//! local runs, connection pool management and schema migrations.

pub mod connection;
pub mod memory;
pub mod migration;
pub mod repositories;
pub mod store;

pub use connection::DatabasePool;
pub use memory::MemoryJobStore;
pub use repositories::content::PgContentRepository;
pub use repositories::job::PgJobStore;
pub use store::JobStore;
