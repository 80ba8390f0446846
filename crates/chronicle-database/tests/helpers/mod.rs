//! Shared setup for the PostgreSQL job store tests.
//!
//! Tests run only when `DATABASE_URL` points at a disposable database; the
//! job tables are emptied before each test.

use std::sync::{Arc, LazyLock};

use chrono::{SubsecRound, Utc};
use sqlx::PgPool;
use tokio::sync::{Mutex, MutexGuard};

use chronicle_core::config::DatabaseConfig;
use chronicle_core::traits::clock::ManualClock;
use chronicle_database::migration::run_migrations;
use chronicle_database::{DatabasePool, PgJobStore};

/// Tests share one database, so they take turns.
static SERIAL: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// Test database context
pub struct TestDb {
    /// Job store under test
    pub store: PgJobStore,
    /// Clock driving the store
    pub clock: ManualClock,
    /// Pool for direct queries
    pub pool: PgPool,
    _serial: MutexGuard<'static, ()>,
}

impl TestDb {
    /// Connect, migrate and clean. `None` when `DATABASE_URL` is unset.
    pub async fn connect() -> Option<Self> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set, skipping PostgreSQL job store test");
            return None;
        };
        let serial = SERIAL.lock().await;

        let config = DatabaseConfig {
            url,
            application_name: "chronicle-tests".to_string(),
            max_connections: 20,
            min_connections: 1,
            connect_timeout_seconds: 10,
            idle_timeout_seconds: 60,
        };
        let db = DatabasePool::connect(&config)
            .await
            .expect("Failed to connect to test database");
        run_migrations(db.pool())
            .await
            .expect("Failed to run migrations");

        let pool = db.pool().clone();
        Self::clean_database(&pool).await;

        // TIMESTAMPTZ keeps microseconds.
        let clock = ManualClock::new(Utc::now().trunc_subsecs(6));
        let store = PgJobStore::new(pool.clone(), Arc::new(clock.clone()));

        Some(Self {
            store,
            clock,
            pool,
            _serial: serial,
        })
    }

    /// Number of rows in `cron_jobs` with the given key.
    pub async fn rows_with_key(&self, job_key: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM cron_jobs WHERE job_key = $1")
            .bind(job_key)
            .fetch_one(&self.pool)
            .await
            .expect("Failed to count jobs")
    }

    async fn clean_database(pool: &PgPool) {
        for table in ["cron_jobs_archive", "cron_jobs"] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(pool)
                .await
                .expect("Failed to clean test tables");
        }
    }
}
