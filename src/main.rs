//! Chronicle worker daemon.
//!
//! Wires the job store, the handler registry, the worker loop and the
//! maintenance scheduler together, then runs until SIGINT or SIGTERM.

use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt};

use chronicle_core::config::{AppConfig, LogFormat};
use chronicle_core::error::AppError;
use chronicle_core::traits::clock::{Clock, SystemClock};
use chronicle_core::traits::content::ContentPublisher;
use chronicle_database::store::JobStore;
use chronicle_database::{DatabasePool, PgContentRepository, PgJobStore};
use chronicle_worker::{JobExecutor, MaintenanceScheduler, WorkerRunner};

#[tokio::main]
async fn main() {
    let env = std::env::var("CHRONICLE_ENV").unwrap_or_else(|_| "development".to_string());
    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);
    tracing::info!(env = %env, "Configuration loaded");

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, cause = ?e.cause_chain(), "Worker daemon failed");
        std::process::exit(1);
    }
}

/// Install the global tracing subscriber.
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = fmt().with_env_filter(filter).with_target(true);

    match config.logging.format {
        LogFormat::Json => builder.json().with_thread_ids(true).init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

/// Connect, start the worker and maintenance tasks, and block until a
/// shutdown signal has been handled.
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Chronicle v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Database connection + migrations ─────────────────
    let db = DatabasePool::connect(&config.database).await?;
    chronicle_database::migration::run_migrations(db.pool()).await?;

    // ── Step 2: Store and domain port ────────────────────────────
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store: Arc<dyn JobStore> = Arc::new(PgJobStore::new(db.pool().clone(), Arc::clone(&clock)));
    let publisher: Arc<dyn ContentPublisher> =
        Arc::new(PgContentRepository::new(db.pool().clone(), Arc::clone(&clock)));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Step 3: Worker loop ──────────────────────────────────────
    let worker_handle = if config.worker.enabled {
        let mut executor = JobExecutor::new();
        chronicle_worker::jobs::register_all(&mut executor, publisher);

        let runner = Arc::new(WorkerRunner::new(
            Arc::clone(&store),
            Arc::new(executor),
            config.worker.clone(),
        ));
        let handle = tokio::spawn(runner.run(shutdown_rx));

        tracing::info!("Background worker started");
        Some(handle)
    } else {
        tracing::info!("Background worker disabled");
        None
    };

    // ── Step 4: Maintenance scheduler ────────────────────────────
    let mut scheduler = MaintenanceScheduler::new(Arc::clone(&store)).await?;
    scheduler.register_retention(&config.retention).await?;
    scheduler.start().await?;

    // ── Step 5: Graceful shutdown ────────────────────────────────
    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown...");
    let _ = shutdown_tx.send(true);

    if let Some(handle) = worker_handle {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Worker task ended abnormally");
        }
    }

    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!(error = %e, "Maintenance scheduler did not shut down cleanly");
    }
    db.close().await;

    tracing::info!("Chronicle shut down gracefully");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
