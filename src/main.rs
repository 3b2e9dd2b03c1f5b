//! scrip — loyalty points accounting service
//!
//! Long-running service that:
//! - Serves the user-facing API (register/login, order upload, balance,
//!   withdrawals) over HTTP with JWT authentication
//! - Polls the external accrual calculator in the background and credits
//!   balances as orders resolve

use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;

use scrip::api;
use scrip::config::Config;
use scrip::state::AppState;
use scrip::worker::AccrualWorker;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    let config = Config::from_env();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("scrip={},tower_http=info", config.log_level).into()
            }),
        )
        .init();

    tracing::info!(address = %config.run_address, "starting scrip");

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_conns)
        .min_connections(config.db_min_conns)
        .max_lifetime(config.db_max_conn_lifetime)
        .idle_timeout(config.db_max_conn_idle)
        .test_before_acquire(config.db_test_before_acquire)
        .connect(&config.database_uri)
        .await?;

    let shutdown = CancellationToken::new();
    let state = AppState::new(pool, &config, shutdown.clone())?;

    // Background reconciliation against the accrual system
    let worker = AccrualWorker::new(
        state.service.clone(),
        config.accrual_poll_interval,
        shutdown.clone(),
    );
    let worker_handle = tokio::spawn(worker.run());

    let listener = tokio::net::TcpListener::bind(&config.run_address).await?;
    tracing::info!("scrip listening on {}", config.run_address);

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // Server drained; give the worker its deadline to finish the current pass
    shutdown.cancel();
    if tokio::time::timeout(config.shutdown_timeout, worker_handle)
        .await
        .is_err()
    {
        tracing::warn!("accrual worker did not stop within the shutdown deadline");
    }

    tracing::info!("scrip stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received");
    shutdown.cancel();
}
