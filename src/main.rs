//! Postdate scheduled file delivery service.
//!
//! Main entry point. Wires the Postgres item store, SMTP notifier, sweep
//! scheduler and HTTP API together, runs the timer trigger, and coordinates
//! graceful startup and shutdown.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use postdate_api::{AppState, Config};
use postdate_core::{BroadcastHub, RealClock};
use postdate_sweep::{notifier::SmtpNotifier, store::PostgresItemStore, SweepScheduler};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config.rust_log);

    info!("Starting Postdate delivery service");
    info!(
        database_url = %config.database_url_masked(),
        public_base_url = %config.public_base_url,
        sweep_interval = config.sweep_interval_seconds,
        "Configuration loaded"
    );

    let pool = create_database_pool(&config).await?;
    info!("Database connection pool established");

    sqlx::migrate!("./migrations").run(&pool).await.context("Failed to run migrations")?;
    info!("Database migrations completed");

    let store = Arc::new(PostgresItemStore::new(pool.clone()));
    let notifier = Arc::new(
        SmtpNotifier::new(&config.to_smtp_config()).context("Failed to build SMTP transport")?,
    );
    let hub = BroadcastHub::default();
    let clock = Arc::new(RealClock::new());
    let scheduler = Arc::new(SweepScheduler::new(
        store.clone(),
        notifier,
        config.to_sweep_config(),
        clock.clone(),
        Arc::new(hub.clone()),
    ));

    // Timer trigger: periodic sweeps alongside the manual HTTP trigger.
    let shutdown = CancellationToken::new();
    let timer_handle = tokio::spawn(run_sweep_timer(
        scheduler.clone(),
        Duration::from_secs(config.sweep_interval_seconds),
        shutdown.clone(),
    ));

    let state = AppState { scheduler, store, hub, clock };
    let addr = config.parse_server_addr()?;
    info!(addr = %addr, "Postdate is ready");

    let server_result = postdate_api::start_server(state, addr).await;

    shutdown.cancel();
    if let Err(e) = timer_handle.await {
        warn!(error = %e, "Sweep timer task panicked");
    }

    pool.close().await;
    info!("Database connections closed");

    server_result.context("Server failed")?;
    info!("Postdate shutdown complete");
    Ok(())
}

/// Runs periodic sweeps until cancelled.
///
/// A failed sweep is logged and the timer keeps ticking; the next tick (or
/// any other trigger) retries naturally because pending items stay pending.
async fn run_sweep_timer(
    scheduler: Arc<SweepScheduler>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // interval fires immediately; consume the first tick so the first sweep
    // waits one full interval after startup.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = scheduler.sweep().await {
                    error!(error = %e, "Timer-triggered sweep failed");
                }
            },
            () = shutdown.cancelled() => {
                info!("Sweep timer stopped");
                return;
            },
        }
    }
}

/// Initializes tracing with environment-based configuration.
fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer().with_target(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Creates the database connection pool with retry logic.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    let mut retries = 0;
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    loop {
        match PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connection_timeout))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => {
                sqlx::query("SELECT 1")
                    .execute(&pool)
                    .await
                    .context("Failed to verify database connection")?;
                return Ok(pool);
            },
            Err(_e) if retries < MAX_RETRIES => {
                retries += 1;
                info!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    "Database connection failed, retrying..."
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("Failed to connect to database");
            },
        }
    }
}
