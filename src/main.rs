//! StatMon daemon
//!
//! Run with: cargo run
//!
//! See [`statmon::config`] for the environment variables. RUST_LOG sets the
//! log level (default: info).

use std::sync::Arc;

use statmon::alerts::{AlertEngine, DedupGuard, Dispatcher, EnvSinkProvider};
use statmon::api::{run_status_server, AppState};
use statmon::config::{DaemonConfig, NotifySettings};
use statmon::scheduler::{HeartbeatJob, Scheduler};
use statmon::station::{FileStore, StationStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "statmon=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = DaemonConfig::from_env();
    let notify = NotifySettings::from_env();

    tracing::info!("StatMon {} configuration:", env!("CARGO_PKG_VERSION"));
    tracing::info!("  Store: {}", config.store_path.display());
    tracing::info!("  Tick: {:?}", config.tick_interval);
    tracing::info!("  Alert interval: {:?}", config.alert_interval);
    tracing::info!("  Heartbeat interval: {:?}", config.heartbeat_interval);
    tracing::info!("  Streak policy: {}", config.streak_policy);
    match config.dedup_retention {
        Some(retention) => tracing::info!("  Dedup retention: {:?}", retention),
        None => tracing::info!("  Dedup retention: unbounded"),
    }
    tracing::info!(
        "  Sinks: webhook={} email={}",
        notify.teams_webhook.is_some(),
        notify.email.is_some()
    );

    let store = Arc::new(FileStore::new(config.store_path.clone()));

    // An unreadable store at boot is fatal; later failures only skip a pass
    let stations = store.list_stations().await?;
    tracing::info!("Loaded {} stations", stations.len());

    let guard = match config.dedup_retention {
        Some(retention) => DedupGuard::with_retention(retention),
        None => DedupGuard::new(),
    };
    let engine = AlertEngine::new(store, Dispatcher::new(EnvSinkProvider), guard)
        .with_streak_policy(config.streak_policy);
    let stats = engine.stats();

    let mut scheduler = Scheduler::new();
    let status = scheduler.status();
    scheduler.register("alert-evaluate", config.alert_interval, engine);
    scheduler.register(
        "heartbeat",
        config.heartbeat_interval,
        HeartbeatJob::new(status.clone()),
    );
    tracing::info!("Registered jobs: {:?}", scheduler.job_names());

    let server = config.http_addr.clone().map(|addr| {
        let state = Arc::new(AppState {
            status,
            stats,
            stale_after: config.stale_after(),
        });
        tokio::spawn(async move {
            if let Err(e) = run_status_server(&addr, state).await {
                tracing::error!("Status server failed: {}", e);
            }
        })
    });

    scheduler
        .run_until(config.tick_interval, shutdown_signal())
        .await;

    if let Some(handle) = server {
        handle.abort();
    }
    tracing::info!("StatMon stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
