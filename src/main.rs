// =============================================================================
// candlecast — real-time OHLCV fan-out over WebSocket
// =============================================================================

mod api;
mod candle;
mod config;
mod dex;
mod error;
mod exchanges;
mod factory;
mod interval;
mod realip;
mod registry;
mod session;
mod stream;
mod tag;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::dex::NetworksCatalog;
use crate::registry::CandleManager;
use crate::session::SessionRegistry;

/// Shared state reachable from every request handler and background loop.
pub struct AppState {
    pub registry: CandleManager,
    pub sessions: SessionRegistry,
    pub heartbeat_timeout_secs: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("candlecast starting up");

    let config = Config::load()?;
    let networks = Arc::new(NetworksCatalog::load(&config.networks_path)?);
    info!(count = networks.len(), path = %config.networks_path, "loaded DEX network catalog");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()?;

    let state = Arc::new(AppState {
        registry: CandleManager::new(client, networks),
        sessions: SessionRegistry::new(),
        heartbeat_timeout_secs: config.heartbeat_timeout_secs,
    });

    spawn_heartbeat_loop(state.clone(), config.heartbeat_check_interval_secs);
    spawn_broadcast_loop(state.clone());

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("candlecast shut down");
    Ok(())
}

/// Every 30s (configurable), evict any session whose last activity is more
/// than the heartbeat timeout old. Subscribed or not — this sweeps the
/// process-wide session directory, not the per-tag listener sets, so an
/// idle connection with zero subscriptions is still caught.
fn spawn_heartbeat_loop(state: Arc<AppState>, check_interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(check_interval_secs));
        loop {
            interval.tick().await;
            state.sessions.evict_stale(state.heartbeat_timeout_secs);
        }
    });
}

/// Ticks immediately, then sleeps until the next wall-clock minute boundary
/// computed from the time the tick returned. If a tick takes so long it
/// crosses into the next minute, the sleep is skipped entirely and the next
/// tick starts right away instead of drifting further behind.
fn spawn_broadcast_loop(state: Arc<AppState>) {
    tokio::spawn(async move {
        loop {
            let started = std::time::Instant::now();
            state.registry.broadcast_tick().await;

            if started.elapsed() < Duration::from_secs(60) {
                let now = session::now_secs();
                let until_next_minute = 60 - (now % 60);
                tokio::time::sleep(Duration::from_secs(until_next_minute as u64)).await;
            } else {
                warn!("broadcast tick took over a minute; running the next tick immediately");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install ctrl_c handler");
    }
    warn!("shutdown signal received");
}
