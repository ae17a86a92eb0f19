// =============================================================================
// Chart Feed — Main Entry Point
// =============================================================================
//
// Loads history for the configured symbol (or a synthetic stand-in when the
// upstream endpoint is unusable), starts the live feed session and serves
// the chart over HTTP + WebSocket until Ctrl+C.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod indicators;
mod market_data;
mod runtime_config;
mod types;

use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::market_data::{
    time_normalizer, HistoricalLoader, HistoryClient, LiveFeedSession, LoaderSettings,
    SessionSettings, WsTransport,
};
use crate::runtime_config::ChartConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Chart feed starting up");

    let mut config = ChartConfig::load("chart_config.json").unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        ChartConfig::default()
    });
    config.apply_env();

    info!(
        symbol = %config.symbol,
        interval_minutes = config.interval_minutes,
        lookback_days = config.lookback_days,
        indicators = config.indicators.len(),
        "Chart configuration resolved"
    );

    // ── 2. Build shared state ────────────────────────────────────────────
    let state = Arc::new(AppState::new(&config));

    // ── 3. Historical seed ───────────────────────────────────────────────
    let client = HistoryClient::new(
        config.history_base_url.clone(),
        config.feed_token.clone(),
        config.history_timeout(),
    )?;
    let loader = HistoricalLoader::new(
        client,
        LoaderSettings {
            timeout: config.history_timeout(),
            min_points: config.min_history_points,
            synthetic_points: config.synthetic_points,
            synthetic_baseline: config.synthetic_baseline_price,
            synthetic_seed: config.synthetic_seed,
            utc_offset: time_normalizer::offset_from_minutes(config.feed_utc_offset_minutes),
        },
    );
    let history = loader
        .load(&config.symbol, config.interval_minutes, config.lookback_days)
        .await;
    if history.origin.is_degraded() {
        state.push_error(format!("history unavailable: {}", history.origin));
    }

    // ── 4. Live feed session ─────────────────────────────────────────────
    let transport = Arc::new(WsTransport::new(
        config.feed_url.clone(),
        config.feed_token.clone(),
    ));
    let session = LiveFeedSession::spawn(
        SessionSettings::from_config(&config),
        history,
        transport,
        state.clone(),
    );
    let handle = session.handle();
    state.set_session(handle.clone());

    for spec in &config.indicators {
        if let Err(e) = handle.activate(spec.clone()).await {
            warn!(indicator = %spec.label(), error = %format!("{e:#}"), "Skipping configured indicator");
        }
    }
    handle.connect()?;

    // ── 5. Start the API server ──────────────────────────────────────────
    let bind_addr =
        std::env::var("CHART_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".into());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "API server listening");

    let app = api::rest::router(state.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    session.shutdown().await;

    info!("Chart feed shut down complete.");
    Ok(())
}
