// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`.  Reads are served from the last
// published `ChartSnapshot`; anything that changes the feed or the indicator
// set is forwarded to the session task as a command, so the session remains
// the only writer.
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::indicators::IndicatorSpec;
use crate::market_data::SessionHandle;

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(serde_json::json!({ "error": message.into() })))
}

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/snapshot", get(snapshot))
        .route("/api/v1/series", get(series))
        .route("/api/v1/indicators", get(list_indicators).post(create_indicator))
        .route(
            "/api/v1/indicators/:id",
            put(update_indicator).delete(delete_indicator),
        )
        .route("/api/v1/indicators/:id/visibility", post(set_visibility))
        .route("/api/v1/control/connect", post(control_connect))
        .route("/api/v1/control/disconnect", post(control_disconnect))
        // ── WebSocket (handled separately in ws module but mounted here) ─
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        .layer(cors)
        .with_state(state)
}

fn validated(spec: &IndicatorSpec) -> Result<(), ApiError> {
    spec.validate().map_err(|e| {
        api_error(
            StatusCode::BAD_REQUEST,
            format!("invalid indicator {}: {e:#}", spec.label()),
        )
    })
}

fn running_session(state: &AppState) -> Result<SessionHandle, ApiError> {
    state
        .session()
        .filter(SessionHandle::is_alive)
        .ok_or_else(|| api_error(StatusCode::SERVICE_UNAVAILABLE, "feed session is not running"))
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    server_time: i64,
    connection: String,
    degraded: bool,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let chart = state.chart();
    Json(HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        server_time: chrono::Utc::now().timestamp_millis(),
        connection: chart.connection.status.to_string(),
        degraded: chart.degraded,
    })
}

// =============================================================================
// Snapshot / series
// =============================================================================

async fn snapshot(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_snapshot())
}

async fn series(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let chart = state.chart();
    Json(serde_json::json!({
        "symbol": chart.symbol,
        "interval_secs": chart.interval_secs,
        "history": chart.history,
        "degraded": chart.degraded,
        "candles": chart.candles,
    }))
}

// =============================================================================
// Indicators
// =============================================================================

#[derive(Serialize)]
struct IndicatorIdResponse {
    id: Uuid,
}

async fn list_indicators(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.chart().indicators.clone())
}

async fn create_indicator(
    State(state): State<Arc<AppState>>,
    Json(spec): Json<IndicatorSpec>,
) -> Result<impl IntoResponse, ApiError> {
    validated(&spec)?;
    let session = running_session(&state)?;

    let label = spec.label();
    let id = session
        .activate(spec)
        .await
        .map_err(|e| api_error(StatusCode::SERVICE_UNAVAILABLE, format!("{e:#}")))?;
    info!(id = %id, label = %label, "indicator activated via API");

    Ok(Json(IndicatorIdResponse { id }))
}

async fn update_indicator(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(spec): Json<IndicatorSpec>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.chart().indicators.iter().any(|s| s.id == id) {
        return Err(api_error(StatusCode::NOT_FOUND, format!("indicator {id} is not active")));
    }
    validated(&spec)?;
    let session = running_session(&state)?;

    let id = session
        .update(id, spec)
        .await
        .map_err(|e| api_error(StatusCode::NOT_FOUND, format!("{e:#}")))?;

    Ok(Json(IndicatorIdResponse { id }))
}

#[derive(Deserialize)]
struct VisibilityRequest {
    visible: bool,
}

async fn set_visibility(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<VisibilityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = running_session(&state)?;
    let found = session
        .set_visible(id, req.visible)
        .await
        .map_err(|e| api_error(StatusCode::SERVICE_UNAVAILABLE, format!("{e:#}")))?;
    if !found {
        return Err(api_error(StatusCode::NOT_FOUND, format!("indicator {id} is not active")));
    }
    Ok(Json(serde_json::json!({ "id": id, "visible": req.visible })))
}

async fn delete_indicator(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let session = running_session(&state)?;
    let removed = session
        .deactivate(id)
        .await
        .map_err(|e| api_error(StatusCode::SERVICE_UNAVAILABLE, format!("{e:#}")))?;
    if !removed {
        return Err(api_error(StatusCode::NOT_FOUND, format!("indicator {id} is not active")));
    }
    info!(id = %id, "indicator removed via API");
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Control endpoints
// =============================================================================

#[derive(Serialize)]
struct ControlResponse {
    symbol: String,
    message: &'static str,
}

async fn control_connect(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let session = running_session(&state)?;
    session
        .connect()
        .map_err(|e| api_error(StatusCode::SERVICE_UNAVAILABLE, format!("{e:#}")))?;
    info!(symbol = %session.symbol(), "feed connect requested via API");

    Ok(Json(ControlResponse {
        symbol: session.symbol().to_string(),
        message: "connect requested",
    }))
}

async fn control_disconnect(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let session = running_session(&state)?;
    session
        .disconnect()
        .map_err(|e| api_error(StatusCode::SERVICE_UNAVAILABLE, format!("{e:#}")))?;
    warn!(symbol = %session.symbol(), "feed disconnected via API");

    Ok(Json(ControlResponse {
        symbol: session.symbol().to_string(),
        message: "disconnected",
    }))
}
