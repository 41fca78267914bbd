use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::alerts::{EngineStats, EngineStatsSnapshot};
use crate::scheduler::{SchedulerStatus, StatusHandle};

/// Application state shared across handlers
pub struct AppState {
    pub status: StatusHandle,
    pub stats: Arc<EngineStats>,
    /// Heartbeat age after which the daemon reports itself stale
    pub stale_after: Duration,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub ticks: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
}

pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let snapshot = state.status.snapshot();
    let (code, status) = match state.status.since_last_tick(Utc::now()) {
        None => (StatusCode::SERVICE_UNAVAILABLE, "starting"),
        Some(age) if age > state.stale_after => (StatusCode::SERVICE_UNAVAILABLE, "stale"),
        Some(_) => (StatusCode::OK, "healthy"),
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            ticks: snapshot.ticks,
            last_tick_at: snapshot.last_tick_at,
        }),
    )
}

// ============================================================================
// Scheduler
// ============================================================================

pub async fn jobs(State(state): State<Arc<AppState>>) -> Json<SchedulerStatus> {
    Json(state.status.snapshot())
}

// ============================================================================
// Alert stats
// ============================================================================

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<EngineStatsSnapshot> {
    Json(state.stats.snapshot())
}
