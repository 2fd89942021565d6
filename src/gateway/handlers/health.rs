//! Health check handlers

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use super::super::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
    /// Server timestamp in milliseconds
    pub timestamp_ms: u64,
    pub version: &'static str,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// GET /health: process-level status, no dependency checks.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.uptime_secs(),
        timestamp_ms: now_ms(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /health/live. Always 200 while the process serves.
pub async fn live() -> StatusCode {
    StatusCode::OK
}

/// GET /health/ready. 200 when the database and queue answer. The ping is rate
/// limited so a poll-happy orchestrator cannot turn health checks into
/// database load.
pub async fn ready(State(state): State<Arc<AppState>>) -> StatusCode {
    static LAST_CHECK_MS: AtomicU64 = AtomicU64::new(0);
    static LAST_HEALTHY: AtomicU64 = AtomicU64::new(1);
    const CHECK_INTERVAL_MS: u64 = 5000;

    let now = now_ms();
    let last_check = LAST_CHECK_MS.load(Ordering::Relaxed);

    let healthy = if now.saturating_sub(last_check) > CHECK_INTERVAL_MS {
        LAST_CHECK_MS.store(now, Ordering::Relaxed);
        let db_ok = match sqlx::query("SELECT 1").execute(&state.pool).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(error = %e, "readiness ping failed");
                false
            }
        };
        let queue_ok = match state.queue.get_stats().await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(error = %e, "queue unavailable");
                false
            }
        };
        let ok = db_ok && queue_ok;
        LAST_HEALTHY.store(ok as u64, Ordering::Relaxed);
        ok
    } else {
        LAST_HEALTHY.load(Ordering::Relaxed) == 1
    };

    if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
