use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
        .route("/database", get(database_health))
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSecs": state.uptime_secs(),
        "generationQueueFree": state.generation().available(),
    }))
}

pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Ready once both stores answer.
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let store_ok = state.store().count_topics().is_ok();
    let documents_ok = state.documents().ping().await.is_ok();
    let status = if store_ok && documents_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(serde_json::json!({
            "store": store_ok,
            "documents": documents_ok,
        })),
    )
}

pub async fn database_health(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();
    let store_healthy = state.store().get_user_by_id("__health_check__").is_ok();
    let store_latency_us = start.elapsed().as_micros() as u64;

    let start = Instant::now();
    let documents_healthy = state.documents().ping().await.is_ok();
    let documents_latency_us = start.elapsed().as_micros() as u64;

    Json(serde_json::json!({
        "healthy": store_healthy && documents_healthy,
        "store": { "healthy": store_healthy, "latencyUs": store_latency_us },
        "documents": { "healthy": documents_healthy, "latencyUs": documents_latency_us },
    }))
}
