//! Health check handlers for the scheduler launcher: liveness (`/health`),
//! readiness (`/ready`, probes the Data Store Gateway), and Prometheus
//! metrics (`/metrics`). No DLQ admin handlers — this system has no
//! dead-letter queue.

use crate::lifecycle::EngineLifecycle;
use crate::metrics;
use crate::store::DataStoreGateway;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Clone)]
pub struct HealthState {
    pub store: Arc<dyn DataStoreGateway>,
    pub lifecycle: Arc<EngineLifecycle>,
    pub app_name: String,
    pub app_version: String,
}

impl HealthState {
    pub fn new(
        store: Arc<dyn DataStoreGateway>,
        lifecycle: Arc<EngineLifecycle>,
        app_name: impl Into<String>,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            store,
            lifecycle,
            app_name: app_name.into(),
            app_version: app_version.into(),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    app: String,
    version: String,
}

pub async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        app: state.app_name.clone(),
        version: state.app_version.clone(),
    })
}

pub async fn ready_handler(State(state): State<HealthState>) -> impl IntoResponse {
    if state.store.is_available().await {
        let engine_state = state.lifecycle.get_state().await;
        (
            StatusCode::OK,
            Json(json!({ "status": "ready", "engine": engine_state.status })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not_ready", "reason": "data store unavailable" })),
        )
    }
}

pub async fn engine_state_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let engine_state = state.lifecycle.get_state().await;
    Json(engine_state)
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::get_metrics_handle() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [("content-type", "text/plain")],
            "metrics not initialized".to_string(),
        ),
    }
}

pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/engine/state", get(engine_state_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
