//! 只读观测接口
//!
//! - `GET /health`：存活检查
//! - `GET /api/snapshot`：引擎状态快照
//! - `GET /api/metrics`：进程级计数器
//!
//! 每个请求注入 request_id / trace_id，并回写到响应头。

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderValue, Request},
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use edge_engine::RuleEngine;
use edge_telemetry::new_request_ids;
use std::sync::Arc;
use tracing::Instrument;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RuleEngine>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/snapshot", get(snapshot))
        .route("/api/metrics", get(metrics))
        .with_state(state)
        .layer(middleware::from_fn(request_context))
}

async fn request_context(mut req: Request<Body>, next: Next) -> Response {
    let ids = new_request_ids();
    let span = tracing::info_span!(
        "request",
        request_id = %ids.request_id,
        trace_id = %ids.trace_id,
        method = %req.method(),
        path = %req.uri().path()
    );
    req.extensions_mut().insert(ids.clone());

    let mut response = next.run(req).instrument(span).await;
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&ids.request_id) {
        headers.insert("x-request-id", value);
    }
    if let Ok(value) = HeaderValue::from_str(&ids.trace_id) {
        headers.insert("x-trace-id", value);
    }
    response
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

async fn snapshot(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.engine.snapshot_dump())
}

async fn metrics() -> Json<serde_json::Value> {
    Json(serde_json::to_value(edge_telemetry::metrics().snapshot()).unwrap_or_default())
}
