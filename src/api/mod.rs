//! Admin/status HTTP surface (ambient; spec.md §2 names no HTTP surface, but every
//! other repo in this corpus exposes a health check and a read endpoint over its
//! pipeline state, so this one does too). Not the out-of-scope messaging bot UI —
//! read-only operator visibility into what the pipeline has emitted.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::store::SignalStore;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<SignalStore>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/signals/recent", get(recent_signals))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct RecentQuery {
    limit: Option<u32>,
}

async fn recent_signals(State(state): State<ApiState>, Query(query): Query<RecentQuery>) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(50).min(500);
    match state.store.recent_signals(limit) {
        Ok(signals) => Json(serde_json::json!({ "signals": signals })).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to read recent signals");
            (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "store error").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_reports_ok() {
        let store = Arc::new(SignalStore::open_in_memory().unwrap());
        let app = router(ApiState { store });
        let response = health().await.into_response();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let _ = app;
    }
}
