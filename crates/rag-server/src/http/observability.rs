//! `/health` and `/metrics`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use super::state::AppState;
use crate::metrics;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
}

/// Liveness probe that also confirms the document store is reachable, since
/// every route depends on it.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.history_store.list("query_history").await {
        Ok(_) => (StatusCode::OK, "OK").into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed: document store unreachable");
            (StatusCode::SERVICE_UNAVAILABLE, "document store unreachable").into_response()
        }
    }
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::gather() {
        Ok(text) => (StatusCode::OK, text).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("failed to gather metrics: {e}")).into_response(),
    }
}
