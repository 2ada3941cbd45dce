//! HTTP transport for the MCP runtime.
//!
//! JSON request/response for each tool, plus an event-stream endpoint for
//! streaming tool invocations, following the same axum `Router` +
//! metrics-endpoint composition style used across the platform's services.

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, Stream};
use ragcore::{Context, ContextFilter, Error, ErrorBody};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use crate::registry::ContextRegistry;
use crate::tools::{FindRelevantRequest, StoreDocumentRequest, ToolRuntime};

#[derive(Clone)]
pub struct McpHttpState {
    pub registry: Arc<ContextRegistry>,
    pub tools: Arc<ToolRuntime>,
}

pub fn router(state: McpHttpState) -> Router {
    Router::new()
        .route("/mcp/status", get(status_handler))
        .route("/mcp/active-contexts", get(active_contexts_handler))
        .route("/mcp/stream", get(stream_handler))
        .route("/contexts/:id/activate", post(activate_handler))
        .route("/contexts/:id/deactivate", post(deactivate_handler))
        .route("/mcp/tools/store-document", post(store_document_handler))
        .route("/mcp/tools/find-relevant", post(find_relevant_handler))
        .with_state(state)
}

fn into_response(err: &Error) -> axum::response::Response {
    let body = ErrorBody::from(err);
    let status = axum::http::StatusCode::from_u16(err.status_code())
        .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body)).into_response()
}

async fn status_handler(State(state): State<McpHttpState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "active_contexts": state.registry.list_active(None).len(),
        "total_contexts": state.registry.list_all().len(),
    }))
}

#[derive(Debug, Deserialize)]
struct ActiveContextsQuery {
    metadata_type: Option<String>,
}

async fn active_contexts_handler(
    State(state): State<McpHttpState>,
    Query(q): Query<ActiveContextsQuery>,
) -> impl IntoResponse {
    let filter = q.metadata_type.map(|metadata_type| ContextFilter {
        metadata_type: Some(metadata_type),
    });
    Json(state.registry.list_active(filter.as_ref()))
}

async fn activate_handler(
    State(state): State<McpHttpState>,
    Path(id): Path<String>,
) -> Result<Json<Context>, axum::response::Response> {
    state
        .registry
        .activate(&id)
        .map(Json)
        .map_err(|e| into_response(&e))
}

async fn deactivate_handler(
    State(state): State<McpHttpState>,
    Path(id): Path<String>,
) -> Result<Json<Context>, axum::response::Response> {
    state
        .registry
        .deactivate(&id)
        .map(Json)
        .map_err(|e| into_response(&e))
}

#[derive(Debug, Deserialize)]
struct StoreDocumentQuery {
    active_context_id: Option<String>,
}

async fn store_document_handler(
    State(state): State<McpHttpState>,
    Query(q): Query<StoreDocumentQuery>,
    Json(req): Json<StoreDocumentRequest>,
) -> impl IntoResponse {
    match state
        .tools
        .store_document(req, q.active_context_id.as_deref())
        .await
    {
        Ok(ack) => Json(ack).into_response(),
        Err(e) => into_response(&e),
    }
}

async fn find_relevant_handler(
    State(state): State<McpHttpState>,
    Json(req): Json<FindRelevantRequest>,
) -> impl IntoResponse {
    match state.tools.find_relevant(req).await {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => into_response(&e),
    }
}

/// A minimal heartbeat stream for clients that poll active-context changes
/// out of band of a request/response cycle. Real tool invocations remain
/// request/response; this stream only emits periodic snapshots.
async fn stream_handler(
    State(state): State<McpHttpState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let registry = state.registry;
    let stream = stream::unfold(registry, |registry| async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        let snapshot = registry.list_active(None);
        let event = Event::default().json_data(snapshot).unwrap_or_else(|_| Event::default());
        Some((Ok(event), registry))
    });
    Sse::new(stream)
}
