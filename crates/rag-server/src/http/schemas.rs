//! `/schema` routes: discovery kickoff, job polling, and schema reads.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use rag_connections::DiscoveryOptions;
use serde::{Deserialize, Serialize};

use super::error::into_response;
use super::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/schema/discover", post(discover_handler))
        .route("/schema/jobs/:job_id", get(job_status_handler))
        .route("/schema/:connection_id", get(get_schema_handler))
        .route("/schema/:connection_id/analyze", get(analyze_handler))
        .route("/schema/:connection_id/vectorize", get(vectorize_status_handler))
}

#[derive(Debug, Deserialize)]
struct DiscoverRequest {
    connection_id: String,
    #[serde(flatten)]
    options: DiscoveryOptions,
}

async fn discover_handler(State(state): State<AppState>, Json(req): Json<DiscoverRequest>) -> impl IntoResponse {
    match state.orchestrator.start_discovery(&req.connection_id, req.options).await {
        Ok(job) => Json(job).into_response(),
        Err(e) => into_response(&e),
    }
}

async fn job_status_handler(State(state): State<AppState>, Path(job_id): Path<String>) -> impl IntoResponse {
    match state.orchestrator.job_status(&job_id) {
        Ok(job) => Json(job).into_response(),
        Err(e) => into_response(&e),
    }
}

async fn get_schema_handler(State(state): State<AppState>, Path(connection_id): Path<String>) -> impl IntoResponse {
    match state.orchestrator.get_schema(&connection_id).await {
        Ok(schema) => Json(schema).into_response(),
        Err(e) => into_response(&e),
    }
}

async fn analyze_handler(State(state): State<AppState>, Path(connection_id): Path<String>) -> impl IntoResponse {
    match state.orchestrator.get_schema(&connection_id).await {
        Ok(schema) => {
            let suggestions = if schema.query_suggestions.is_empty() {
                rag_orchestrator::suggest_queries(&schema)
            } else {
                schema.query_suggestions.clone()
            };
            Json(serde_json::json!({ "connection_id": connection_id, "suggestions": suggestions })).into_response()
        }
        Err(e) => into_response(&e),
    }
}

#[derive(Debug, Serialize)]
struct VectorizeStatus {
    connection_id: String,
    vector_id: Option<String>,
    vectorization_error: Option<String>,
}

async fn vectorize_status_handler(State(state): State<AppState>, Path(connection_id): Path<String>) -> impl IntoResponse {
    match state.orchestrator.get_schema(&connection_id).await {
        Ok(schema) => Json(VectorizeStatus {
            connection_id: schema.connection_id,
            vector_id: schema.vector_id,
            vectorization_error: schema.vectorization_error,
        })
        .into_response(),
        Err(e) => into_response(&e),
    }
}
