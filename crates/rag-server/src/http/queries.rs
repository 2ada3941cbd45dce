//! `/query*` routes. Every variant funnels through
//! [`rag_planner::GraphRagPlanner`], varying which scope parameter
//! (connection, area, user) gets populated.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use ragcore::{Error, QueryRecord, Source};
use serde::{Deserialize, Serialize};

use super::error::into_response;
use super::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/query", post(query_handler))
        .route("/query/area/:area_id", post(query_area_handler))
        .route("/query/personal", post(query_personal_handler))
        .route("/query/graph", post(query_graph_handler))
        .route("/query/graph/advanced", post(query_graph_advanced_handler))
        .route("/query/history", get(history_handler))
}

#[derive(Debug, Deserialize)]
struct QueryBody {
    query: String,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    provider_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphQueryBody {
    query: String,
    connection_id: String,
    #[serde(default)]
    provider_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdvancedGraphQueryBody {
    query: String,
    connection_id: String,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    area_id: Option<String>,
    #[serde(default)]
    provider_id: Option<String>,
    /// Floor on exploration depth (1-3); overrides the model's own suggestion
    /// when the caller knows the question needs deeper traversal.
    #[serde(default)]
    min_exploration_depth: Option<u32>,
}

#[derive(Debug, Serialize)]
struct QueryResponse {
    answer: String,
    sources: Vec<Source>,
    processing_info: std::collections::HashMap<String, String>,
}

async fn query_handler(State(state): State<AppState>, Json(body): Json<QueryBody>) -> impl IntoResponse {
    let result = state
        .planner
        .process_query(body.query, None, body.user_id, None, body.provider_id)
        .await;
    respond(result)
}

async fn query_area_handler(
    State(state): State<AppState>,
    Path(area_id): Path<String>,
    Json(body): Json<QueryBody>,
) -> impl IntoResponse {
    let result = state
        .planner
        .process_query(body.query, None, body.user_id, Some(area_id), body.provider_id)
        .await;
    respond(result)
}

async fn query_personal_handler(State(state): State<AppState>, Json(body): Json<QueryBody>) -> impl IntoResponse {
    let user_id = match body.user_id {
        Some(u) => u,
        None => return into_response(&Error::Validation("user_id is required for a personal query".into())),
    };
    let result = state
        .planner
        .process_query(body.query, None, Some(user_id), None, body.provider_id)
        .await;
    respond(result)
}

async fn query_graph_handler(State(state): State<AppState>, Json(body): Json<GraphQueryBody>) -> impl IntoResponse {
    let result = state
        .planner
        .process_query(body.query, Some(body.connection_id), None, None, body.provider_id)
        .await;
    respond(result)
}

async fn query_graph_advanced_handler(
    State(state): State<AppState>,
    Json(body): Json<AdvancedGraphQueryBody>,
) -> impl IntoResponse {
    let result = state
        .planner
        .process_query_with_depth(
            body.query,
            Some(body.connection_id),
            body.user_id,
            body.area_id,
            body.provider_id,
            body.min_exploration_depth,
        )
        .await;
    respond(result)
}

fn respond(state: rag_planner::GraphRAGState) -> axum::response::Response {
    Json(QueryResponse {
        answer: state.response,
        sources: state.sources,
        processing_info: state.processing_info,
    })
    .into_response()
}

async fn history_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.history_store.list("query_history").await {
        Ok(docs) => {
            let mut records: Vec<QueryRecord> = docs
                .into_iter()
                .filter_map(|d| serde_json::from_value(d).ok())
                .collect();
            records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            Json(records).into_response()
        }
        Err(e) => into_response(&e),
    }
}
