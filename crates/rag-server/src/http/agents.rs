//! `/agents` routes: CRUD, prompt management, connection assignment.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use ragcore::AgentPrompts;
use serde::Deserialize;

use super::error::into_response;
use super::state::AppState;
use crate::agents::NewAgent;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/agents", get(list_handler).post(create_handler))
        .route(
            "/agents/:id",
            get(get_handler).put(update_handler).delete(delete_handler),
        )
        .route("/agents/:id/prompts", get(get_prompts_handler).put(update_prompts_handler))
        .route(
            "/agents/:id/connections",
            get(list_connections_handler).post(assign_connection_handler),
        )
        .route("/agents/:id/connections/:connection_id", axum::routing::delete(unassign_connection_handler))
}

async fn list_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.agents.list().await {
        Ok(agents) => Json(agents).into_response(),
        Err(e) => into_response(&e),
    }
}

async fn create_handler(State(state): State<AppState>, Json(new): Json<NewAgent>) -> impl IntoResponse {
    match state.agents.create(new).await {
        Ok(agent) => Json(agent).into_response(),
        Err(e) => into_response(&e),
    }
}

async fn get_handler(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.agents.get(&id).await {
        Ok(agent) => Json(agent).into_response(),
        Err(e) => into_response(&e),
    }
}

async fn update_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(new): Json<NewAgent>,
) -> impl IntoResponse {
    match state.agents.update(&id, new).await {
        Ok(agent) => Json(agent).into_response(),
        Err(e) => into_response(&e),
    }
}

async fn delete_handler(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.agents.delete(&id).await {
        Ok(()) => axum::http::StatusCode::NO_CONTENT.into_response(),
        Err(e) => into_response(&e),
    }
}

async fn get_prompts_handler(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.agents.get_prompts(&id).await {
        Ok(prompts) => Json(prompts).into_response(),
        Err(e) => into_response(&e),
    }
}

async fn update_prompts_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(prompts): Json<AgentPrompts>,
) -> impl IntoResponse {
    match state.agents.update_prompts(&id, prompts).await {
        Ok(prompts) => Json(prompts).into_response(),
        Err(e) => into_response(&e),
    }
}

async fn list_connections_handler(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.agents.get(&id).await {
        Ok(agent) => Json(agent.connection_ids).into_response(),
        Err(e) => into_response(&e),
    }
}

#[derive(Debug, Deserialize)]
struct AssignConnectionBody {
    connection_id: String,
}

async fn assign_connection_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AssignConnectionBody>,
) -> impl IntoResponse {
    match state.agents.assign_connection(&id, body.connection_id).await {
        Ok(agent) => Json(agent).into_response(),
        Err(e) => into_response(&e),
    }
}

async fn unassign_connection_handler(
    State(state): State<AppState>,
    Path((id, connection_id)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.agents.unassign_connection(&id, &connection_id).await {
        Ok(agent) => Json(agent).into_response(),
        Err(e) => into_response(&e),
    }
}
