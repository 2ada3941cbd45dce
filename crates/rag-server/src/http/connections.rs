//! `/connections` routes: CRUD plus the `test` verb.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use ragcore::NewConnection;

use super::error::into_response;
use super::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/connections", get(list_handler).post(create_handler))
        .route(
            "/connections/:id",
            get(get_handler).put(update_handler).delete(delete_handler),
        )
        .route("/connections/:id/test", post(test_handler))
}

async fn list_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.connections.list().await {
        Ok(connections) => Json(connections).into_response(),
        Err(e) => into_response(&e),
    }
}

async fn create_handler(State(state): State<AppState>, Json(new): Json<NewConnection>) -> impl IntoResponse {
    match state.connections.create(new).await {
        Ok(connection) => (StatusCode::CREATED, Json(connection)).into_response(),
        Err(e) => into_response(&e),
    }
}

async fn get_handler(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.connections.get(&id).await {
        Ok(connection) => Json(connection).into_response(),
        Err(e) => into_response(&e),
    }
}

async fn update_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(new): Json<NewConnection>,
) -> impl IntoResponse {
    match state.connections.update(&id, new).await {
        Ok(connection) => Json(connection).into_response(),
        Err(e) => into_response(&e),
    }
}

async fn delete_handler(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.connections.delete(&id).await {
        Ok(()) => axum::http::StatusCode::NO_CONTENT.into_response(),
        Err(e) => into_response(&e),
    }
}

async fn test_handler(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.connections.test(&id).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => into_response(&e),
    }
}
