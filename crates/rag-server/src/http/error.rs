//! Shared error-to-response mapping for every route handler.

use axum::response::IntoResponse;
use axum::Json;
use ragcore::{Error, ErrorBody};

pub fn into_response(err: &Error) -> axum::response::Response {
    let body = ErrorBody::from(err);
    let status = axum::http::StatusCode::from_u16(err.status_code())
        .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body)).into_response()
}
