//! Axum router assembly: every route group merged under one app, CORS
//! configured from [`crate::config::Config::cors_allowed_origins`].

pub mod agents;
pub mod connections;
mod error;
pub mod observability;
pub mod queries;
pub mod schemas;
pub mod state;

use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::http::Method;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use rag_mcp::McpHttpState;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

pub use state::AppState;

use crate::metrics;

pub fn router(state: AppState) -> Router {
    let mcp_state = McpHttpState {
        registry: state.contexts.clone(),
        tools: state.tools.clone(),
    };
    let cors = build_cors(&state.config.cors_allowed_origins);
    let max_body_bytes = (state.config.max_document_size_mb as usize).saturating_mul(1024 * 1024);

    Router::new()
        .merge(connections::router())
        .merge(agents::router())
        .merge(schemas::router())
        .merge(queries::router())
        .merge(observability::router())
        .with_state(state)
        .merge(rag_mcp::router(mcp_state))
        .route_layer(middleware::from_fn(record_metrics))
        .layer(cors)
        // Applied last so it runs first, rejecting oversized requests with 413
        // before any handler or CORS/auth work touches them.
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
}

/// Records a request/duration sample for every response, labeled by the
/// route's path template (not the raw URI, which would blow up the
/// `route` cardinality with path parameters like connection ids).
async fn record_metrics(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let start = Instant::now();
    let response = next.run(req).await;
    metrics::observe_duration(start.elapsed().as_secs_f64());
    metrics::record_request(&route, response.status().as_u16());
    response
}

/// The HTTP verbs actually exposed by [`router`]'s merged route groups.
const ALLOWED_METHODS: [Method; 4] = [Method::GET, Method::POST, Method::PUT, Method::DELETE];

/// Builds the CORS layer from the operator's configured allow-list.
///
/// An empty list means CORS was never configured for this deployment: no
/// layer is attached, so browsers fall back to same-origin defaults. A
/// non-empty list is parsed origin by origin so one malformed entry in the
/// config file doesn't silently drop the rest; entries that fail to parse
/// are logged and excluded. Since the allow-list is always an explicit set
/// of origins (never the wildcard `Any`), credentialed requests are safe to
/// permit.
fn build_cors(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        tracing::info!("no CORS origins configured, CORS headers will not be added");
        return CorsLayer::new();
    }

    let mut origins = Vec::with_capacity(allowed_origins.len());
    for raw in allowed_origins {
        match raw.parse() {
            Ok(origin) => origins.push(origin),
            Err(_) => tracing::warn!(origin = %raw, "ignoring unparsable CORS origin"),
        }
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(ALLOWED_METHODS)
        .allow_headers([ACCEPT, AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true)
}
