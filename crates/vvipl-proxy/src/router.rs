//! Proxy router and HTTP layers.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::handlers::{forward, health};
use crate::state::ProxyState;

/// Builds the proxy router.
///
/// - `GET /health`
/// - `POST /{endpoint}`
///
/// CORS is fully permissive; the proxy is meant for local development only.
pub fn router(state: ProxyState) -> Router {
    let trace = TraceLayer::new_for_http()
        .make_span_with(|req: &axum::http::Request<_>| {
            tracing::info_span!(
                "http_request",
                method = %req.method(),
                uri = %req.uri(),
            )
        })
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(tower_http::LatencyUnit::Millis),
        );

    Router::new()
        .route("/health", get(health))
        .route("/{endpoint}", post(forward))
        .layer(trace)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
