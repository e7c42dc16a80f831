//! Proxy request handlers.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value, json};
use vvipl_api::upstream::IplError;

use crate::state::ProxyState;

/// Content type for relayed replies that carry none.
const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Health check endpoint.
pub async fn health() -> &'static str {
    "OK"
}

/// `POST /{endpoint}` - relays the JSON body to the upstream endpoint.
///
/// The upstream status, body, and `Content-Type` are returned verbatim
/// (`application/json` when upstream sends none). Transport failures map
/// to `502`, timeouts to `504`.
pub async fn forward(
    State(state): State<ProxyState>,
    Path(endpoint): Path<String>,
    body: Bytes,
) -> Response {
    if !is_endpoint_name(&endpoint) {
        return error_response(StatusCode::NOT_FOUND, format!("unknown endpoint: {endpoint}"));
    }

    let payload = match parse_payload(&body) {
        Ok(payload) => payload,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };

    tracing::info!(%endpoint, fields = payload.len(), "Forwarding request upstream");

    match state.client.forward(&endpoint, &payload).await {
        Ok(upstream) => {
            let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
            tracing::info!(%endpoint, status = upstream.status, "Upstream replied");
            let content_type = upstream
                .content_type
                .unwrap_or_else(|| String::from(DEFAULT_CONTENT_TYPE));
            (status, [(header::CONTENT_TYPE, content_type)], upstream.body).into_response()
        }
        Err(e) => {
            let status = match e {
                IplError::Transport {
                    timed_out: true, ..
                } => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::BAD_GATEWAY,
            };
            tracing::warn!(%endpoint, error = %e, "Upstream call failed");
            error_response(status, e.to_string())
        }
    }
}

/// Endpoint names are a single path segment of ASCII letters, digits, `-` or `_`.
fn is_endpoint_name(endpoint: &str) -> bool {
    !endpoint.is_empty()
        && endpoint
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Parses the request body as a JSON object. An empty body is `{}`.
fn parse_payload(body: &[u8]) -> Result<Map<String, Value>, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(String::from("request body must be a JSON object")),
        Err(e) => Err(format!("invalid JSON body: {e}")),
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
