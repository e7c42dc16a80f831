//! `UpstreamClient` - Vehicle & Vessel IPL API client implementation.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::instrument;
use url::Url;

use super::api::LocalUpstreamApi;
use super::credentials::Credentials;
use super::error::{CallTarget, IplError};

/// Fixed per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Payload field carrying the diagram ID on per-diagram calls.
const DIAGRAM_ID_FIELD: &str = "diagramId";

/// Raw reply from the upstream service, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body text.
    pub body: String,
    /// `Content-Type` header, when present and valid text.
    pub content_type: Option<String>,
}

impl UpstreamResponse {
    /// Returns `true` for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// IPL API client.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct UpstreamClient {
    /// HTTP client.
    http_client: Client,
    /// Base URL; endpoint names are appended as a path segment.
    base_url: Url,
    /// Credentials merged into every request body.
    credentials: Credentials,
}

/// Builder for `UpstreamClient`.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct UpstreamClientBuilder {
    base_url: Option<Url>,
    credentials: Option<Credentials>,
    user_agent: Option<String>,
    timeout: Option<Duration>,
}

impl UpstreamClientBuilder {
    /// Creates a new builder.
    const fn new() -> Self {
        Self {
            base_url: None,
            credentials: None,
            user_agent: None,
            timeout: None,
        }
    }

    /// Sets the API base URL (required).
    #[must_use]
    pub fn base_url(mut self, url: Url) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Sets the API credentials (required).
    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the User-Agent (required).
    #[must_use]
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Sets the per-request timeout (default: 30s).
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// - `base_url` is not set.
    /// - `credentials` is not set.
    /// - `user_agent` is not set.
    /// - `reqwest::Client` build fails.
    pub fn build(self) -> Result<UpstreamClient> {
        let base_url = self.base_url.context("base_url is required")?;
        let credentials = self.credentials.context("credentials are required")?;
        let user_agent = self.user_agent.context("user_agent is required")?;

        let http_client = Client::builder()
            .user_agent(&user_agent)
            .gzip(true)
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .context("failed to build HTTP client")?;

        Ok(UpstreamClient {
            http_client,
            base_url,
            credentials,
        })
    }
}

impl UpstreamClient {
    /// Creates a new builder.
    #[must_use]
    pub const fn builder() -> UpstreamClientBuilder {
        UpstreamClientBuilder::new()
    }

    /// Returns `{base_url}/{endpoint}`.
    #[must_use]
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    /// Builds the request body: credentials first, then `payload` on top.
    #[must_use]
    pub fn request_body(&self, payload: &Map<String, Value>) -> Map<String, Value> {
        let mut body = Map::new();
        body.insert(
            String::from("username"),
            Value::String(self.credentials.username.clone()),
        );
        body.insert(
            String::from("password"),
            Value::String(self.credentials.password.clone()),
        );
        body.extend(payload.iter().map(|(k, v)| (k.clone(), v.clone())));
        body
    }

    /// Sends one POST request and returns the reply regardless of status.
    ///
    /// # Errors
    ///
    /// Returns `IplError::Transport` if the request cannot be sent, times
    /// out, or the response body cannot be read.
    #[instrument(skip_all, fields(endpoint = %endpoint))]
    pub async fn forward(
        &self,
        endpoint: &str,
        payload: &Map<String, Value>,
    ) -> Result<UpstreamResponse, IplError> {
        let target = call_target(endpoint, payload);
        let url = self.endpoint_url(endpoint);
        let body = self.request_body(payload);

        tracing::debug!(%url, call = %target, "IPL API request");

        let send_result = self.http_client.post(&url).json(&body).send().await;
        let response = send_result.map_err(|e| transport_error(&target, &e))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(&target, &e))?;

        tracing::debug!(call = %target, status, body_len = text.len(), "IPL API response");

        Ok(UpstreamResponse {
            status,
            body: text,
            content_type,
        })
    }
}

impl LocalUpstreamApi for UpstreamClient {
    #[instrument(skip_all, fields(endpoint = %endpoint))]
    async fn call(&self, endpoint: &str, payload: &Map<String, Value>) -> Result<Value, IplError> {
        let target = call_target(endpoint, payload);
        let response = self.forward(endpoint, payload).await.inspect_err(|e| {
            tracing::warn!(call = %target, error = %e, "IPL API call failed");
        })?;

        if !response.is_success() {
            tracing::warn!(
                call = %target,
                status = response.status,
                "IPL API returned non-success status"
            );
            let body = (!response.body.is_empty()).then_some(response.body);
            return Err(IplError::Upstream {
                target,
                status: response.status,
                body,
            });
        }

        let parsed = serde_json::from_str(&response.body).map_err(|e| IplError::Decode {
            target: target.clone(),
            message: e.to_string(),
        })?;

        tracing::info!(call = %target, status = response.status, "IPL API call succeeded");
        Ok(parsed)
    }
}

/// Derives the call target from the endpoint and an optional `diagramId`.
fn call_target(endpoint: &str, payload: &Map<String, Value>) -> CallTarget {
    let target = CallTarget::new(endpoint);
    match payload.get(DIAGRAM_ID_FIELD) {
        Some(Value::String(id)) => target.with_diagram(id.clone()),
        Some(Value::Number(id)) => target.with_diagram(id.to_string()),
        _ => target,
    }
}

/// Flattens a `reqwest::Error` and its sources into `IplError::Transport`.
fn transport_error(target: &CallTarget, err: &reqwest::Error) -> IplError {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    IplError::Transport {
        target: target.clone(),
        message,
        timed_out: err.is_timeout(),
    }
}
