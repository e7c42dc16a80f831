//! `UpstreamApi` trait definition.
#![allow(clippy::future_not_send)]

use serde_json::{Map, Value};

use super::error::IplError;

/// Vehicle & Vessel IPL API trait.
///
/// Abstracts the single POST operation so the catalog aggregator can be
/// driven by mocks in tests.
/// Uses `trait_variant::make` to generate a `Send`-bound async trait.
#[allow(clippy::module_name_repetitions)]
#[trait_variant::make(UpstreamApi: Send)]
pub trait LocalUpstreamApi {
    /// Calls `endpoint` with `payload` merged over the static credentials.
    ///
    /// # Errors
    ///
    /// Returns `IplError::Transport` on network failure or timeout,
    /// `IplError::Upstream` on a non-2xx status, and `IplError::Decode`
    /// if the response body is not JSON.
    async fn call(&self, endpoint: &str, payload: &Map<String, Value>) -> Result<Value, IplError>;
}
