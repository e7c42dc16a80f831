//! Shared proxy state.

use std::sync::Arc;

use vvipl_api::upstream::UpstreamClient;

/// State shared by every proxy request.
#[derive(Debug, Clone)]
pub struct ProxyState {
    /// Upstream client carrying base URL, credentials, and timeout.
    pub client: Arc<UpstreamClient>,
}

impl ProxyState {
    /// Wraps a client for sharing across requests.
    #[must_use]
    pub fn new(client: UpstreamClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}
