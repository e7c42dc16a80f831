//! `AppConfig` struct, TOML loading, and environment overrides.

use std::fmt;
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use url::Url;
use vvipl_api::upstream::{Credentials, DEFAULT_TIMEOUT};

/// Overrides `[upstream].base_url`.
pub const ENV_BASE_URL: &str = "VVIPL_BASE_URL";

/// Overrides `[upstream].username`.
pub const ENV_USERNAME: &str = "VVIPL_USERNAME";

/// Overrides `[upstream].password`.
pub const ENV_PASSWORD: &str = "VVIPL_PASSWORD";

/// Default proxy listen address.
const DEFAULT_PROXY_BIND: &str = "127.0.0.1:8787";

/// Top-level application configuration.
#[derive(Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AppConfig {
    /// Upstream API settings.
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Catalog aggregation settings.
    #[serde(default)]
    pub catalog: CatalogConfig,
    /// Local proxy settings.
    #[serde(default)]
    pub proxy: ProxyConfig,
}

/// Upstream API configuration.
#[derive(Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct UpstreamConfig {
    /// API base URL; endpoint names are appended to it.
    pub base_url: Option<String>,
    /// API username.
    pub username: Option<String>,
    /// API password.
    pub password: Option<String>,
    /// Per-request timeout in seconds (default: 30).
    pub timeout_secs: Option<u64>,
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Catalog aggregation configuration.
#[derive(Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CatalogConfig {
    /// Maximum per-diagram fetches in flight (default: 1).
    pub concurrency: Option<usize>,
}

/// Local proxy configuration.
#[derive(Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Listen address (default: `127.0.0.1:8787`).
    pub bind: Option<String>,
}

impl AppConfig {
    /// Loads config from a TOML file. Returns default if file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Applies environment overrides using `lookup` to read variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup(ENV_BASE_URL) {
            self.upstream.base_url = Some(v);
        }
        if let Some(v) = lookup(ENV_USERNAME) {
            self.upstream.username = Some(v);
        }
        if let Some(v) = lookup(ENV_PASSWORD) {
            self.upstream.password = Some(v);
        }
    }
}

impl UpstreamConfig {
    /// Returns the parsed base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is missing or not a valid URL.
    pub fn base_url(&self) -> Result<Url> {
        let raw = self.base_url.as_deref().with_context(|| {
            format!("upstream base URL is not configured (set [upstream].base_url or {ENV_BASE_URL})")
        })?;
        Url::parse(raw).with_context(|| format!("invalid upstream base URL: {raw}"))
    }

    /// Returns the configured credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the username or password is missing.
    pub fn credentials(&self) -> Result<Credentials> {
        let username = self.username.as_deref().with_context(|| {
            format!("upstream username is not configured (set [upstream].username or {ENV_USERNAME})")
        })?;
        let password = self.password.as_deref().with_context(|| {
            format!("upstream password is not configured (set [upstream].password or {ENV_PASSWORD})")
        })?;
        Ok(Credentials::new(username, password))
    }

    /// Returns the per-request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout_secs
            .map_or(DEFAULT_TIMEOUT, Duration::from_secs)
    }
}

impl CatalogConfig {
    /// Returns the configured fetch concurrency.
    ///
    /// # Errors
    ///
    /// Returns an error if `concurrency` is set to 0.
    pub fn concurrency(&self) -> Result<NonZeroUsize> {
        match self.concurrency {
            None => Ok(NonZeroUsize::MIN),
            Some(n) => match NonZeroUsize::new(n) {
                Some(n) => Ok(n),
                None => bail!("[catalog].concurrency must be at least 1"),
            },
        }
    }
}

impl ProxyConfig {
    /// Returns the listen address.
    #[must_use]
    pub fn bind(&self) -> &str {
        self.bind.as_deref().unwrap_or(DEFAULT_PROXY_BIND)
    }
}
