//! Vehicle & Vessel IPL upstream client module.
//!
//! Issues JSON POST requests to `{base_url}/{endpoint}` with the static
//! credentials merged into every request body.

mod api;
mod client;
mod credentials;
mod error;

#[allow(clippy::module_name_repetitions)]
pub use api::{LocalUpstreamApi, UpstreamApi};
#[allow(clippy::module_name_repetitions)]
pub use client::{DEFAULT_TIMEOUT, UpstreamClient, UpstreamClientBuilder, UpstreamResponse};
pub use credentials::Credentials;
pub use error::{CallTarget, IplError};
