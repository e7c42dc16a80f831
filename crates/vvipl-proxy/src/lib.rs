//! Local pass-through proxy for the Vehicle & Vessel IPL API.
//!
//! Browsers cannot call the upstream API directly because of same-origin
//! restrictions. The proxy accepts the JSON body on a local origin, adds
//! the configured credentials, and relays the upstream reply unchanged.

mod handlers;
mod router;
mod server;
mod state;

pub use router::router;
pub use server::serve;
pub use state::ProxyState;
