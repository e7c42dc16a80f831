//! API client library for vvipl.
//!
//! Provides the Vehicle & Vessel IPL upstream client and the parts
//! catalog aggregation built on top of it.

/// Parts catalog aggregation.
pub mod catalog;

/// Upstream IPL API client.
pub mod upstream;
