//! Error types for upstream calls and catalog aggregation.

use std::fmt;

/// Identifies a single upstream call (endpoint plus diagram, when present).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallTarget {
    /// Endpoint name (e.g. `get-diagrams`).
    pub endpoint: String,
    /// Diagram ID sent in the payload, if any.
    pub diagram_id: Option<String>,
}

impl CallTarget {
    /// Creates a target for `endpoint` without a diagram.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            diagram_id: None,
        }
    }

    /// Attaches a diagram ID.
    #[must_use]
    pub fn with_diagram(mut self, diagram_id: impl Into<String>) -> Self {
        self.diagram_id = Some(diagram_id.into());
        self
    }
}

impl fmt::Display for CallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.diagram_id {
            Some(id) => write!(f, "{} (diagram {id})", self.endpoint),
            None => f.write_str(&self.endpoint),
        }
    }
}

/// Errors returned by the upstream client and the catalog aggregator.
#[derive(Debug, thiserror::Error)]
pub enum IplError {
    /// The upstream service could not be reached, or the request timed out.
    #[error("{target}: transport error: {message}")]
    Transport {
        /// Failed call.
        target: CallTarget,
        /// Underlying transport error message.
        message: String,
        /// Whether the fixed request timeout elapsed.
        timed_out: bool,
    },

    /// The upstream service answered with a non-success status.
    #[error("{target}: upstream error (HTTP {status}){}", fmt_body(.body.as_deref()))]
    Upstream {
        /// Failed call.
        target: CallTarget,
        /// HTTP status code.
        status: u16,
        /// Response body, when one was returned.
        body: Option<String>,
    },

    /// A success response whose body was not valid JSON.
    #[error("{target}: failed to decode JSON response: {message}")]
    Decode {
        /// Failed call.
        target: CallTarget,
        /// Decoder error message.
        message: String,
    },

    /// A response that was valid JSON but not in the expected shape.
    #[error("{target}: unexpected response shape: {message}")]
    Aggregation {
        /// Call whose response was rejected.
        target: CallTarget,
        /// What was wrong with the response.
        message: String,
    },
}

fn fmt_body(body: Option<&str>) -> String {
    body.map_or_else(String::new, |b| format!(": {b}"))
}

impl IplError {
    /// Returns the call this error belongs to.
    #[must_use]
    pub const fn target(&self) -> &CallTarget {
        match self {
            Self::Transport { target, .. }
            | Self::Upstream { target, .. }
            | Self::Decode { target, .. }
            | Self::Aggregation { target, .. } => target,
        }
    }

    /// Returns the upstream HTTP status for `Upstream` errors.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}
