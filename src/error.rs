// Error taxonomy for the hotel tools and the upstream Amadeus client.

use std::time::Duration;

use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HotelsApiError {
    #[error("invalid parameters: {0}")]
    Validation(String),

    #[error("Amadeus API error {status} ({code}): {title} - {detail}")]
    Upstream {
        status: u16,
        code: i64,
        title: String,
        detail: String,
    },

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("no pooled client became available within {waited:?}")]
    PoolTimeout { waited: Duration },

    #[error("operation timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },

    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HotelsApiError {
    /// Stable kind string used in operation records and the wire error shape.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Upstream { .. } => "upstream",
            Self::Authentication(_) => "authentication",
            Self::RateLimited(_) => "rate_limited",
            Self::PoolTimeout { .. } => "pool_timeout",
            Self::Timeout { .. } => "timeout",
            Self::Http(_) => "network",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether a later attempt could succeed. Caller mistakes (validation,
    /// bad credentials, upstream 4xx) are permanent; transient conditions
    /// (5xx, network, rate limiting, timeouts) are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Authentication(_) | Self::Internal(_) => false,
            Self::Upstream { status, .. } => *status >= 500,
            Self::RateLimited(_)
            | Self::PoolTimeout { .. }
            | Self::Timeout { .. }
            | Self::Http(_) => true,
        }
    }

    /// User-visible error payload carried back through the tool protocol.
    pub fn to_wire(&self) -> serde_json::Value {
        json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
                "retryable": self.is_retryable(),
            }
        })
    }
}

impl From<serde_json::Error> for HotelsApiError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(format!("serialization failure: {e}"))
    }
}
