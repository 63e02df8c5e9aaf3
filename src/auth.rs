// Bearer-token gate in front of the tool layer.
//
// Discovery methods stay open so clients can complete the MCP handshake and
// inspect the tool catalog before presenting credentials; only `tools/call`
// reaches data, and that is what the gate protects.

use std::collections::HashSet;

use serde_json::Value;
use tracing::warn;

use crate::error::HotelsApiError;

const EXEMPT_METHODS: [&str; 3] = ["initialize", "ping", "tools/list"];

pub struct BearerAuth {
    tokens: HashSet<String>,
}

impl BearerAuth {
    /// An empty allow-list disables the gate entirely.
    pub fn new(tokens: &[String]) -> Self {
        Self {
            tokens: tokens
                .iter()
                .filter(|t| !t.is_empty())
                .cloned()
                .collect(),
        }
    }

    pub fn enabled(&self) -> bool {
        !self.tokens.is_empty()
    }

    /// Check one request before it reaches the tool layer. The credential
    /// rides in `params._meta.authorization` as `Bearer <token>`.
    pub fn authorize(&self, method: &str, params: Option<&Value>) -> Result<(), HotelsApiError> {
        if !self.enabled() {
            return Ok(());
        }
        if EXEMPT_METHODS.contains(&method) || method.starts_with("notifications/") {
            return Ok(());
        }

        let header = params
            .and_then(|p| p.get("_meta"))
            .and_then(|m| m.get("authorization"))
            .and_then(|a| a.as_str());

        let Some(header) = header else {
            warn!(method, "request rejected: missing authorization");
            return Err(HotelsApiError::Authentication(
                "missing authorization token".into(),
            ));
        };
        let token = header.strip_prefix("Bearer ").unwrap_or(header);
        if self.tokens.contains(token) {
            Ok(())
        } else {
            warn!(method, "request rejected: unknown token");
            Err(HotelsApiError::Authentication("invalid token".into()))
        }
    }
}
