//! RPC endpoint URL normalization and provider labeling.

use thiserror::Error;
use tracing::warn;
use url::Url;

const HTTPS: &str = "https://";
const HTTP: &str = "http://";
const WSS: &str = "wss://";
const WS: &str = "ws://";

/// Errors emitted when a configured endpoint URL cannot be used.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error("endpoint url `{url}` must start with http(s):// or ws(s)://")]
    UnsupportedScheme { url: String },
    #[error("endpoint url `{url}` is malformed: {reason}")]
    Malformed { url: String, reason: String },
}

/// A request/response (http or https) RPC URL that passed normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointUrl {
    url: String,
    parsed: Url,
}

impl EndpointUrl {
    /// Trims the input and rewrites streaming schemes to their
    /// request/response counterpart (`wss` -> `https`, `ws` -> `http`).
    pub fn normalize(raw: &str) -> Result<Self, EndpointError> {
        let trimmed = raw.trim();
        let url = if let Some(rest) = trimmed.strip_prefix(WSS) {
            let url = format!("{HTTPS}{rest}");
            warn!(original = trimmed, normalized = %url, "rewrote wss:// endpoint to https://");
            url
        } else if let Some(rest) = trimmed.strip_prefix(WS) {
            let url = format!("{HTTP}{rest}");
            warn!(original = trimmed, normalized = %url, "rewrote ws:// endpoint to http://");
            url
        } else if trimmed.starts_with(HTTPS) || trimmed.starts_with(HTTP) {
            trimmed.to_string()
        } else {
            return Err(EndpointError::UnsupportedScheme {
                url: trimmed.to_string(),
            });
        };

        let parsed = Url::parse(&url).map_err(|err| EndpointError::Malformed {
            url: url.clone(),
            reason: err.to_string(),
        })?;
        Ok(Self { url, parsed })
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// The streaming form of this URL, used for pubsub subscriptions.
    ///
    /// Solana nodes serve pubsub one port above RPC, so an explicit port is
    /// bumped by one (`http://localhost:8899` -> `ws://localhost:8900`).
    /// Default ports are left implicit.
    pub fn websocket_url(&self) -> String {
        let (scheme, rest) = if let Some(rest) = self.url.strip_prefix(HTTPS) {
            (WSS, rest)
        } else if let Some(rest) = self.url.strip_prefix(HTTP) {
            (WS, rest)
        } else {
            return self.url.clone();
        };

        let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        let (authority, tail) = rest.split_at(authority_end);
        let next_port = self.parsed.port().and_then(|port| port.checked_add(1));
        match (next_port, authority.rfind(':')) {
            (Some(port), Some(colon)) => {
                format!("{scheme}{}:{port}{tail}", &authority[..colon])
            }
            _ => format!("{scheme}{rest}"),
        }
    }

    /// Human-friendly provider name guessed from the host.
    pub fn provider_label(&self) -> &'static str {
        if self.url.contains("quiknode") {
            "QuickNode"
        } else if self.url.contains("alchemy") {
            "Alchemy"
        } else if self.url.contains("helius") {
            "Helius"
        } else {
            "RPC"
        }
    }
}

impl std::fmt::Display for EndpointUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url)
    }
}
