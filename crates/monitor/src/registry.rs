use std::sync::Arc;

use sweep_relay_domain::endpoint::EndpointUrl;

use crate::rpc::{LedgerClient, SolanaLedgerClient};
use crate::worker::MonitorError;

/// One configured RPC endpoint. Immutable after construction.
#[derive(Clone)]
pub struct Endpoint {
    pub id: String,
    pub label: String,
    pub url: String,
    pub client: Arc<dyn LedgerClient>,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

/// Ordered, non-empty endpoint set. The first entry is the primary, used for
/// balance reads, blockhash fetches and the log subscription.
#[derive(Debug, Clone)]
pub struct EndpointRegistry {
    endpoints: Vec<Endpoint>,
}

impl EndpointRegistry {
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self, MonitorError> {
        if endpoints.is_empty() {
            return Err(MonitorError::NoEndpoints);
        }
        Ok(Self { endpoints })
    }

    /// Builds Solana clients for already-normalized URLs, assigning ids
    /// `endpoint-1`, `endpoint-2`, ... in configuration order.
    pub fn from_urls(urls: &[EndpointUrl]) -> Result<Self, MonitorError> {
        let endpoints = urls
            .iter()
            .enumerate()
            .map(|(index, url)| Endpoint {
                id: endpoint_id(index),
                label: url.provider_label().to_string(),
                url: url.as_str().to_string(),
                client: Arc::new(SolanaLedgerClient::new(url)) as Arc<dyn LedgerClient>,
            })
            .collect();
        Self::new(endpoints)
    }

    pub fn primary(&self) -> &Endpoint {
        &self.endpoints[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

pub fn endpoint_id(index: usize) -> String {
    format!("endpoint-{}", index + 1)
}
