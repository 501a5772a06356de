//! IPFS gateway client for gauge metadata.

use crate::{get_json, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

pub const DEFAULT_IPFS_GATEWAY: &str = "https://externalorgs.mypinata.cloud/ipfs";

const ELIGIBILITY_FIELD: &str = "Project Details";
const ELIGIBILITY_MARKER: &str = "Eligibility Form";

/// Gauge metadata document as pinned by the gauge creator.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GaugeMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub resources: Vec<MetadataResource>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataResource {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl GaugeMetadata {
    /// Link to the project's eligibility form, when the metadata lists one.
    pub fn eligibility_url(&self) -> Option<&str> {
        self.resources
            .iter()
            .find(|r| {
                r.field == ELIGIBILITY_FIELD
                    && r.value
                        .as_deref()
                        .is_some_and(|v| v.contains(ELIGIBILITY_MARKER))
            })
            .and_then(|r| r.url.as_deref())
    }
}

/// Anything that can resolve a metadata URI to a document.
#[async_trait]
pub trait MetadataSource: Send + Sync + std::fmt::Debug {
    async fn gauge_metadata(&self, metadata_uri: &str) -> Result<GaugeMetadata>;
}

/// IPFS HTTP gateway client. Documents are content-addressed, so the cache
/// never expires.
#[derive(Clone)]
pub struct IpfsClient {
    client: reqwest::Client,
    gateway: String,
    cache: Arc<DashMap<String, GaugeMetadata>>,
}

impl std::fmt::Debug for IpfsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpfsClient")
            .field("gateway", &self.gateway)
            .field("cache_size", &self.cache.len())
            .finish()
    }
}

impl Default for IpfsClient {
    fn default() -> Self {
        Self::new(DEFAULT_IPFS_GATEWAY, Duration::from_secs(10))
    }
}

impl IpfsClient {
    pub fn new(gateway: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            gateway: gateway.into().trim_end_matches('/').to_string(),
            cache: Arc::new(DashMap::new()),
        }
    }

    /// Gateway URL for an `ipfs://` URI or a bare CID.
    pub fn gateway_url(&self, metadata_uri: &str) -> String {
        let hash = metadata_uri.trim().trim_start_matches("ipfs://");
        format!("{}/{}", self.gateway, hash)
    }

    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }
}

#[async_trait]
impl MetadataSource for IpfsClient {
    #[instrument(skip(self))]
    async fn gauge_metadata(&self, metadata_uri: &str) -> Result<GaugeMetadata> {
        if let Some(cached) = self.cache.get(metadata_uri) {
            debug!("Cache hit for gauge metadata");
            return Ok(cached.clone());
        }

        let url = self.gateway_url(metadata_uri);
        let metadata: GaugeMetadata = get_json(&self.client, "ipfs", &url, &[]).await?;
        self.cache.insert(metadata_uri.to_string(), metadata.clone());
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_url() {
        let client = IpfsClient::new("https://gateway.example/ipfs/", Duration::from_secs(1));
        assert_eq!(
            client.gateway_url("ipfs://bafyabc"),
            "https://gateway.example/ipfs/bafyabc"
        );
        assert_eq!(client.gateway_url("bafyabc"), "https://gateway.example/ipfs/bafyabc");
    }

    #[test]
    fn test_eligibility_url() {
        let metadata: GaugeMetadata = serde_json::from_str(
            r#"{
                "name": "Velocity Pool",
                "resources": [
                    {"field": "Website", "value": "Home", "url": "https://velocity.example"},
                    {"field": "Project Details", "value": "Eligibility Form (2024)", "url": "https://forms.example/velocity"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(metadata.name.as_deref(), Some("Velocity Pool"));
        assert_eq!(metadata.eligibility_url(), Some("https://forms.example/velocity"));
    }

    #[test]
    fn test_missing_fields_default() {
        let metadata: GaugeMetadata = serde_json::from_str("{}").unwrap();
        assert!(metadata.name.is_none());
        assert!(metadata.eligibility_url().is_none());
    }
}
