//! Pyth Hermes price client.

use crate::{get_json, ApiError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

pub const DEFAULT_HERMES_URL: &str = "https://hermes.pyth.network";

/// A feed returned by a Hermes search.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceFeed {
    pub id: String,
    #[serde(default)]
    pub attributes: serde_json::Value,
}

/// Latest USD price for a feed.
#[derive(Debug, Clone, PartialEq)]
pub struct UsdPrice {
    pub feed_id: String,
    pub price: f64,
    pub publish_time: i64,
}

/// Anything that can price a token in USD by name.
#[async_trait]
pub trait PriceSource: Send + Sync + std::fmt::Debug {
    async fn usd_price(&self, asset_name: &str) -> Result<UsdPrice>;
}

#[derive(Debug, Deserialize)]
struct LatestUpdates {
    parsed: Vec<ParsedUpdate>,
}

#[derive(Debug, Deserialize)]
struct ParsedUpdate {
    id: String,
    price: RawPrice,
}

#[derive(Debug, Deserialize)]
struct RawPrice {
    /// Integer mantissa, sent as a string
    price: String,
    expo: i32,
    publish_time: i64,
}

impl RawPrice {
    fn to_f64(&self) -> Option<f64> {
        let mantissa: i64 = self.price.parse().ok()?;
        Some(mantissa as f64 * 10f64.powi(self.expo))
    }
}

/// Hermes REST client.
#[derive(Clone)]
pub struct PythClient {
    client: reqwest::Client,
    base_url: String,
}

impl std::fmt::Debug for PythClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PythClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl Default for PythClient {
    fn default() -> Self {
        Self::new(DEFAULT_HERMES_URL, Duration::from_secs(10))
    }
}

impl PythClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Search crypto feeds matching `query` (case-insensitive).
    #[instrument(skip(self))]
    pub async fn search_feeds(&self, query: &str) -> Result<Vec<PriceFeed>> {
        let url = format!("{}/v2/price_feeds", self.base_url);
        let query = query.to_lowercase();
        let feeds: Vec<PriceFeed> = get_json(
            &self.client,
            "pyth",
            &url,
            &[("query", query.as_str()), ("asset_type", "crypto")],
        )
        .await?;
        debug!(count = feeds.len(), "Price feeds found");
        Ok(feeds)
    }

    /// Latest parsed price for a feed id.
    #[instrument(skip(self))]
    pub async fn latest_price(&self, feed_id: &str) -> Result<UsdPrice> {
        let url = format!("{}/v2/updates/price/latest", self.base_url);
        let updates: LatestUpdates = get_json(
            &self.client,
            "pyth",
            &url,
            &[("ids[]", feed_id), ("encoding", "hex"), ("parsed", "true")],
        )
        .await?;

        let update = updates.parsed.into_iter().next().ok_or(ApiError::Payload {
            service: "pyth",
            message: "empty parsed price list".to_string(),
        })?;
        let price = update.price.to_f64().ok_or_else(|| ApiError::Payload {
            service: "pyth",
            message: format!("unparseable price '{}'", update.price.price),
        })?;

        Ok(UsdPrice {
            feed_id: update.id,
            price,
            publish_time: update.price.publish_time,
        })
    }
}

#[async_trait]
impl PriceSource for PythClient {
    async fn usd_price(&self, asset_name: &str) -> Result<UsdPrice> {
        let feeds = self.search_feeds(asset_name).await?;
        let feed = feeds
            .first()
            .ok_or_else(|| ApiError::NotFound("Price feed not found".to_string()))?;
        self.latest_price(&feed.id).await
    }
}
