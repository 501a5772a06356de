//! Midas API clients for best-effort external lookups.
//!
//! This crate provides HTTP clients for:
//! - Pyth Hermes: USD price feeds for token balance valuation
//! - IPFS gateway: gauge metadata (name, description, resources)
//!
//! Callers treat every lookup here as optional: a failure degrades the
//! result, it never aborts an on-chain operation.

mod ipfs;
mod pyth;

pub use ipfs::{GaugeMetadata, IpfsClient, MetadataResource, MetadataSource, DEFAULT_IPFS_GATEWAY};
pub use pyth::{PriceFeed, PriceSource, PythClient, UsdPrice, DEFAULT_HERMES_URL};

use thiserror::Error;

/// Failure of an external HTTP lookup.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("unexpected {service} response: {message}")]
    Payload {
        service: &'static str,
        message: String,
    },

    #[error("{0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// GET `url` and decode the JSON body, mapping transport and status failures.
async fn get_json<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    service: &'static str,
    url: &str,
    query: &[(&str, &str)],
) -> Result<T> {
    let response = client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|e| ApiError::Request {
            url: url.to_string(),
            message: e.to_string(),
        })?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Status {
            service,
            status,
            body,
        });
    }

    response.json::<T>().await.map_err(|e| ApiError::Payload {
        service,
        message: e.to_string(),
    })
}
