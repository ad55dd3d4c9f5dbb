//! Clients for the remote metadata and storage services
//!
//! The pipeline and the entitlement manager only see the [`MetadataClient`]
//! and [`StorageClient`] traits, so tests can swap in recording mocks.

pub mod metadata;
pub mod retry;
pub mod storage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

pub use metadata::{MetadataApi, register_with_backoff};
pub use retry::RetryPolicy;
pub use storage::StorageApi;

/// Entry announced to the metadata catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRequest {
    /// Fully qualified subject of the data field
    pub key: String,
    /// Discovery tags harvested from the field's schema
    pub tags: Vec<String>,
    /// Sample rendering of the value
    pub sample: String,
}

/// A value as stored by the storage service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredValue {
    pub value: serde_json::Value,
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
}

/// Contract of the remote metadata (discovery) service
#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// Announce the node's public location, returning a location token
    async fn register_location(&self, ip: &str, port: u16) -> Result<String>;

    /// Add or refresh a catalog entry for a data field
    async fn catalog_item(&self, location_token: &str, request: &CatalogRequest) -> Result<()>;

    /// Remove a subject from the catalog
    async fn remove_from_catalog(&self, subject: &str) -> Result<()>;
}

/// Contract of the remote storage service
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Append a value to a bucket
    async fn append(&self, bucket: &str, value: &serde_json::Value) -> Result<()>;

    /// Values recently stored in a bucket, oldest first
    async fn get_all(&self, bucket: &str) -> Result<Vec<StoredValue>>;
}

/// Turn a non-success response into a `RemoteCall` error
pub(crate) async fn check_status(
    service: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(crate::Error::RemoteCall(format!(
        "{service} API error: {status} - {body}"
    )))
}
