//! HTTP client for the storage service

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use url::Url;

use super::{StorageClient, StoredValue, check_status};
use crate::{Error, Result};

#[derive(Serialize)]
struct AppendRequest<'a> {
    bucket: &'a str,
    value: &'a serde_json::Value,
}

/// Client for the storage service REST API
#[derive(Debug, Clone)]
pub struct StorageApi {
    client: Client,
    data_url: Url,
}

impl StorageApi {
    /// Create a client for the service at `base_url`
    ///
    /// # Errors
    ///
    /// Returns `Config` if the URL cannot be parsed
    pub fn new(base_url: &str) -> Result<Self> {
        let mut data_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid storage service URL {base_url}: {e}")))?;
        data_url
            .path_segments_mut()
            .map_err(|()| Error::Config(format!("storage URL cannot be a base: {base_url}")))?
            .pop_if_empty()
            .extend(["data", ""]);

        Ok(Self {
            client: Client::new(),
            data_url,
        })
    }
}

#[async_trait]
impl StorageClient for StorageApi {
    async fn append(&self, bucket: &str, value: &serde_json::Value) -> Result<()> {
        let response = self
            .client
            .put(self.data_url.clone())
            .json(&AppendRequest { bucket, value })
            .send()
            .await?;
        check_status("storage", response).await?;
        Ok(())
    }

    async fn get_all(&self, bucket: &str) -> Result<Vec<StoredValue>> {
        let response = self
            .client
            .get(self.data_url.clone())
            .query(&[("bucket-uid", bucket)])
            .send()
            .await?;
        let values = check_status("storage", response).await?.json().await?;
        Ok(values)
    }
}
