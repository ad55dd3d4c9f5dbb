//! HTTP client for the metadata (discovery) service

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::retry::{RetryPolicy, delay_for_attempt};
use super::{CatalogRequest, MetadataClient, check_status};
use crate::{Error, Result};

#[derive(Serialize)]
struct LocationRequest<'a> {
    #[serde(rename = "ip-address")]
    ip_address: &'a str,
    port: u16,
}

#[derive(Deserialize)]
struct LocationResponse {
    uid: String,
}

/// Client for the metadata service REST API
#[derive(Debug, Clone)]
pub struct MetadataApi {
    client: Client,
    base_url: Url,
}

impl MetadataApi {
    /// Create a client for the service at `base_url`
    ///
    /// # Errors
    ///
    /// Returns `Config` if the URL cannot be parsed
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid metadata service URL {base_url}: {e}")))?;
        Ok(Self {
            client: Client::new(),
            base_url,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("metadata URL cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl MetadataClient for MetadataApi {
    async fn register_location(&self, ip: &str, port: u16) -> Result<String> {
        let url = self.endpoint(&["catalog", "announce"])?;
        let response = self
            .client
            .put(url)
            .json(&LocationRequest {
                ip_address: ip,
                port,
            })
            .send()
            .await?;

        let location: LocationResponse = check_status("metadata", response).await?.json().await?;
        Ok(location.uid)
    }

    async fn catalog_item(&self, location_token: &str, request: &CatalogRequest) -> Result<()> {
        let url = self.endpoint(&["catalog", "items", location_token])?;
        let response = self.client.put(url).json(request).send().await?;
        check_status("metadata", response).await?;
        Ok(())
    }

    async fn remove_from_catalog(&self, subject: &str) -> Result<()> {
        let url = self.endpoint(&["catalog", "items", subject])?;
        let response = self.client.delete(url).send().await?;
        check_status("metadata", response).await?;
        Ok(())
    }
}

/// Split a public URL such as `http://host:8080` into host and port
///
/// # Errors
///
/// Returns `Config` if the URL does not parse or carries no host
pub fn host_and_port(public_url: &str) -> Result<(String, u16)> {
    let url = Url::parse(public_url)
        .map_err(|e| Error::Config(format!("invalid public URL {public_url}: {e}")))?;

    let host = url
        .host_str()
        .ok_or_else(|| Error::Config(format!("public URL has no host: {public_url}")))?
        .to_string();
    let port = url
        .port_or_known_default()
        .ok_or_else(|| Error::Config(format!("public URL has no port: {public_url}")))?;

    Ok((host, port))
}

/// Register the node's public location, retrying with exponential backoff
///
/// Keeps trying until registration succeeds, the policy gives up, or
/// `cancel` fires.
///
/// # Errors
///
/// Returns `Config` if `public_url` is invalid, the last registration error
/// if the policy runs out of attempts, or `RemoteCall` if cancelled
pub async fn register_with_backoff(
    client: &dyn MetadataClient,
    public_url: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<String> {
    let (host, port) = host_and_port(public_url)?;
    let mut attempt: u32 = 0;

    loop {
        match client.register_location(&host, port).await {
            Ok(token) => {
                tracing::info!(%host, port, attempts = attempt + 1, "registered with metadata service");
                return Ok(token);
            }
            Err(e) => {
                if !policy.allows(attempt) {
                    return Err(e);
                }

                let delay = delay_for_attempt(policy, attempt);
                tracing::warn!(error = %e, attempt, ?delay, "metadata registration failed, retrying");

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        return Err(Error::RemoteCall("metadata registration cancelled".to_string()));
                    }
                    () = tokio::time::sleep(delay) => {}
                }
                attempt = attempt.saturating_add(1);
            }
        }
    }
}
