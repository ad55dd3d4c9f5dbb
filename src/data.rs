//! Policy-checked access to stored data and metadata

use std::sync::Arc;

use serde::Serialize;

use crate::clients::{StorageClient, StoredValue};
use crate::entitlements::EntitlementStore;
use crate::metadata::{Metadata, MetadataStore};
use crate::subject::Subject;
use crate::{Error, Result};

/// Values stored for a subject together with its description
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataResponse {
    pub data: Vec<StoredValue>,
    pub metadata: Metadata,
}

/// Serves data and metadata to callers according to accepted entitlements
#[derive(Clone)]
pub struct DataAccess {
    entitlements: Arc<EntitlementStore>,
    metadata: Arc<MetadataStore>,
    storage_client: Arc<dyn StorageClient>,
}

impl DataAccess {
    #[must_use]
    pub fn new(
        entitlements: Arc<EntitlementStore>,
        metadata: Arc<MetadataStore>,
        storage_client: Arc<dyn StorageClient>,
    ) -> Self {
        Self {
            entitlements,
            metadata,
            storage_client,
        }
    }

    /// Stored values for `key` if its governing entitlement allows access
    ///
    /// # Errors
    ///
    /// Returns `MalformedAddress` if `key` is not a valid address,
    /// `AccessDenied` if no accessible entitlement governs it, `NotFound` if
    /// there is no metadata for it, or the storage client's error
    pub async fn get_data(&self, key: &str) -> Result<DataResponse> {
        let subject = Subject::parse(key)?;

        let accessible = self
            .entitlements
            .accepted
            .find_for_subject(&subject)
            .await
            .is_some_and(|ent| ent.is_accessible());
        if !accessible {
            tracing::debug!(%subject, "data request refused");
            return Err(Error::AccessDenied(format!("{subject} is not accessible")));
        }

        let data = self.storage_client.get_all(&subject.to_string()).await?;

        let metadata = self
            .metadata
            .find_by_subject(&subject)
            .await
            .ok_or_else(|| Error::NotFound(format!("metadata for {subject}")))?;

        Ok(DataResponse { data, metadata })
    }

    /// Metadata records whose subjects are governed by a discoverable
    /// entitlement
    pub async fn visible_metadata(&self) -> Vec<Metadata> {
        let mut visible = Vec::new();
        for meta in self.metadata.all().await {
            let discoverable = self
                .entitlements
                .accepted
                .find_for_subject(&meta.subject)
                .await
                .is_some_and(|ent| ent.is_discoverable());
            if discoverable {
                visible.push(meta);
            }
        }
        visible
    }
}
