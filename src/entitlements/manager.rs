//! Entitlement lifecycle operations
//!
//! Moves entitlements between the partitions of an [`EntitlementStore`] and
//! keeps the metadata catalog in step when an amendment withdraws
//! discoverability.

use std::sync::Arc;

use super::{AccessLevel, Entitlement, EntitlementStore, Status};
use crate::clients::MetadataClient;
use crate::subject::Subject;
use crate::{Error, Result};

/// Request, accept, decline, amend and revoke entitlements
#[derive(Clone)]
pub struct EntitlementManager {
    store: Arc<EntitlementStore>,
    metadata_client: Arc<dyn MetadataClient>,
}

impl EntitlementManager {
    #[must_use]
    pub fn new(store: Arc<EntitlementStore>, metadata_client: Arc<dyn MetadataClient>) -> Self {
        Self {
            store,
            metadata_client,
        }
    }

    /// The underlying store
    #[must_use]
    pub fn store(&self) -> &Arc<EntitlementStore> {
        &self.store
    }

    /// Record a request for access to a subject
    ///
    /// A repeated request on the same subject replaces the pending one.
    ///
    /// # Errors
    ///
    /// Returns `MalformedAddress` if `subject` is not a valid address
    pub async fn request(&self, subject: &str, level: AccessLevel) -> Result<Entitlement> {
        let subject = Subject::parse(subject)?;
        let ent = Entitlement::new(subject, level, Status::Requested);
        let stored = self.store.requested.append_or_replace_on_subject(ent).await;

        tracing::info!(uid = %stored.uid, subject = %stored.subject, level = %stored.access_level, "entitlement requested");
        Ok(stored)
    }

    /// Look up a pending request
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no request with this UID
    pub async fn find_request(&self, uid: &str) -> Result<Entitlement> {
        self.store
            .requested
            .get(uid)
            .await
            .ok_or_else(|| Error::NotFound(format!("requested entitlement {uid}")))
    }

    /// Every pending request
    pub async fn list_requests(&self) -> Vec<Entitlement> {
        self.store.requested.all().await
    }

    /// Withdraw a pending request
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no request with this UID
    pub async fn delete_request(&self, uid: &str) -> Result<Entitlement> {
        let removed = self
            .store
            .requested
            .delete(uid)
            .await
            .ok_or_else(|| Error::NotFound(format!("requested entitlement {uid}")))?;

        tracing::info!(%uid, subject = %removed.subject, "entitlement request deleted");
        Ok(removed)
    }

    /// Accept a pending request
    ///
    /// Any accepted entitlement already bound to the same subject is replaced.
    /// Returns the entitlement as stored in the accepted partition.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no request with this UID
    pub async fn accept(&self, uid: &str) -> Result<Entitlement> {
        let mut ent = self.take_request(uid).await?;
        ent.status = Status::Accepted;
        let stored = self.store.accepted.append_or_replace_on_subject(ent).await;

        tracing::info!(uid = %stored.uid, subject = %stored.subject, level = %stored.access_level, "entitlement accepted");
        Ok(stored)
    }

    /// Decline a pending request
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no request with this UID
    pub async fn decline(&self, uid: &str) -> Result<Entitlement> {
        let mut ent = self.take_request(uid).await?;
        ent.status = Status::Declined;
        self.store.declined.add(ent.clone()).await;

        tracing::info!(%uid, subject = %ent.subject, "entitlement declined");
        Ok(ent)
    }

    /// Accepted entitlements, optionally only those bound to exactly `subject`
    ///
    /// # Errors
    ///
    /// Returns `MalformedAddress` if `subject` is given and invalid
    pub async fn list_accepted(&self, subject: Option<&str>) -> Result<Vec<Entitlement>> {
        match subject {
            Some(subject) => {
                let subject = Subject::parse(subject)?;
                Ok(self.store.accepted.find_by_subject(&subject).await)
            }
            None => Ok(self.store.accepted.all().await),
        }
    }

    /// Look up an accepted entitlement
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no accepted entitlement with this UID
    pub async fn find_accepted(&self, uid: &str) -> Result<Entitlement> {
        self.store
            .accepted
            .get(uid)
            .await
            .ok_or_else(|| Error::NotFound(format!("accepted entitlement {uid}")))
    }

    /// Change the access level of an accepted entitlement
    ///
    /// When the new level no longer allows discovery the subject is removed
    /// from the metadata catalog. The amendment stays applied even if that
    /// removal fails.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no accepted entitlement with this UID,
    /// or `RemoteCall` if the catalog removal fails
    pub async fn amend(&self, uid: &str, level: AccessLevel) -> Result<Entitlement> {
        let amended = self
            .store
            .accepted
            .update(uid, |ent| {
                ent.access_level = level;
                Ok(())
            })
            .await?;

        tracing::info!(%uid, subject = %amended.subject, %level, "entitlement amended");

        if !amended.is_discoverable() {
            let subject = amended.subject.to_string();
            self.metadata_client
                .remove_from_catalog(&subject)
                .await
                .map_err(|e| {
                    tracing::warn!(%subject, error = %e, "failed to remove subject from catalog");
                    Error::RemoteCall(format!("failed to remove {subject} from catalog: {e}"))
                })?;
        }

        Ok(amended)
    }

    /// Revoke an accepted entitlement
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no accepted entitlement with this UID
    pub async fn revoke(&self, uid: &str) -> Result<Entitlement> {
        let mut ent = self
            .store
            .accepted
            .delete(uid)
            .await
            .ok_or_else(|| Error::NotFound(format!("accepted entitlement {uid}")))?;
        ent.status = Status::Revoked;
        self.store.revoked.add(ent.clone()).await;

        tracing::info!(%uid, subject = %ent.subject, "entitlement revoked");
        Ok(ent)
    }

    async fn take_request(&self, uid: &str) -> Result<Entitlement> {
        self.store
            .requested
            .delete(uid)
            .await
            .ok_or_else(|| Error::NotFound(format!("requested entitlement {uid}")))
    }
}
