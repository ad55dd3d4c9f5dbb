//! Routing pipeline
//!
//! The [`DeviceManager`] is the single consumer of the sensor channel. For
//! every field of every message it resolves the governing entitlement,
//! announces discoverable fields to the metadata service, materializes
//! leaf-level policy and metadata the first time a field is seen, and
//! appends the value to storage.
//!
//! No field's failure escapes that field: remote errors are logged and the
//! loop moves on.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::clients::{CatalogRequest, MetadataClient, StorageClient};
use crate::entitlements::{Entitlement, EntitlementStore};
use crate::graph::{GraphExpander, tags_for_field};
use crate::metadata::{Metadata, MetadataStore};
use crate::sensors::SensorMessage;
use crate::subject::Subject;
use crate::Result;

/// Routes sensor readings according to entitlement policy
pub struct DeviceManager {
    router: Router,
    tx: mpsc::Sender<SensorMessage>,
    rx: mpsc::Receiver<SensorMessage>,
}

impl DeviceManager {
    /// Create a pipeline with a sensor channel of the given capacity
    #[must_use]
    pub fn new(
        entitlements: Arc<EntitlementStore>,
        metadata: Arc<MetadataStore>,
        metadata_client: Arc<dyn MetadataClient>,
        storage_client: Arc<dyn StorageClient>,
        expander: Arc<dyn GraphExpander>,
        location_token: String,
        capacity: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            router: Router {
                entitlements,
                metadata,
                metadata_client,
                storage_client,
                expander,
                location_token,
            },
            tx,
            rx,
        }
    }

    /// Handle for producers to send readings into the pipeline
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<SensorMessage> {
        self.tx.clone()
    }

    /// Consume readings until `cancel` fires or every sender is gone
    ///
    /// A message already being routed is finished before cancellation is
    /// observed.
    pub async fn run(self, cancel: CancellationToken) {
        let Self { router, tx, mut rx } = self;
        // Only producers keep the channel open from here on
        drop(tx);

        tracing::info!("routing pipeline started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let msg = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                msg = rx.recv() => msg,
            };
            let Some(msg) = msg else {
                break;
            };

            router.route(&msg).await;
        }

        tracing::info!("routing pipeline stopped");
    }

    /// Route one message without going through the channel
    pub async fn route(&self, msg: &SensorMessage) {
        self.router.route(msg).await;
    }
}

struct Router {
    entitlements: Arc<EntitlementStore>,
    metadata: Arc<MetadataStore>,
    metadata_client: Arc<dyn MetadataClient>,
    storage_client: Arc<dyn StorageClient>,
    expander: Arc<dyn GraphExpander>,
    location_token: String,
}

impl Router {
    async fn route(&self, msg: &SensorMessage) {
        for (key, value) in &msg.data {
            let subject = match Subject::build(msg.sensor_uid.as_str(), [key.as_str()]) {
                Ok(subject) => subject,
                Err(e) => {
                    tracing::warn!(sensor = %msg.sensor_uid, %key, error = %e, "skipping field with invalid address");
                    continue;
                }
            };

            self.route_field(&subject, &msg.schema, key, value).await;
        }
    }

    async fn route_field(&self, subject: &Subject, schema: &Value, key: &str, value: &Value) {
        let ent = self.entitlements.accepted.find_for_subject(subject).await;

        if let Some(ent) = ent.as_ref().filter(|e| e.is_discoverable()) {
            if let Err(e) = self.publish(subject, schema, key, value).await {
                tracing::warn!(%subject, level = %ent.access_level, error = %e, "failed to publish metadata");
            }
        }

        let Some(meta) = self.metadata.find_by_subject(subject).await else {
            tracing::debug!(%subject, "no metadata for subject or any ancestor, skipping");
            return;
        };

        if let Some(ent) = ent.filter(|e| e.subject.is_root()) {
            self.promote(subject, &meta, &ent).await;
        }

        match self.storage_client.append(&subject.to_string(), value).await {
            Ok(()) => tracing::trace!(%subject, "value stored"),
            Err(e) => tracing::warn!(%subject, error = %e, "failed to append value to storage"),
        }
    }

    async fn publish(&self, subject: &Subject, schema: &Value, key: &str, value: &Value) -> Result<()> {
        let tags = tags_for_field(self.expander.as_ref(), schema, key, value)?;
        let request = CatalogRequest {
            key: subject.to_string(),
            tags,
            sample: sample(value),
        };
        self.metadata_client
            .catalog_item(&self.location_token, &request)
            .await?;

        tracing::debug!(%subject, tags = request.tags.len(), "metadata published");
        Ok(())
    }

    /// Copy root-level policy and metadata down onto a newly seen leaf
    async fn promote(&self, subject: &Subject, meta: &Metadata, root: &Entitlement) {
        self.metadata.add(meta.rebind(subject)).await;

        let leaf = Entitlement::new(subject.clone(), root.access_level, root.status);
        let stored = self
            .entitlements
            .accepted
            .append_or_replace_on_subject(leaf)
            .await;

        tracing::info!(%subject, uid = %stored.uid, level = %stored.access_level, "promoted entitlement to new field");
    }
}

/// Render a value for the catalog sample
fn sample(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_sample_rendering() {
        assert_eq!(sample(&json!("on")), "on");
        assert_eq!(sample(&json!(21.5)), "21.5");
        assert_eq!(sample(&json!(40)), "40");
        assert_eq!(sample(&json!({"a": 1})), r#"{"a":1}"#);
    }
}
