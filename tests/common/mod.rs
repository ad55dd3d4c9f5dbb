//! Shared test utilities

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use iot_node::data::DataAccess;
use iot_node::devices::DeviceRegistry;
use iot_node::graph::ContextExpander;
use iot_node::sensors::SensorMessage;
use iot_node::{
    CatalogRequest, DbPool, DeviceManager, EntitlementManager, EntitlementStore, Error,
    MetadataClient, MetadataStore, StorageClient, StoredValue, db,
};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Set up an in-memory test database
#[must_use]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// Metadata client that records every call
#[derive(Default)]
pub struct MockMetadata {
    pub catalogued: Mutex<Vec<CatalogRequest>>,
    pub removed: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

impl MockMetadata {
    pub fn failing() -> Self {
        let mock = Self::default();
        mock.fail.store(true, Ordering::SeqCst);
        mock
    }

    pub async fn catalogued(&self) -> Vec<CatalogRequest> {
        self.catalogued.lock().await.clone()
    }

    pub async fn removed(&self) -> Vec<String> {
        self.removed.lock().await.clone()
    }

    fn check(&self) -> iot_node::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::RemoteCall("metadata service unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataClient for MockMetadata {
    async fn register_location(&self, _ip: &str, _port: u16) -> iot_node::Result<String> {
        self.check()?;
        Ok("test-location".to_string())
    }

    async fn catalog_item(
        &self,
        _location_token: &str,
        request: &CatalogRequest,
    ) -> iot_node::Result<()> {
        self.check()?;
        self.catalogued.lock().await.push(request.clone());
        Ok(())
    }

    async fn remove_from_catalog(&self, subject: &str) -> iot_node::Result<()> {
        self.check()?;
        self.removed.lock().await.push(subject.to_string());
        Ok(())
    }
}

/// Storage client that keeps appended values in memory
#[derive(Default)]
pub struct MockStorage {
    pub appended: Mutex<Vec<(String, Value)>>,
}

impl MockStorage {
    pub async fn appended(&self) -> Vec<(String, Value)> {
        self.appended.lock().await.clone()
    }
}

#[async_trait]
impl StorageClient for MockStorage {
    async fn append(&self, bucket: &str, value: &Value) -> iot_node::Result<()> {
        self.appended
            .lock()
            .await
            .push((bucket.to_string(), value.clone()));
        Ok(())
    }

    async fn get_all(&self, bucket: &str) -> iot_node::Result<Vec<StoredValue>> {
        Ok(self
            .appended
            .lock()
            .await
            .iter()
            .filter(|(b, _)| b == bucket)
            .map(|(_, value)| StoredValue {
                value: value.clone(),
                timestamp: Utc::now(),
            })
            .collect())
    }
}

/// Node components wired to recording mocks
pub struct TestNode {
    pub entitlements: Arc<EntitlementStore>,
    pub metadata: Arc<MetadataStore>,
    pub metadata_client: Arc<MockMetadata>,
    pub storage_client: Arc<MockStorage>,
    pub pipeline: DeviceManager,
}

impl TestNode {
    pub fn new() -> Self {
        Self::with_metadata_client(MockMetadata::default())
    }

    pub fn with_metadata_client(metadata_client: MockMetadata) -> Self {
        let entitlements = Arc::new(EntitlementStore::new());
        let metadata = Arc::new(MetadataStore::new());
        let metadata_client = Arc::new(metadata_client);
        let storage_client = Arc::new(MockStorage::default());

        let pipeline = DeviceManager::new(
            Arc::clone(&entitlements),
            Arc::clone(&metadata),
            Arc::clone(&metadata_client) as Arc<dyn MetadataClient>,
            Arc::clone(&storage_client) as Arc<dyn StorageClient>,
            Arc::new(ContextExpander::new()),
            "test-location".to_string(),
            16,
        );

        Self {
            entitlements,
            metadata,
            metadata_client,
            storage_client,
            pipeline,
        }
    }

    pub fn entitlement_manager(&self) -> EntitlementManager {
        EntitlementManager::new(
            Arc::clone(&self.entitlements),
            Arc::clone(&self.metadata_client) as Arc<dyn MetadataClient>,
        )
    }

    pub fn data_access(&self) -> DataAccess {
        DataAccess::new(
            Arc::clone(&self.entitlements),
            Arc::clone(&self.metadata),
            Arc::clone(&self.storage_client) as Arc<dyn StorageClient>,
        )
    }

    /// Registry whose producers tick slowly enough not to interfere
    pub fn device_registry(&self, cancel: CancellationToken) -> DeviceRegistry {
        DeviceRegistry::new(
            Arc::clone(&self.entitlements),
            Arc::clone(&self.metadata),
            self.pipeline.sender(),
            Duration::from_secs(3600),
            cancel,
        )
    }
}

/// A reading from the temperature/humidity schema
pub fn reading(sensor_uid: &str, data: Value) -> SensorMessage {
    SensorMessage {
        sensor_uid: sensor_uid.to_string(),
        data: data.as_object().cloned().unwrap_or_default(),
        schema: serde_json::json!({
            "@context": {
                "m3-lite": "http://purl.org/iot/vocab/m3-lite#",
                "temp": "m3-lite:AirTemperature",
                "hum": "m3-lite:AirHumidity"
            },
            "@type": "m3-lite:Sensor"
        }),
    }
}
