//! Daemons - the long-running node and storage services
//!
//! The node daemon registers with the metadata service, runs the routing
//! pipeline and serves the node API. The storage daemon owns the time-series
//! database and serves the storage API.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiServer, ApiState, StorageServer, StorageState};
use crate::clients::{
    MetadataApi, MetadataClient, RetryPolicy, StorageApi, StorageClient, register_with_backoff,
};
use crate::config::{NodeConfig, StorageConfig};
use crate::data::DataAccess;
use crate::db::{self, DbPool};
use crate::devices::DeviceRegistry;
use crate::entitlements::{EntitlementManager, EntitlementStore};
use crate::graph::ContextExpander;
use crate::metadata::MetadataStore;
use crate::pipeline::DeviceManager;
use crate::{Error, Result};

/// How often expired buckets are purged
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// The data node - entitlements, routing pipeline and node API
pub struct NodeDaemon {
    config: NodeConfig,
    metadata_client: Arc<dyn MetadataClient>,
    storage_client: Arc<dyn StorageClient>,
    retry: RetryPolicy,
}

impl NodeDaemon {
    /// Create a node daemon talking to the configured remote services
    ///
    /// # Errors
    ///
    /// Returns `Config` if a service URL is invalid or the sensor interval
    /// is zero
    pub fn new(config: NodeConfig) -> Result<Self> {
        let metadata_client = Arc::new(MetadataApi::new(&config.metadata_url)?);
        let storage_client = Arc::new(StorageApi::new(&config.storage_url)?);
        Self::with_clients(config, metadata_client, storage_client)
    }

    /// Create a node daemon with explicit clients
    ///
    /// # Errors
    ///
    /// Returns `Config` if the sensor interval is zero
    pub fn with_clients(
        config: NodeConfig,
        metadata_client: Arc<dyn MetadataClient>,
        storage_client: Arc<dyn StorageClient>,
    ) -> Result<Self> {
        if config.sensor_interval.is_zero() {
            return Err(Error::Config("sensor interval must be greater than zero".to_string()));
        }

        Ok(Self {
            config,
            metadata_client,
            storage_client,
            retry: RetryPolicy::default(),
        })
    }

    /// Run until `shutdown` fires
    ///
    /// # Errors
    ///
    /// Returns error if the public URL is invalid or the API server fails
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        tracing::info!(
            public_url = %self.config.public_url,
            metadata_url = %self.config.metadata_url,
            "registering with metadata service"
        );

        let location_token = match register_with_backoff(
            self.metadata_client.as_ref(),
            &self.config.public_url,
            &self.retry,
            &shutdown,
        )
        .await
        {
            Ok(token) => token,
            Err(_) if shutdown.is_cancelled() => {
                tracing::info!("shutdown before registration completed");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let entitlements = Arc::new(EntitlementStore::new());
        let metadata = Arc::new(MetadataStore::new());

        let pipeline = DeviceManager::new(
            Arc::clone(&entitlements),
            Arc::clone(&metadata),
            Arc::clone(&self.metadata_client),
            Arc::clone(&self.storage_client),
            Arc::new(ContextExpander::new()),
            location_token,
            self.config.channel_capacity,
        );

        let devices = Arc::new(DeviceRegistry::new(
            Arc::clone(&entitlements),
            Arc::clone(&metadata),
            pipeline.sender(),
            self.config.sensor_interval,
            shutdown.child_token(),
        ));

        let pipeline_handle = tokio::spawn(pipeline.run(shutdown.child_token()));

        let state = ApiState {
            entitlements: EntitlementManager::new(
                Arc::clone(&entitlements),
                Arc::clone(&self.metadata_client),
            ),
            data: DataAccess::new(entitlements, metadata, Arc::clone(&self.storage_client)),
            devices,
        };

        let result = ApiServer::new(state, &self.config.bind)
            .run(shutdown.clone())
            .await;

        shutdown.cancel();
        if let Err(e) = pipeline_handle.await {
            tracing::error!(error = %e, "routing pipeline task failed");
        }

        result
    }
}

/// The storage service - time-series database and storage API
pub struct StorageDaemon {
    config: StorageConfig,
    db: DbPool,
}

impl StorageDaemon {
    /// Open the database and prepare the service
    ///
    /// # Errors
    ///
    /// Returns error if the timestep is zero or the database cannot be opened
    pub fn new(config: StorageConfig) -> Result<Self> {
        if config.timestep.is_zero() {
            return Err(Error::Config("storage timestep must be greater than zero".to_string()));
        }

        if let Some(parent) = config.database.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = db::init(&config.database)?;
        tracing::info!(path = %config.database.display(), "storage database opened");

        Ok(Self { config, db })
    }

    /// Run until `shutdown` fires
    ///
    /// # Errors
    ///
    /// Returns error if the API server fails to bind or run
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        if !self.config.expiration.is_zero() {
            tokio::spawn(purge_loop(self.db.clone(), shutdown.child_token()));
        }

        let state = StorageState {
            db: self.db,
            timestep: self.config.timestep,
            expiration: self.config.expiration,
        };

        StorageServer::new(state, &self.config.bind)
            .run(shutdown)
            .await
    }
}

async fn purge_loop(db: DbPool, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(PURGE_INTERVAL);
    // Skip the first immediate tick
    interval.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        match db::purge_expired(&db, Utc::now()) {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(removed, "purged expired buckets"),
            Err(e) => tracing::warn!(error = %e, "failed to purge expired buckets"),
        }
    }
}
