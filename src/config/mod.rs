//! Configuration management for the node and storage services
//!
//! Every setting resolves as environment variable, then TOML file, then
//! built-in default.

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use file::NodeConfigFile;

/// Full configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub node: NodeConfig,
    pub storage: StorageConfig,
}

/// Data node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Address the node API listens on
    pub bind: String,

    /// URL the node is reachable at, announced to the metadata service
    pub public_url: String,

    /// Base URL of the metadata service
    pub metadata_url: String,

    /// Base URL of the storage service
    pub storage_url: String,

    /// Time between readings of each simulated sensor
    pub sensor_interval: Duration,

    /// Capacity of the sensor channel
    pub channel_capacity: usize,
}

/// Storage service configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Address the storage API listens on
    pub bind: String,

    /// Path to the `SQLite` database
    pub database: PathBuf,

    /// Width of a time bucket
    pub timestep: Duration,

    /// Bucket lifetime (zero keeps buckets forever)
    pub expiration: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            public_url: "http://localhost:8080".to_string(),
            metadata_url: "http://localhost:8081".to_string(),
            storage_url: "http://localhost:8083".to_string(),
            sensor_interval: Duration::from_secs(10),
            channel_capacity: 64,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8083".to_string(),
            database: default_database_path(),
            timestep: Duration::from_secs(1),
            expiration: Duration::ZERO,
        }
    }
}

/// Default database location: `<data_dir>/iot-node/storage.db`
#[must_use]
pub fn default_database_path() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".local/share/iot-node/storage.db"),
        |d| d.data_dir().join("iot-node").join("storage.db"),
    )
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// `config_path` overrides the default file location.
    #[must_use]
    pub fn load(config_path: Option<&Path>) -> Self {
        let fc = file::load_config_file(config_path);
        Self::resolve(fc, |key| std::env::var(key).ok())
    }

    /// Layer `env` over the file overlay over defaults
    #[must_use]
    pub fn resolve(fc: NodeConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let node_defaults = NodeConfig::default();
        let storage_defaults = StorageConfig::default();

        let node = NodeConfig {
            bind: env("IOT_NODE_BIND")
                .or(fc.node.bind)
                .unwrap_or(node_defaults.bind),
            public_url: env("IOT_NODE_PUBLIC_URL")
                .or(fc.node.public_url)
                .unwrap_or(node_defaults.public_url),
            metadata_url: env("IOT_NODE_METADATA_URL")
                .or(fc.node.metadata_url)
                .unwrap_or(node_defaults.metadata_url),
            storage_url: env("IOT_NODE_STORAGE_URL")
                .or(fc.node.storage_url)
                .unwrap_or(node_defaults.storage_url),
            sensor_interval: env("IOT_NODE_SENSOR_INTERVAL_SECS")
                .and_then(|s| s.parse().ok())
                .or(fc.node.sensor_interval_secs)
                .map_or(node_defaults.sensor_interval, Duration::from_secs),
            channel_capacity: fc
                .node
                .channel_capacity
                .unwrap_or(node_defaults.channel_capacity),
        };

        let storage = StorageConfig {
            bind: env("IOT_STORAGE_BIND")
                .or(fc.storage.bind)
                .unwrap_or(storage_defaults.bind),
            database: env("IOT_STORAGE_DB")
                .map(PathBuf::from)
                .or(fc.storage.database)
                .unwrap_or(storage_defaults.database),
            timestep: env("IOT_STORAGE_TIMESTEP_MS")
                .and_then(|s| s.parse().ok())
                .or(fc.storage.timestep_ms)
                .map_or(storage_defaults.timestep, Duration::from_millis),
            expiration: env("IOT_STORAGE_EXPIRATION_SECS")
                .and_then(|s| s.parse().ok())
                .or(fc.storage.expiration_secs)
                .map_or(storage_defaults.expiration, Duration::from_secs),
        };

        Self { node, storage }
    }
}
