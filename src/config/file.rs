//! TOML configuration file loading
//!
//! Supports `~/.config/iot-node/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct NodeConfigFile {
    /// Data node settings
    #[serde(default)]
    pub node: NodeFileConfig,

    /// Storage service settings
    #[serde(default)]
    pub storage: StorageFileConfig,
}

/// `[node]` section
#[derive(Debug, Default, Deserialize)]
pub struct NodeFileConfig {
    /// Address the node API listens on (e.g. "0.0.0.0:8080")
    pub bind: Option<String>,

    /// URL the node is reachable at, announced to the metadata service
    pub public_url: Option<String>,

    /// Base URL of the metadata service
    pub metadata_url: Option<String>,

    /// Base URL of the storage service
    pub storage_url: Option<String>,

    /// Seconds between readings of each simulated sensor
    pub sensor_interval_secs: Option<u64>,

    /// Capacity of the sensor channel
    pub channel_capacity: Option<usize>,
}

/// `[storage]` section
#[derive(Debug, Default, Deserialize)]
pub struct StorageFileConfig {
    /// Address the storage API listens on (e.g. "0.0.0.0:8083")
    pub bind: Option<String>,

    /// Path to the `SQLite` database
    pub database: Option<PathBuf>,

    /// Width of a time bucket in milliseconds
    pub timestep_ms: Option<u64>,

    /// Bucket lifetime in seconds (0 keeps buckets forever)
    pub expiration_secs: Option<u64>,
}

/// Parse configuration file contents
///
/// # Errors
///
/// Returns `Toml` if the contents are not valid for the schema
pub fn parse_config_file(content: &str) -> Result<NodeConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Load the configuration file, falling back to defaults
///
/// Reads `path` when given, otherwise the default location. A missing or
/// unreadable file yields an empty overlay.
#[must_use]
pub fn load_config_file(path: Option<&Path>) -> NodeConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return NodeConfigFile::default();
    };

    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file");
        return NodeConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match parse_config_file(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                NodeConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            NodeConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/iot-node/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("iot-node").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_partial_file() {
        let fc = parse_config_file(
            r#"
            [node]
            public_url = "http://node.local:9000"
            sensor_interval_secs = 2

            [storage]
            timestep_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(fc.node.public_url.as_deref(), Some("http://node.local:9000"));
        assert_eq!(fc.node.sensor_interval_secs, Some(2));
        assert!(fc.node.bind.is_none());
        assert_eq!(fc.storage.timestep_ms, Some(500));
        assert!(fc.storage.database.is_none());
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        let fc = parse_config_file("").unwrap();
        assert!(fc.node.metadata_url.is_none());
        assert!(fc.storage.bind.is_none());
    }

    #[test]
    fn test_rejects_wrong_types() {
        assert!(parse_config_file("[node]\nchannel_capacity = \"lots\"").is_err());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let fc = load_config_file(Some(&dir.path().join("absent.toml")));
        assert!(fc.node.bind.is_none());
    }

    #[test]
    fn test_reads_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[storage]\nexpiration_secs = 3600\n").unwrap();

        let fc = load_config_file(Some(&path));
        assert_eq!(fc.storage.expiration_secs, Some(3600));
    }
}
