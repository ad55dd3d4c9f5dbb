//! Error types for the IoT node

use thiserror::Error;

/// Result type alias for node operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the node, the pipeline and the storage engine
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Address string could not be parsed or built
    #[error("malformed address: {0}")]
    MalformedAddress(String),

    /// Entitlement, metadata record or device not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Range query with `from` after `to`
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// Semantic-graph expansion failed
    #[error("expansion error: {0}")]
    Expansion(String),

    /// Metadata or storage service call failed
    #[error("remote call failed: {0}")]
    RemoteCall(String),

    /// Caller is not entitled to the requested data
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Request failed validation
    #[error("validation error: {0}")]
    Validation(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl Error {
    /// Whether the error was caused by the caller rather than the node
    #[must_use]
    pub const fn is_client_fault(&self) -> bool {
        matches!(
            self,
            Self::MalformedAddress(_)
                | Self::InvalidRange(_)
                | Self::Validation(_)
                | Self::NotFound(_)
                | Self::AccessDenied(_)
        )
    }
}
