//! HTTP API servers for the node and the storage service

pub mod data;
pub mod devices;
pub mod entitlements;
pub mod health;
pub mod storage;

use std::sync::Arc;
use std::time::Duration;

use axum::{Json, Router, http::StatusCode};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::data::DataAccess;
use crate::db::DbPool;
use crate::devices::DeviceRegistry;
use crate::entitlements::EntitlementManager;
use crate::{Error, Result};

/// Shared state for node API handlers
#[derive(Clone)]
pub struct ApiState {
    pub entitlements: EntitlementManager,
    pub data: DataAccess,
    pub devices: Arc<DeviceRegistry>,
}

/// Shared state for storage API handlers
#[derive(Clone)]
pub struct StorageState {
    pub db: DbPool,
    /// Width of a time bucket
    pub timestep: Duration,
    /// Bucket lifetime (zero keeps buckets forever)
    pub expiration: Duration,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// Error half of every handler result
pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(code: &str, message: &str) -> Json<ErrorResponse> {
    Json(ErrorResponse {
        error: ErrorDetail {
            code: code.to_string(),
            message: message.to_string(),
        },
    })
}

/// Map a crate error onto a status code and error body
pub(crate) fn api_error(e: &Error) -> ApiError {
    let (status, code) = match e {
        Error::MalformedAddress(_) => (StatusCode::BAD_REQUEST, "malformed_address"),
        Error::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
        Error::InvalidRange(_) => (StatusCode::BAD_REQUEST, "invalid_range"),
        Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        Error::AccessDenied(_) => (StatusCode::FORBIDDEN, "access_denied"),
        Error::RemoteCall(_) | Error::Http(_) => (StatusCode::INTERNAL_SERVER_ERROR, "remote_error"),
        Error::Database(_) | Error::Sqlite(_) => (StatusCode::INTERNAL_SERVER_ERROR, "db_error"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };

    if e.is_client_fault() {
        tracing::debug!(error = %e, %status, "request rejected");
    } else {
        tracing::error!(error = %e, %status, "request failed");
    }

    (status, error_response(code, &e.to_string()))
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Serve `router` on `bind` until `shutdown` fires
async fn serve(name: &str, bind: &str, router: Router, shutdown: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|e| Error::Config(format!("failed to bind {name} server to {bind}: {e}")))?;

    tracing::info!(%bind, "{name} server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| Error::Config(format!("{name} server error: {e}")))?;

    tracing::info!("{name} server stopped");
    Ok(())
}

/// Node API server
pub struct ApiServer {
    state: Arc<ApiState>,
    bind: String,
}

impl ApiServer {
    #[must_use]
    pub fn new(state: ApiState, bind: impl Into<String>) -> Self {
        Self {
            state: Arc::new(state),
            bind: bind.into(),
        }
    }

    /// Build the router with all routes
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .nest("/entitlements", entitlements::router(self.state.clone()))
            .merge(data::router(self.state.clone()))
            .merge(devices::router(self.state.clone()))
            .merge(health::router())
            .layer(cors())
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server until `shutdown` fires
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        serve("node API", &self.bind, self.router(), shutdown).await
    }
}

/// Storage service API server
pub struct StorageServer {
    state: Arc<StorageState>,
    bind: String,
}

impl StorageServer {
    #[must_use]
    pub fn new(state: StorageState, bind: impl Into<String>) -> Self {
        Self {
            state: Arc::new(state),
            bind: bind.into(),
        }
    }

    /// Build the router with all routes
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .merge(storage::router(self.state.clone()))
            .merge(health::router())
            .merge(health::ready_router(self.state.db.clone()))
            .layer(cors())
            .layer(TraceLayer::new_for_http())
    }

    /// Run the storage server until `shutdown` fires
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        serve("storage", &self.bind, self.router(), shutdown).await
    }
}
