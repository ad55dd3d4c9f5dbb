//! Device registration endpoints

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use serde::Deserialize;

use super::{ApiError, ApiState, api_error};
use crate::devices::Device;

#[derive(Deserialize)]
pub struct DeviceRequest {
    /// Device type, e.g. `fake-sine`
    #[serde(rename = "type")]
    pub kind: String,
}

/// Register a device and start its sensor
async fn register_device(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<DeviceRequest>,
) -> Result<Json<Device>, ApiError> {
    let device = state
        .devices
        .register(&req.kind)
        .await
        .map_err(|e| api_error(&e))?;
    Ok(Json(device))
}

/// List registered devices
async fn list_devices(State(state): State<Arc<ApiState>>) -> Json<Vec<Device>> {
    Json(state.devices.all().await)
}

/// Build devices router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/devices/", get(list_devices).post(register_device))
        .with_state(state)
}
