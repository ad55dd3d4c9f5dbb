//! Data access endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::Deserialize;

use super::{ApiError, ApiState, api_error};
use crate::data::DataResponse;
use crate::metadata::Metadata;

#[derive(Deserialize)]
pub struct DataRequest {
    /// Subject of the data, e.g. `data://<device>/temp`
    pub key: String,
}

/// Stored values for an accessible subject
async fn get_data(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<DataRequest>,
) -> Result<Json<DataResponse>, ApiError> {
    let resp = state
        .data
        .get_data(&req.key)
        .await
        .map_err(|e| api_error(&e))?;
    Ok(Json(resp))
}

/// Metadata visible to discovery
async fn visible_metadata(State(state): State<Arc<ApiState>>) -> Json<Vec<Metadata>> {
    Json(state.data.visible_metadata().await)
}

/// Build data router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/data/", post(get_data))
        .route("/data/meta", get(visible_metadata))
        .with_state(state)
}
