//! Storage service endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    routing::get,
};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::{ApiError, StorageState, api_error};
use crate::clients::StoredValue;
use crate::db::TimeSeries;
use crate::{Error, Result};

/// How far back a read reaches when no `from` is given
const DEFAULT_WINDOW: TimeDelta = TimeDelta::hours(24);

#[derive(Deserialize)]
pub struct AppendRequest {
    pub bucket: String,
    pub value: Value,
}

#[derive(Deserialize)]
pub struct RangeQuery {
    #[serde(rename = "bucket-uid")]
    pub bucket_uid: String,
    pub from: Option<String>,
    pub to: Option<String>,
}

fn series(state: &StorageState, bucket: &str) -> Result<TimeSeries> {
    if bucket.is_empty() {
        return Err(Error::Validation("bucket must not be empty".to_string()));
    }
    TimeSeries::new(state.db.clone(), bucket, state.timestep, state.expiration)
}

fn parse_time(name: &str, value: Option<&str>, default: DateTime<Utc>) -> Result<DateTime<Utc>> {
    value.map_or(Ok(default), |s| {
        DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| Error::Validation(format!("invalid {name} timestamp {s}: {e}")))
    })
}

/// Append a value to a bucket, timestamped now
async fn append(
    State(state): State<Arc<StorageState>>,
    Json(req): Json<AppendRequest>,
) -> std::result::Result<(StatusCode, Json<StoredValue>), ApiError> {
    let now = Utc::now();
    let stored = StoredValue {
        value: req.value,
        timestamp: now,
    };

    series(&state, &req.bucket)
        .and_then(|s| s.add(&stored, now))
        .map_err(|e| api_error(&e))?;

    tracing::trace!(bucket = %req.bucket, "value appended");
    Ok((StatusCode::CREATED, Json(stored)))
}

/// Values in a bucket between `from` and `to`
async fn fetch(
    State(state): State<Arc<StorageState>>,
    Query(query): Query<RangeQuery>,
) -> std::result::Result<Json<Vec<StoredValue>>, ApiError> {
    let now = Utc::now();
    let to = parse_time("to", query.to.as_deref(), now).map_err(|e| api_error(&e))?;
    let from = parse_time("from", query.from.as_deref(), now - DEFAULT_WINDOW)
        .map_err(|e| api_error(&e))?;

    let values = series(&state, &query.bucket_uid)
        .and_then(|s| s.fetch_range(from, to))
        .map_err(|e| api_error(&e))?;
    Ok(Json(values))
}

/// Build storage router
pub fn router(state: Arc<StorageState>) -> Router {
    Router::new()
        .route("/data/", get(fetch).put(append))
        .with_state(state)
}
