//! Entitlement management endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;

use super::{ApiError, ApiState, api_error};
use crate::entitlements::{AccessLevel, Entitlement};

// --- Request types ---

#[derive(Deserialize)]
pub struct EntitlementRequest {
    pub subject: String,
    pub level: String,
}

#[derive(Deserialize)]
pub struct AmendRequest {
    pub level: String,
}

#[derive(Deserialize)]
pub struct AcceptedQuery {
    pub subject: Option<String>,
}

fn parse_level(level: &str) -> Result<AccessLevel, ApiError> {
    level.parse().map_err(|e| api_error(&e))
}

// --- Handlers ---

/// Request access to a subject
async fn request_entitlement(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<EntitlementRequest>,
) -> Result<(StatusCode, Json<Entitlement>), ApiError> {
    let level = parse_level(&req.level)?;
    let ent = state
        .entitlements
        .request(&req.subject, level)
        .await
        .map_err(|e| api_error(&e))?;
    Ok((StatusCode::CREATED, Json(ent)))
}

/// List pending requests
async fn list_requests(State(state): State<Arc<ApiState>>) -> Json<Vec<Entitlement>> {
    Json(state.entitlements.list_requests().await)
}

/// Get a pending request
async fn get_request(
    State(state): State<Arc<ApiState>>,
    Path(uid): Path<String>,
) -> Result<Json<Entitlement>, ApiError> {
    let ent = state
        .entitlements
        .find_request(&uid)
        .await
        .map_err(|e| api_error(&e))?;
    Ok(Json(ent))
}

/// Withdraw a pending request
async fn delete_request(
    State(state): State<Arc<ApiState>>,
    Path(uid): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .entitlements
        .delete_request(&uid)
        .await
        .map_err(|e| api_error(&e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Accept a pending request
async fn accept_request(
    State(state): State<Arc<ApiState>>,
    Path(uid): Path<String>,
) -> Result<Json<Entitlement>, ApiError> {
    let ent = state
        .entitlements
        .accept(&uid)
        .await
        .map_err(|e| api_error(&e))?;
    Ok(Json(ent))
}

/// Decline a pending request
async fn decline_request(
    State(state): State<Arc<ApiState>>,
    Path(uid): Path<String>,
) -> Result<Json<Entitlement>, ApiError> {
    let ent = state
        .entitlements
        .decline(&uid)
        .await
        .map_err(|e| api_error(&e))?;
    Ok(Json(ent))
}

/// List accepted entitlements, optionally for one subject
async fn list_accepted(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<AcceptedQuery>,
) -> Result<Json<Vec<Entitlement>>, ApiError> {
    let list = state
        .entitlements
        .list_accepted(query.subject.as_deref())
        .await
        .map_err(|e| api_error(&e))?;
    Ok(Json(list))
}

/// Change the access level of an accepted entitlement
async fn amend_accepted(
    State(state): State<Arc<ApiState>>,
    Path(uid): Path<String>,
    Json(req): Json<AmendRequest>,
) -> Result<Json<Entitlement>, ApiError> {
    let level = parse_level(&req.level)?;
    let ent = state
        .entitlements
        .amend(&uid, level)
        .await
        .map_err(|e| api_error(&e))?;
    Ok(Json(ent))
}

/// Revoke an accepted entitlement
async fn revoke_accepted(
    State(state): State<Arc<ApiState>>,
    Path(uid): Path<String>,
) -> Result<Json<Entitlement>, ApiError> {
    let ent = state
        .entitlements
        .revoke(&uid)
        .await
        .map_err(|e| api_error(&e))?;
    Ok(Json(ent))
}

/// Build entitlements router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/requests/", get(list_requests).put(request_entitlement))
        .route("/requests/{uid}", get(get_request).delete(delete_request))
        .route("/requests/{uid}/accept", post(accept_request))
        .route("/requests/{uid}/decline", post(decline_request))
        .route("/accepted/", get(list_accepted))
        .route("/accepted/{uid}", post(amend_accepted))
        .route("/accepted/{uid}/revoke", post(revoke_accepted))
        .with_state(state)
}
