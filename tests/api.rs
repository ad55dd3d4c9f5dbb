//! API endpoint integration tests

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use iot_node::api::{ApiServer, ApiState, StorageServer, StorageState};
use iot_node::{AccessLevel, Entitlement, Metadata, Status, Subject};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

mod common;
use common::{TestNode, setup_test_db};

/// Build a node API router backed by recording mocks
fn build_node_router(node: &TestNode, cancel: CancellationToken) -> axum::Router {
    let state = ApiState {
        entitlements: node.entitlement_manager(),
        data: node.data_access(),
        devices: Arc::new(node.device_registry(cancel)),
    };
    ApiServer::new(state, "127.0.0.1:0").router()
}

/// Build a storage API router over an in-memory database
fn build_storage_router() -> axum::Router {
    let state = StorageState {
        db: setup_test_db(),
        timestep: Duration::from_secs(1),
        expiration: Duration::ZERO,
    };
    StorageServer::new(state, "127.0.0.1:0").router()
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

async fn bind_device(node: &TestNode, uid: &str, level: AccessLevel) {
    let root = Subject::root_of(uid).unwrap();
    node.entitlements
        .accepted
        .add(Entitlement::new(root.clone(), level, Status::Accepted))
        .await;
    node.metadata
        .add(Metadata {
            path: root.to_string(),
            subject: root,
            name: "Jolly Heron".to_string(),
            description: "garden sensor".to_string(),
        })
        .await;
}

#[tokio::test]
async fn test_health_endpoint() {
    let node = TestNode::new();
    let app = build_node_router(&node, CancellationToken::new());

    let (status, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_entitlement_request_lifecycle() {
    let node = TestNode::new();
    let app = build_node_router(&node, CancellationToken::new());

    let (status, json) = send(
        &app,
        "PUT",
        "/entitlements/requests/",
        Some(json!({"subject": "data://dev1/temp", "level": "can-access"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["status"], "requested");
    assert_eq!(json["level"], "can-access");
    let uid = json["uid"].as_str().unwrap().to_string();

    let (status, json) = send(&app, "GET", "/entitlements/requests/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);

    let (status, json) = send(&app, "GET", &format!("/entitlements/requests/{uid}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["subject"], "data://dev1/temp");

    let (status, json) = send(
        &app,
        "POST",
        &format!("/entitlements/requests/{uid}/accept"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "accepted");

    let (_, json) = send(&app, "GET", "/entitlements/requests/", None).await;
    assert!(json.as_array().unwrap().is_empty());

    let (status, json) = send(
        &app,
        "GET",
        "/entitlements/accepted/?subject=data://dev1/temp",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["uid"], uid);

    let (status, json) = send(
        &app,
        "POST",
        &format!("/entitlements/accepted/{uid}"),
        Some(json!({"level": "owner-only"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["level"], "owner-only");
    assert_eq!(node.metadata_client.removed().await, ["data://dev1/temp"]);

    let (status, json) = send(
        &app,
        "POST",
        &format!("/entitlements/accepted/{uid}/revoke"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "revoked");

    let (_, json) = send(&app, "GET", "/entitlements/accepted/", None).await;
    assert!(json.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_declined_and_withdrawn_requests() {
    let node = TestNode::new();
    let app = build_node_router(&node, CancellationToken::new());

    let mut uids = Vec::new();
    for subject in ["data://dev1", "data://dev2"] {
        let (_, json) = send(
            &app,
            "PUT",
            "/entitlements/requests/",
            Some(json!({"subject": subject, "level": "can-discover"})),
        )
        .await;
        uids.push(json["uid"].as_str().unwrap().to_string());
    }

    let (status, json) = send(
        &app,
        "POST",
        &format!("/entitlements/requests/{}/decline", uids[0]),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "declined");

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/entitlements/requests/{}", uids[1]),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, json) = send(&app, "GET", "/entitlements/requests/", None).await;
    assert!(json.as_array().unwrap().is_empty());
    assert!(node.entitlements.accepted.is_empty().await);
}

#[tokio::test]
async fn test_repeated_request_replaces_pending_one() {
    let node = TestNode::new();
    let app = build_node_router(&node, CancellationToken::new());

    let mut uids = Vec::new();
    for level in ["can-discover", "can-access"] {
        let (_, json) = send(
            &app,
            "PUT",
            "/entitlements/requests/",
            Some(json!({"subject": "data://dev1", "level": level})),
        )
        .await;
        uids.push(json["uid"].as_str().unwrap().to_string());
    }
    assert_eq!(uids[0], uids[1]);

    let (_, json) = send(&app, "GET", "/entitlements/requests/", None).await;
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["level"], "can-access");
}

#[tokio::test]
async fn test_entitlement_errors() {
    let node = TestNode::new();
    let app = build_node_router(&node, CancellationToken::new());

    let (status, json) = send(
        &app,
        "PUT",
        "/entitlements/requests/",
        Some(json!({"subject": "dev1/temp", "level": "can-access"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "malformed_address");

    let (status, json) = send(
        &app,
        "PUT",
        "/entitlements/requests/",
        Some(json!({"subject": "data://dev1", "level": "everything"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "validation_error");

    let (status, json) = send(&app, "POST", "/entitlements/requests/nope/accept", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "not_found");

    let (status, _) = send(&app, "POST", "/entitlements/accepted/nope/revoke", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_device_registration() {
    let node = TestNode::new();
    let cancel = CancellationToken::new();
    let app = build_node_router(&node, cancel.clone());

    let (status, json) = send(&app, "POST", "/devices/", Some(json!({"type": "fake-sine"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["type"], "fake-sine");
    let uid = json["uid"].as_str().unwrap().to_string();

    let (status, json) = send(&app, "GET", "/devices/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json[0]["uid"], uid);

    let (status, json) = send(
        &app,
        "GET",
        &format!("/entitlements/accepted/?subject=data://{uid}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json[0]["level"], "owner-only");

    let (status, _) = send(&app, "POST", "/devices/", Some(json!({"type": "toaster"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    cancel.cancel();
}

#[tokio::test]
async fn test_data_access_follows_policy() {
    let node = TestNode::new();
    bind_device(&node, "open", AccessLevel::CanAccess).await;
    bind_device(&node, "shy", AccessLevel::CanDiscover).await;
    let app = build_node_router(&node, CancellationToken::new());

    node.pipeline
        .route(&common::reading("open", json!({"temp": 19.5})))
        .await;

    let (status, json) = send(&app, "POST", "/data/", Some(json!({"key": "data://open/temp"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"][0]["value"], 19.5);
    assert_eq!(json["metadata"]["description"], "garden sensor");

    let (status, json) = send(&app, "POST", "/data/", Some(json!({"key": "data://shy/temp"}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"]["code"], "access_denied");

    let (status, _) = send(&app, "POST", "/data/", Some(json!({"key": "open/temp"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metadata_listing_hides_owner_only_devices() {
    let node = TestNode::new();
    bind_device(&node, "public", AccessLevel::CanDiscover).await;
    bind_device(&node, "private", AccessLevel::OwnerOnly).await;
    let app = build_node_router(&node, CancellationToken::new());

    let (status, json) = send(&app, "GET", "/data/meta", None).await;
    assert_eq!(status, StatusCode::OK);
    let subjects: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m["subject"].as_str())
        .collect();
    assert_eq!(subjects, ["data://public"]);
}

#[tokio::test]
async fn test_storage_append_and_fetch() {
    let app = build_storage_router();

    for value in [json!(1), json!(2), json!({"temp": 3})] {
        let (status, json) = send(
            &app,
            "PUT",
            "/data/",
            Some(json!({"bucket": "data://dev1/temp", "value": value})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["value"], value);
        assert!(json["ts"].is_string());
    }

    let (status, json) = send(&app, "GET", "/data/?bucket-uid=data://dev1/temp", None).await;
    assert_eq!(status, StatusCode::OK);
    let values: Vec<Value> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["value"].clone())
        .collect();
    assert_eq!(values, [json!(1), json!(2), json!({"temp": 3})]);

    let (status, json) = send(&app, "GET", "/data/?bucket-uid=data://other", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_storage_rejects_bad_requests() {
    let app = build_storage_router();

    let (status, _) = send(
        &app,
        "PUT",
        "/data/",
        Some(json!({"bucket": "", "value": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = send(
        &app,
        "GET",
        "/data/?bucket-uid=b&from=yesterday",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "validation_error");

    let (status, json) = send(
        &app,
        "GET",
        "/data/?bucket-uid=b&from=2024-01-02T00:00:00Z&to=2024-01-01T00:00:00Z",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "invalid_range");
}

#[tokio::test]
async fn test_storage_ready_endpoint() {
    let app = build_storage_router();

    let (status, json) = send(&app, "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}
