// SPDX-License-Identifier: Apache-2.0
// Copyright TRex Controller Authors

//! HTTP-boundary tests: Content-Type dispatch and status mapping.

mod common;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{harness, minimal_sriov_manifest};
use tower::ServiceExt;
use trex_mgmt::router;

fn post(uri: &str, content_type: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", content_type)
        .body(body.into())
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn app() -> (Router, common::Harness) {
    let h = harness();
    (router(h.reconciler.clone()), h)
}

#[tokio::test]
async fn health_answers_without_the_lock() {
    let (app, _h) = app();
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "OK");
}

#[tokio::test]
async fn apply_yaml_returns_the_status_line() {
    let (app, h) = app();
    let response = app
        .oneshot(post(
            "/apply",
            "application/yaml",
            minimal_sriov_manifest("t1"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.starts_with("Container t1 created and started with ID:"));
    assert!(h.engine.container_by_name("t1").unwrap().running);
}

#[tokio::test]
async fn apply_json_is_dispatched_by_content_type() {
    let (app, h) = app();
    let body = r#"{
        "kind": "TrexConfig",
        "metadata": {"name": "t2", "image": "trex:v3"},
        "spec": {
            "mgmtIP": "10.0.0.6/24",
            "mgmtGateway": "10.0.0.1",
            "parentInterface": "eno1",
            "port": [{"vfIndex": 1, "vlanId": 200}]
        }
    }"#;
    let response = app
        .oneshot(post("/apply", "application/json", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(h.engine.container_by_name("t2").unwrap().running);
}

#[tokio::test]
async fn undecodable_body_is_a_client_error() {
    let (app, h) = app();
    let response = app
        .oneshot(post("/apply", "application/json", "{not json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.engine.container_count(), 0);
}

#[tokio::test]
async fn validation_failure_is_a_client_error() {
    let (app, h) = app();
    // no mgmtIP
    let body = "metadata: {name: t1, image: trex:v3}\nspec: {port: [{vfIndex: 0}]}\n";
    let response = app
        .oneshot(post("/apply", "application/yaml", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_string(response).await;
    assert!(body.contains("spec.mgmtIP"), "body was: {body}");
    assert_eq!(h.engine.container_count(), 0);
}

#[tokio::test]
async fn host_failure_is_a_server_error() {
    let (app, h) = app();
    h.network.state.lock().unwrap().bridge_squatted = true;
    let response = app
        .oneshot(post(
            "/apply",
            "application/yaml",
            minimal_sriov_manifest("t1"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_string(response).await;
    assert!(body.contains("already exists but is not a bridge"));
}

#[tokio::test]
async fn delete_only_needs_the_name() {
    let (app, h) = app();
    h.reconciler
        .apply(common::minimal_sriov_spec("t1"))
        .await
        .unwrap();

    let response = app
        .oneshot(post(
            "/delete",
            "application/yaml",
            "metadata:\n  name: t1\n",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "Container t1 deleted");
    assert_eq!(h.engine.container_count(), 0);
}

#[tokio::test]
async fn delete_of_unknown_name_is_benign() {
    let (app, _h) = app();
    let response = app
        .oneshot(post(
            "/delete",
            "application/yaml",
            "metadata:\n  name: ghost\n",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "Container ghost not exist");
}

#[tokio::test]
async fn update_round_trips_through_delete_and_apply() {
    let (app, h) = app();
    h.reconciler
        .apply(common::minimal_sriov_spec("t1"))
        .await
        .unwrap();

    let manifest = minimal_sriov_manifest("t1").replace("trex:v3", "trex:v4");
    let response = app
        .oneshot(post("/update", "application/yaml", manifest))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(h.engine.container_by_name("t1").unwrap().image, "trex:v4");
}
