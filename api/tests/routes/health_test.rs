use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serial_test::serial;

use crate::helpers::{make_test_app, send};

#[tokio::test]
#[serial]
async fn health_check_is_public() {
    let (app, _db) = make_test_app().await;

    let req = Request::builder()
        .method("GET")
        .uri("/api/health")
        .body(Body::empty())
        .unwrap();

    let (status, json) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"], "OK");
}
