//! Integration tests for the overlay HTTP endpoints

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt; // for .collect().await
use krusty_overlay::view::{OverlayView, StatusSink, WatchSink};
use krusty_overlay::web::create_router;
use serde_json::Value;
use tower::util::ServiceExt; // for `oneshot`

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_status_reflects_latest_view() {
    let (sink, rx) = WatchSink::new(OverlayView::new("Voron"));
    let app = create_router(rx);

    let (status, body) = get_json(app.clone(), "/api/v1/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["printer_name"], "Voron");
    assert_eq!(body["progress"], "0%");
    assert_eq!(body["updated_at"], Value::Null);

    let mut view = OverlayView::new("Voron");
    view.status = "Printing".to_string();
    view.progress = "42%".to_string();
    sink.publish(&view);

    let (_, body) = get_json(app, "/api/v1/status").await;
    assert_eq!(body["status"], "Printing");
    assert_eq!(body["progress"], "42%");
}

#[tokio::test]
async fn test_health_reports_poll_errors() {
    let (sink, rx) = WatchSink::new(OverlayView::new("Voron"));
    let app = create_router(rx);

    let (status, body) = get_json(app.clone(), "/api/v1/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let mut view = OverlayView::new("Voron");
    view.error = true;
    view.status = "Unreachable: 10.0.0.5".to_string();
    sink.publish(&view);

    let (_, body) = get_json(app, "/api/v1/health").await;
    assert_eq!(body["ok"], false);
    assert_eq!(body["status"], "Unreachable: 10.0.0.5");
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (_sink, rx) = WatchSink::new(OverlayView::new("Voron"));
    let response = create_router(rx)
        .oneshot(Request::builder().uri("/api/v1/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
