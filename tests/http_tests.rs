use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use shifttrack::config::Config;
use shifttrack::handlers::{app_router, AppState};
use shifttrack::repo::{MemoryRepository, StaffDirectory};
use shifttrack::service::ShiftService;
use shifttrack::utils::time::{Clock, SystemClock};
use std::sync::Arc;
use tower::ServiceExt;

fn test_router() -> axum::Router {
    let config = Config::default();
    let repo = Arc::new(MemoryRepository::default());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let service = Arc::new(ShiftService::new(
        repo,
        StaffDirectory::default(),
        Arc::clone(&clock),
        &config,
    ));
    app_router(AppState {
        service,
        clock,
        default_timezone: config.default_timezone,
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Every reply carries the envelope, including a body that fails JSON
/// extraction
#[tokio::test]
async fn test_malformed_body_still_gets_the_envelope() {
    let response = test_router().oneshot(post_json("{not json")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert!(json["message"].as_str().unwrap().contains("Invalid request body"));
    assert!(json.get("serverTime").is_some());
    assert!(json.get("serverTimezone").is_some());
}

#[tokio::test]
async fn test_unknown_action_envelope() {
    let response = test_router()
        .oneshot(post_json(r#"{"action":"formatAllSheets"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], "Invalid action: formatAllSheets");
}

#[tokio::test]
async fn test_banner_and_health() {
    let response = test_router()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["message"], "Real-time shift tracking active");

    let response = test_router()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"OK");
}
