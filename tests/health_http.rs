mod common;

use axum::http::{Method, StatusCode};

use common::app::spawn_test_app;
use common::http::{assert_json_error, request, response_json};

#[tokio::test]
async fn health_endpoints_respond() {
    let app = spawn_test_app().await;

    for path in ["/health", "/health/live", "/health/ready", "/health/database"] {
        let resp = request(&app.app, Method::GET, path, None, &[]).await;
        let (status, _, _) = response_json(resp).await;
        assert_eq!(status, StatusCode::OK, "{path}");
    }

    let resp = request(&app.app, Method::GET, "/health/database", None, &[]).await;
    let (_, _, body) = response_json(resp).await;
    assert_eq!(body["healthy"], true);
    assert_eq!(body["documents"]["healthy"], true);
}

#[tokio::test]
async fn unknown_routes_get_json_404_with_trace_id() {
    let app = spawn_test_app().await;

    let resp = request(
        &app.app,
        Method::GET,
        "/api/does-not-exist",
        None,
        &[("x-request-id", "req-42".to_string())],
    )
    .await;
    let (status, headers, body) = response_json(resp).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(headers["x-request-id"], "req-42");
    assert_json_error(&body, "NOT_FOUND");
    assert_eq!(body["traceId"], "req-42");
}
