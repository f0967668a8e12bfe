mod common;

use axum::http::{Method, StatusCode};

use common::app::spawn_test_app;
use common::auth::register_user;
use common::fixtures::seed_topic;
use common::http::{assert_json_error, call};

#[tokio::test]
async fn profile_names_can_be_updated() {
    let app = spawn_test_app().await;
    let user = register_user(&app.app).await;

    let (status, body) = call(
        &app.app,
        Method::PUT,
        "/api/users/me",
        Some(serde_json::json!({"firstName": "  Augusta "})),
        Some(&user.token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["firstName"], "Augusta");
    assert_eq!(body["data"]["lastName"], "Lovelace");

    let (status, body) = call(
        &app.app,
        Method::PUT,
        "/api/users/me",
        Some(serde_json::json!({"lastName": "L0velace"})),
        Some(&user.token),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_json_error(&body, "VALIDATION_ERROR");
}

#[tokio::test]
async fn interests_are_deduplicated() {
    let app = spawn_test_app().await;
    let user = register_user(&app.app).await;
    seed_topic(&app.store, "t-rust", "Rust");
    seed_topic(&app.store, "t-sql", "SQL");

    let (status, body) = call(
        &app.app,
        Method::PUT,
        "/api/users/me/interests",
        Some(serde_json::json!({"topicIds": ["t-rust"]})),
        Some(&user.token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["added"], 1);

    let (_, body) = call(
        &app.app,
        Method::PUT,
        "/api/users/me/interests",
        Some(serde_json::json!({"topicIds": ["t-rust", "t-sql"]})),
        Some(&user.token),
    )
    .await;
    assert_eq!(body["data"]["added"], 1);
    assert_eq!(body["data"]["topicIds"].as_array().unwrap().len(), 2);

    let (_, body) = call(&app.app, Method::GET, "/api/users/me/interests", None, Some(&user.token)).await;
    let mut titles: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["title"].as_str().unwrap())
        .collect();
    titles.sort();
    assert_eq!(titles, vec!["Rust", "SQL"]);
}

#[tokio::test]
async fn interests_reject_unknown_or_empty_topics() {
    let app = spawn_test_app().await;
    let user = register_user(&app.app).await;
    seed_topic(&app.store, "t-rust", "Rust");

    let (status, _) = call(
        &app.app,
        Method::PUT,
        "/api/users/me/interests",
        Some(serde_json::json!({"topicIds": ["t-rust", "t-missing"]})),
        Some(&user.token),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(app.store.interest_topic_ids(&user.user_id).unwrap().is_empty());

    let (status, body) = call(
        &app.app,
        Method::PUT,
        "/api/users/me/interests",
        Some(serde_json::json!({"topicIds": []})),
        Some(&user.token),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_json_error(&body, "VALIDATION_ERROR");
}
