use axum::http::{Method, StatusCode};
use axum::Router;

use super::http::call;

pub const PASSWORD: &str = "Passw0rd!";

pub struct Registered {
    pub token: String,
    pub user_id: String,
    pub email: String,
}

pub async fn register_user(app: &Router) -> Registered {
    let email = format!("user-{}@test.com", uuid::Uuid::new_v4().simple());
    let (status, body) = call(
        app,
        Method::POST,
        "/api/auth/register",
        Some(serde_json::json!({
            "firstName": "Ada",
            "lastName": "Lovelace",
            "email": email,
            "password": PASSWORD,
        })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");

    Registered {
        token: body["data"]["token"].as_str().expect("token").to_string(),
        user_id: body["data"]["user"]["id"].as_str().expect("user id").to_string(),
        email,
    }
}

pub async fn login(app: &Router, email: &str, password: &str) -> (StatusCode, serde_json::Value) {
    call(
        app,
        Method::POST,
        "/api/auth/login",
        Some(serde_json::json!({"email": email, "password": password})),
        None,
    )
    .await
}

/// Bootstraps the first admin and returns its token.
pub async fn setup_admin(app: &Router) -> Registered {
    let email = format!("admin-{}@test.com", uuid::Uuid::new_v4().simple());
    let (status, body) = call(
        app,
        Method::POST,
        "/api/admin/setup",
        Some(serde_json::json!({
            "firstName": "Grace",
            "lastName": "Hopper",
            "email": email,
            "password": "AdminPassw0rd",
        })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "admin setup failed: {body}");

    Registered {
        token: body["data"]["token"].as_str().expect("token").to_string(),
        user_id: body["data"]["user"]["id"].as_str().expect("user id").to_string(),
        email,
    }
}
