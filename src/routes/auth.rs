use axum::extract::State;
use axum::http::{header::SET_COOKIE, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{
    dummy_password_hash, generate_reset_code, hash_password, hash_reset_code,
    issue_session_token, verify_password, AuthUser,
};
use crate::extractors::JsonBody;
use crate::response::{created, ok, AppError};
use crate::routes::users::UserProfile;
use crate::services::mailer::{mask_email_for_log, reset_code_message};
use crate::state::AppState;
use crate::store::operations::password_resets::{PasswordResetCode, ResetAttempt, ResetCodeStatus};
use crate::store::operations::users::{User, UserRole};
use crate::validation::{is_valid_email, normalize_email, validate_password, validate_person_name};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

/// Checks shared by self-registration and admin bootstrap.
pub(crate) fn validate_new_account(
    first_name: &str,
    last_name: &str,
    email: &str,
    password: &str,
) -> Result<(), AppError> {
    validate_person_name(first_name).map_err(|m| AppError::bad_request("VALIDATION_ERROR", m))?;
    validate_person_name(last_name).map_err(|m| AppError::bad_request("VALIDATION_ERROR", m))?;
    if !is_valid_email(email) {
        return Err(AppError::bad_request(
            "AUTH_INVALID_EMAIL",
            "Invalid email address",
        ));
    }
    validate_password(password).map_err(|m| AppError::bad_request("AUTH_WEAK_PASSWORD", m))
}

pub(crate) fn new_account(
    first_name: &str,
    last_name: &str,
    email: &str,
    password: &str,
    role: UserRole,
) -> Result<User, AppError> {
    let now = Utc::now();
    Ok(User {
        id: uuid::Uuid::new_v4().to_string(),
        first_name: first_name.trim().to_string(),
        last_name: last_name.trim().to_string(),
        email: email.to_string(),
        password_hash: hash_password(password)?,
        role,
        is_active: true,
        is_verified: false,
        created_at: now,
        updated_at: now,
    })
}

async fn register(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> Result<Response, AppError> {
    let email = normalize_email(&req.email);
    validate_new_account(&req.first_name, &req.last_name, &email, &req.password)?;

    let user = new_account(
        &req.first_name,
        &req.last_name,
        &email,
        &req.password,
        UserRole::User,
    )?;
    state.store().create_user(&user)?;
    tracing::info!(user_id = %user.id, email = %mask_email_for_log(&email), "User registered");

    let token = issue_session_token(&user.id, &state)?;
    let mut response = created(AuthResponse {
        token: token.clone(),
        user: UserProfile::from(&user),
    })
    .into_response();
    set_token_cookie(&mut response, &token)?;
    Ok(response)
}

async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<Response, AppError> {
    let email = normalize_email(&req.email);
    let Some(user) = state.store().get_user_by_email(&email)? else {
        let _ = verify_password(&req.password, dummy_password_hash());
        return Err(AppError::unauthorized("Invalid email or password"));
    };

    if !verify_password(&req.password, &user.password_hash)? {
        return Err(AppError::unauthorized("Invalid email or password"));
    }

    if !user.is_active {
        return Err(AppError::forbidden("Account is deactivated"));
    }

    let token = issue_session_token(&user.id, &state)?;
    let mut response = ok(AuthResponse {
        token: token.clone(),
        user: UserProfile::from(&user),
    })
    .into_response();
    set_token_cookie(&mut response, &token)?;
    Ok(response)
}

async fn logout(auth_user: AuthUser, State(state): State<AppState>) -> Result<Response, AppError> {
    let revoked = state.store().delete_user_sessions(&auth_user.user_id)?;
    tracing::info!(user_id = %auth_user.user_id, revoked, "User logged out");

    let mut response = ok(serde_json::json!({"loggedOut": true})).into_response();
    append_set_cookie(
        &mut response,
        "token=; Path=/; Max-Age=0; SameSite=Strict; HttpOnly; Secure",
    )?;
    Ok(response)
}

async fn forgot_password(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = normalize_email(&req.email);

    if let Some(user) = state
        .store()
        .get_user_by_email(&email)?
        .filter(|u| u.is_active)
    {
        let code = generate_reset_code(&mut rand::thread_rng());
        let ttl_minutes = state.config().mail.reset_code_ttl_minutes;
        let now = Utc::now();
        let replaced = state.store().replace_pending_reset_code(&PasswordResetCode {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            code_hash: hash_reset_code(&user.id, &code),
            created_at: now,
            expires_at: now + Duration::minutes(ttl_minutes),
            status: ResetCodeStatus::Pending,
            failed_attempts: 0,
        })?;

        let message = reset_code_message(
            &state.config().mail.from_address,
            &user.email,
            &code,
            ttl_minutes,
        );
        if let Err(e) = state.mailer().send(message).await {
            tracing::warn!(error = %e, email = %mask_email_for_log(&user.email), "Reset code delivery failed");
        }
        tracing::info!(
            user_id = %user.id,
            replaced,
            "Password reset code issued"
        );
    }

    Ok(ok(serde_json::json!({
        "message": "If the email exists, a reset code has been sent.",
    })))
}

async fn reset_password(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_password(&req.new_password)
        .map_err(|m| AppError::bad_request("AUTH_WEAK_PASSWORD", m))?;

    let invalid = || AppError::bad_request("AUTH_INVALID_RESET_CODE", "Invalid reset code");

    let mut user = state
        .store()
        .get_user_by_email(&normalize_email(&req.email))?
        .ok_or_else(invalid)?;

    let code_hash = hash_reset_code(&user.id, &req.code);
    match state.store().redeem_reset_code(&user.id, &code_hash, Utc::now())? {
        ResetAttempt::Accepted => {}
        ResetAttempt::Expired => {
            return Err(AppError::bad_request(
                "AUTH_EXPIRED_RESET_CODE",
                "Reset code expired",
            ));
        }
        ResetAttempt::Rejected { remaining } => {
            tracing::info!(user_id = %user.id, remaining, "Wrong password reset code");
            return Err(invalid());
        }
        ResetAttempt::NoPendingCode => return Err(invalid()),
    }

    user.password_hash = hash_password(&req.new_password)?;
    user.updated_at = Utc::now();
    state.store().update_user(&user)?;

    let revoked = state.store().delete_user_sessions(&user.id)?;
    tracing::info!(user_id = %user.id, revoked, "Password reset completed");

    Ok(ok(serde_json::json!({"passwordReset": true})))
}

fn set_token_cookie(response: &mut Response, token: &str) -> Result<(), AppError> {
    append_set_cookie(
        response,
        &format!("token={token}; Path=/; SameSite=Strict; HttpOnly; Secure"),
    )
}

fn append_set_cookie(response: &mut Response, cookie: &str) -> Result<(), AppError> {
    let value = HeaderValue::from_str(cookie)
        .map_err(|e| AppError::internal(&format!("set-cookie header: {e}")))?;
    response.headers_mut().append(SET_COOKIE, value);
    Ok(())
}
