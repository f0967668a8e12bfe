pub mod analytics;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use serde::Deserialize;

use crate::auth::{issue_session_token, AdminUser};
use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::extractors::{JsonBody, QueryParams};
use crate::response::{created, ok, paginated, AppError};
use crate::routes::auth::{new_account, validate_new_account, AuthResponse};
use crate::routes::users::UserProfile;
use crate::services::mailer::mask_email_for_log;
use crate::state::AppState;
use crate::store::operations::users::UserRole;
use crate::validation::{normalize_email, validate_person_name};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(setup_status))
        .route("/setup", post(setup))
        .route("/users", get(list_users))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/users/:id/activate", post(activate_user))
        .route("/users/:id/deactivate", post(deactivate_user))
        .nest("/analytics", analytics::router())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetupRequest {
    first_name: String,
    last_name: String,
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListUsersQuery {
    page: Option<u64>,
    per_page: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateUserRequest {
    first_name: Option<String>,
    last_name: Option<String>,
    role: Option<UserRole>,
}

async fn setup_status(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let initialized = state.store().any_admin_exists()?;
    Ok(ok(serde_json::json!({"initialized": initialized})))
}

/// Creates the first admin. Closed for good once any admin exists.
async fn setup(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<SetupRequest>,
) -> Result<Response, AppError> {
    if state.store().any_admin_exists()? {
        return Err(AppError::conflict(
            "ADMIN_ALREADY_EXISTS",
            "Admin account already exists",
        ));
    }

    let email = normalize_email(&req.email);
    validate_new_account(&req.first_name, &req.last_name, &email, &req.password)?;
    let admin = new_account(
        &req.first_name,
        &req.last_name,
        &email,
        &req.password,
        UserRole::Admin,
    )?;
    state.store().create_user(&admin)?;
    tracing::info!(admin_id = %admin.id, email = %mask_email_for_log(&email), "First admin created");

    let token = issue_session_token(&admin.id, &state)?;
    Ok(created(AuthResponse {
        token,
        user: UserProfile::from(&admin),
    })
    .into_response())
}

async fn list_users(
    _admin: AdminUser,
    State(state): State<AppState>,
    QueryParams(q): QueryParams<ListUsersQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = q.page.unwrap_or(1).max(1);
    let per_page = q
        .per_page
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = ((page - 1).saturating_mul(per_page)) as usize;
    let (users, total) = state.store().list_users(per_page as usize, offset)?;
    let profiles: Vec<UserProfile> = users.iter().map(UserProfile::from).collect();
    Ok(paginated(profiles, total, page, per_page))
}

async fn get_user(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .store()
        .get_user_by_id(&id)?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(ok(UserProfile::from(&user)))
}

async fn update_user(
    admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut user = state
        .store()
        .get_user_by_id(&id)?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    if let Some(first_name) = req.first_name {
        validate_person_name(&first_name)
            .map_err(|m| AppError::bad_request("VALIDATION_ERROR", m))?;
        user.first_name = first_name.trim().to_string();
    }
    if let Some(last_name) = req.last_name {
        validate_person_name(&last_name)
            .map_err(|m| AppError::bad_request("VALIDATION_ERROR", m))?;
        user.last_name = last_name.trim().to_string();
    }
    if let Some(role) = req.role {
        if id == admin.user_id && role != UserRole::Admin {
            return Err(AppError::bad_request(
                "ADMIN_SELF_DEMOTION",
                "Admins cannot remove their own admin role",
            ));
        }
        user.role = role;
    }

    user.updated_at = Utc::now();
    state.store().update_user(&user)?;
    tracing::info!(admin_id = %admin.user_id, action = "update_user", target_user_id = %id, "Admin updated user");
    Ok(ok(UserProfile::from(&user)))
}

async fn delete_user(
    admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if id == admin.user_id {
        return Err(AppError::bad_request(
            "ADMIN_SELF_DELETE",
            "Admins cannot delete their own account",
        ));
    }
    let removed = state.store().delete_user(&id)?;
    tracing::info!(
        admin_id = %admin.user_id,
        action = "delete_user",
        target_user_id = %id,
        sessions = removed.sessions,
        interactions = removed.interactions,
        "Admin deleted user"
    );
    Ok(ok(serde_json::json!({
        "deleted": true,
        "userId": id,
        "sessionsRevoked": removed.sessions,
        "preferences": removed.preferences,
        "interactions": removed.interactions,
        "quizProgress": removed.quiz_progress,
        "resetCodes": removed.reset_codes,
    })))
}

async fn activate_user(
    admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.store().set_user_active(&id, true)?;
    tracing::info!(admin_id = %admin.user_id, action = "activate_user", target_user_id = %id, "Admin activated user");
    Ok(ok(UserProfile::from(&user)))
}

/// Deactivated users keep their data but lose every session.
async fn deactivate_user(
    admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if id == admin.user_id {
        return Err(AppError::bad_request(
            "ADMIN_SELF_DEACTIVATE",
            "Admins cannot deactivate their own account",
        ));
    }
    let user = state.store().set_user_active(&id, false)?;
    let revoked = state.store().delete_user_sessions(&id)?;
    tracing::info!(
        admin_id = %admin.user_id,
        action = "deactivate_user",
        target_user_id = %id,
        sessions_revoked = revoked,
        "Admin deactivated user"
    );
    Ok(ok(UserProfile::from(&user)))
}
