use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::extractors::JsonBody;
use crate::response::{ok, AppError};
use crate::state::AppState;
use crate::store::operations::courses::Course;
use crate::store::operations::interactions::CourseInteraction;
use crate::store::operations::users::{User, UserRole};
use crate::store::Store;
use crate::validation::validate_person_name;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_profile).put(update_profile))
        .route("/me/interests", get(list_interests).put(add_interests))
        .route("/me/enrollments", get(list_enrollments))
        .route("/me/completed", get(list_completed))
}

/// Public view of a user; never carries the password hash.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: UserRole,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(value: &User) -> Self {
        Self {
            id: value.id.clone(),
            first_name: value.first_name.clone(),
            last_name: value.last_name.clone(),
            email: value.email.clone(),
            role: value.role,
            is_active: value.is_active,
            is_verified: value.is_verified,
            created_at: value.created_at,
        }
    }
}

/// An interaction joined with its course.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentView {
    pub course: Course,
    pub course_progress: u8,
    pub enrolled_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn with_courses(
    store: &Store,
    rows: Vec<CourseInteraction>,
) -> Result<Vec<EnrollmentView>, AppError> {
    let mut views = Vec::with_capacity(rows.len());
    for row in rows {
        match store.get_course(&row.course_id)? {
            Some(course) => views.push(EnrollmentView {
                course,
                course_progress: row.course_progress,
                enrolled_at: row.created_at,
                updated_at: row.updated_at,
            }),
            None => tracing::warn!(course_id = %row.course_id, "Interaction points at a missing course"),
        }
    }
    Ok(views)
}

async fn get_profile(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .store()
        .get_user_by_id(&auth.user_id)?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(ok(UserProfile::from(&user)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateProfileRequest {
    first_name: Option<String>,
    last_name: Option<String>,
}

async fn update_profile(
    auth: AuthUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut user = state
        .store()
        .get_user_by_id(&auth.user_id)?
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

    user.updated_at = Utc::now();
    state.store().update_user(&user)?;

    Ok(ok(UserProfile::from(&user)))
}

async fn list_interests(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let mut topics = Vec::new();
    for topic_id in state.store().interest_topic_ids(&auth.user_id)? {
        if let Some(topic) = state.store().get_topic(&topic_id)? {
            topics.push(topic);
        }
    }
    Ok(ok(topics))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddInterestsRequest {
    topic_ids: Vec<String>,
}

async fn add_interests(
    auth: AuthUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<AddInterestsRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.topic_ids.is_empty() {
        return Err(AppError::bad_request(
            "VALIDATION_ERROR",
            "topicIds must not be empty",
        ));
    }
    let added = state
        .store()
        .add_topic_preferences(&auth.user_id, &req.topic_ids)?;
    let topic_ids = state.store().interest_topic_ids(&auth.user_id)?;
    Ok(ok(serde_json::json!({
        "added": added,
        "topicIds": topic_ids,
    })))
}

async fn list_enrollments(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let rows = state.store().list_in_progress(&auth.user_id)?;
    Ok(ok(with_courses(state.store(), rows)?))
}

async fn list_completed(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let rows = state.store().list_completed(&auth.user_id)?;
    Ok(ok(with_courses(state.store(), rows)?))
}
