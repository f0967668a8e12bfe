use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::constants::MAX_COURSE_PROGRESS;
use crate::extractors::JsonBody;
use crate::response::{created, ok, AppError};
use crate::state::AppState;
use crate::store::operations::courses::Course;
use crate::store::Store;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_courses))
        .route("/:id", get(get_course))
        .route("/:id/content", get(get_content))
        .route("/:id/enroll", post(enroll))
        .route("/:id/progress", get(get_progress).put(update_progress))
        .route("/:id/sections/:index/quiz", get(get_section_quiz))
        .route("/:id/sections/:index/quiz/pass", post(pass_section_quiz))
        .route("/:id/quiz-progress", get(quiz_progress))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProgressView {
    course_id: String,
    course_progress: u8,
    enrolled: bool,
    completed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateProgressRequest {
    progress: i64,
}

fn require_course(store: &Store, course_id: &str) -> Result<Course, AppError> {
    store
        .get_course(course_id)?
        .ok_or_else(|| AppError::not_found("Course not found"))
}

async fn list_courses(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(state.store().list_built_courses()?))
}

async fn get_course(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(require_course(state.store(), &id)?))
}

/// The generated body lives in the document store and only exists once the
/// course is built.
async fn get_content(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let course = require_course(state.store(), &id)?;
    if !course.is_built() {
        return Err(AppError::not_found("Course content not found"));
    }
    let document = state
        .documents()
        .get(&id)
        .await?
        .ok_or_else(|| AppError::not_found("Course content not found"))?;
    Ok(ok(document))
}

async fn enroll(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let (interaction, was_created) = state.store().enroll(&auth.user_id, &id)?;
    if was_created {
        tracing::info!(user_id = %auth.user_id, course_id = %id, "Enrolled");
        Ok(created(interaction).into_response())
    } else {
        Ok(ok(interaction).into_response())
    }
}

async fn get_progress(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    require_course(state.store(), &id)?;
    let view = match state.store().get_interaction(&auth.user_id, &id)? {
        Some(row) => ProgressView {
            course_id: id,
            course_progress: row.course_progress,
            enrolled: true,
            completed: row.is_completed(),
        },
        None => ProgressView {
            course_id: id,
            course_progress: 0,
            enrolled: false,
            completed: false,
        },
    };
    Ok(ok(view))
}

async fn update_progress(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateProgressRequest>,
) -> Result<impl IntoResponse, AppError> {
    let progress = u8::try_from(req.progress)
        .ok()
        .filter(|p| *p <= MAX_COURSE_PROGRESS)
        .ok_or_else(|| {
            AppError::bad_request(
                "VALIDATION_ERROR",
                "progress must be between 0 and 100",
            )
        })?;

    let row = state.store().update_progress(&auth.user_id, &id, progress)?;
    Ok(ok(ProgressView {
        course_id: row.course_id.clone(),
        course_progress: row.course_progress,
        enrolled: true,
        completed: row.is_completed(),
    }))
}

async fn get_section_quiz(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path((id, index)): Path<(String, u32)>,
) -> Result<impl IntoResponse, AppError> {
    require_course(state.store(), &id)?;
    Ok(ok(state.store().get_section_quiz(&id, index)?))
}

async fn pass_section_quiz(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((id, index)): Path<(String, u32)>,
) -> Result<Response, AppError> {
    let (record, was_created) = state
        .store()
        .mark_section_passed(&auth.user_id, &id, index)?;
    if was_created {
        Ok(created(record).into_response())
    } else {
        Ok(ok(record).into_response())
    }
}

async fn quiz_progress(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    require_course(state.store(), &id)?;
    let passed = state.store().list_passed_sections(&auth.user_id, &id)?;
    Ok(ok(serde_json::json!({
        "courseId": id,
        "passedSections": passed,
    })))
}
