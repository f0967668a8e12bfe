use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::{AdminUser, AuthUser};
use crate::extractors::JsonBody;
use crate::response::{created, ok, AppError};
use crate::state::AppState;
use crate::store::operations::topics::{Topic, TopicEdit};
use crate::validation::validate_topic_text;
use crate::workers::queue::{EnqueueError, GenerationJob};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_topics).post(create_topic))
        .route(
            "/:id",
            get(get_topic).put(update_topic).delete(delete_topic),
        )
        .route("/:id/courses", get(list_topic_courses))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTopicRequest {
    title: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateTopicRequest {
    title: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatedTopic {
    topic: Topic,
    generation_queued: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeletedTopic {
    id: String,
    courses: usize,
    documents: usize,
    interactions: u64,
    quiz_items: u64,
    quiz_progress: u64,
    preferences: u64,
}

async fn list_topics(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(state.store().list_topics()?))
}

async fn get_topic(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let topic = state
        .store()
        .get_topic(&id)?
        .ok_or_else(|| AppError::not_found("Topic not found"))?;
    Ok(ok(topic))
}

/// Records the topic and hands exactly one job to the generation queue.
/// A full queue still keeps the topic; the response says so.
async fn create_topic(
    admin: AdminUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateTopicRequest>,
) -> Result<Response, AppError> {
    validate_topic_text(&req.title, &req.description)
        .map_err(|m| AppError::bad_request("VALIDATION_ERROR", m))?;

    let now = Utc::now();
    let topic = Topic {
        id: uuid::Uuid::new_v4().to_string(),
        title: req.title.trim().to_string(),
        description: req.description.trim().to_string(),
        created_by: admin.user_id.clone(),
        is_published: false,
        created_at: now,
        updated_at: now,
    };
    state.store().create_topic(&topic)?;

    let job = GenerationJob {
        topic_id: topic.id.clone(),
        title: topic.title.clone(),
        description: topic.description.clone(),
    };
    let generation_queued = match state.generation().enqueue(job) {
        Ok(()) => true,
        Err(EnqueueError::Full) => {
            tracing::warn!(topic_id = %topic.id, "Generation queue full; topic saved without courses");
            false
        }
        Err(EnqueueError::Closed) => {
            tracing::error!(topic_id = %topic.id, "Generation queue closed; topic saved without courses");
            false
        }
    };

    tracing::info!(topic_id = %topic.id, created_by = %admin.user_id, generation_queued, "Topic created");
    Ok(created(CreatedTopic {
        topic,
        generation_queued,
    })
    .into_response())
}

async fn update_topic(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateTopicRequest>,
) -> Result<impl IntoResponse, AppError> {
    let current = state
        .store()
        .get_topic(&id)?
        .ok_or_else(|| AppError::not_found("Topic not found"))?;

    let edit = TopicEdit {
        title: req.title.map(|t| t.trim().to_string()),
        description: req.description.map(|d| d.trim().to_string()),
    };
    validate_topic_text(
        edit.title.as_deref().unwrap_or(&current.title),
        edit.description.as_deref().unwrap_or(&current.description),
    )
    .map_err(|m| AppError::bad_request("VALIDATION_ERROR", m))?;

    let topic = state.store().update_topic(&id, &edit)?;
    Ok(ok(topic))
}

async fn delete_topic(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let deletion = state.store().delete_topic(&id)?;

    let mut documents = 0;
    for course_id in &deletion.course_ids {
        match state.documents().delete(course_id).await {
            Ok(true) => documents += 1,
            Ok(false) => {}
            Err(e) => tracing::warn!(course_id = %course_id, error = %e, "Failed to delete course document"),
        }
    }

    Ok(ok(DeletedTopic {
        id,
        courses: deletion.course_ids.len(),
        documents,
        interactions: deletion.interactions,
        quiz_items: deletion.quiz_items,
        quiz_progress: deletion.quiz_progress,
        preferences: deletion.preferences,
    }))
}

async fn list_topic_courses(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if state.store().get_topic(&id)?.is_none() {
        return Err(AppError::not_found("Topic not found"));
    }
    Ok(ok(state.store().list_topic_courses(&id, true)?))
}
