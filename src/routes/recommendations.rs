use std::collections::HashSet;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::constants::{DEFAULT_RECOMMENDATION_LIMIT, MAX_RECOMMENDATION_LIMIT};
use crate::extractors::QueryParams;
use crate::response::{ok, AppError};
use crate::services::recommendation::{self, Branch, Signals};
use crate::state::AppState;
use crate::store::operations::courses::Course;
use crate::store::{Store, StoreError};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(recommend))
}

#[derive(Debug, Deserialize)]
struct RecommendationQuery {
    limit: Option<usize>,
}

impl RecommendationQuery {
    fn limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_RECOMMENDATION_LIMIT)
            .clamp(1, MAX_RECOMMENDATION_LIMIT)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecommendationResponse {
    branch: Branch,
    courses: Vec<Course>,
}

/// Interests, topics of courses the user touched, and the touched courses
/// themselves as exclusions.
pub fn user_signals(store: &Store, user_id: &str) -> Result<Signals, StoreError> {
    let interest_topics: HashSet<String> = store.interest_topic_ids(user_id)?.into_iter().collect();

    let mut enrolled_topics = HashSet::new();
    let mut excluded_courses = HashSet::new();
    for interaction in store.list_user_interactions(user_id)? {
        if let Some(course) = store.get_course(&interaction.course_id)? {
            enrolled_topics.insert(course.topic_id);
        }
        excluded_courses.insert(interaction.course_id);
    }

    Ok(Signals {
        interest_topics,
        enrolled_topics,
        excluded_courses,
    })
}

async fn recommend(
    auth: AuthUser,
    State(state): State<AppState>,
    QueryParams(query): QueryParams<RecommendationQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query.limit();
    let signals = user_signals(state.store(), &auth.user_id)?;
    let catalog = state.store().list_built_courses()?;

    let selection = recommendation::select(&catalog, &signals, limit, &mut rand::thread_rng());
    tracing::debug!(
        user_id = %auth.user_id,
        branch = ?selection.branch,
        returned = selection.courses.len(),
        limit,
        "Recommendations served"
    );

    Ok(ok(RecommendationResponse {
        branch: selection.branch,
        courses: selection.courses,
    }))
}
