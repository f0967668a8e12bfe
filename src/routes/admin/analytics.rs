use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;

use crate::auth::AdminUser;
use crate::constants::{DEFAULT_TOPIC_RANKING_LIMIT, NEW_USER_WINDOW_DAYS};
use crate::extractors::QueryParams;
use crate::response::{ok, AppError};
use crate::state::AppState;

const MAX_TOPIC_RANKING_LIMIT: usize = 50;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/overview", get(overview))
        .route("/topics", get(topic_ranking))
        .route("/new-users", get(new_users))
}

#[derive(Debug, Deserialize)]
struct TopicRankingQuery {
    #[serde(default)]
    least: bool,
    limit: Option<usize>,
}

async fn overview(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(state.store().platform_overview()?))
}

async fn topic_ranking(
    _admin: AdminUser,
    State(state): State<AppState>,
    QueryParams(q): QueryParams<TopicRankingQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = q
        .limit
        .unwrap_or(DEFAULT_TOPIC_RANKING_LIMIT)
        .clamp(1, MAX_TOPIC_RANKING_LIMIT);
    Ok(ok(state.store().topic_engagement(q.least, limit)?))
}

async fn new_users(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let today = Utc::now().date_naive();
    Ok(ok(state
        .store()
        .daily_new_users(today, NEW_USER_WINDOW_DAYS)?))
}
