//! Activity feed handlers

use super::parse_id;
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use crate::services::activities::LogOutcome;
use crate::services::AgencyUser;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use portico_types::{Activity, ActivitySource, ProjectId};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct LogActivityRequest {
    #[serde(rename = "type")]
    pub source: ActivitySource,
    pub action: String,
    pub project_id: ProjectId,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<usize>,
}

/// Record an activity; repeats inside the duplicate window report `duplicate: true`
pub async fn log_activity(
    State(state): State<AppState>,
    user: AgencyUser,
    Json(request): Json<LogActivityRequest>,
) -> ApiResult<Json<LogOutcome>> {
    let outcome = state
        .services
        .activities
        .log(
            &user,
            request.source,
            &request.action,
            &request.project_id,
            request.metadata,
        )
        .await?;
    Ok(Json(outcome))
}

pub async fn list_project_activities(
    State(state): State<AppState>,
    user: AgencyUser,
    Path(id): Path<String>,
    Query(query): Query<ActivityQuery>,
) -> ApiResult<Json<Vec<Activity>>> {
    let project_id: ProjectId = parse_id(&id, "project")?;
    let activities = state
        .services
        .activities
        .list(&user.account_id, &project_id, query.limit)
        .await?;
    Ok(Json(activities))
}
