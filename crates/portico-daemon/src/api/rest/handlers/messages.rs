//! Project message handlers for both sides of a thread

use super::parse_id;
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use crate::services::messages::{NewMessage, Participant};
use crate::services::{AgencyUser, PortalIdentity};
use axum::{
    extract::{Path, State},
    Json,
};
use portico_types::{Message, MessageId, ProjectId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MarkReadRequest {
    /// Specific messages; omitted means everything from the other party
    pub message_ids: Option<Vec<MessageId>>,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub updated: usize,
}

/// A missing or empty body marks the whole thread read
fn read_request(body: Option<Json<MarkReadRequest>>) -> MarkReadRequest {
    body.map(|Json(request)| request).unwrap_or_default()
}

async fn list(state: &AppState, participant: Participant<'_>, id: &str) -> ApiResult<Vec<Message>> {
    let project_id: ProjectId = parse_id(id, "project")?;
    Ok(state.services.messages.list(participant, &project_id).await?)
}

async fn post(
    state: &AppState,
    participant: Participant<'_>,
    id: &str,
    body: NewMessage,
) -> ApiResult<Message> {
    let project_id: ProjectId = parse_id(id, "project")?;
    Ok(state
        .services
        .messages
        .post(participant, &project_id, body)
        .await?)
}

async fn mark_read(
    state: &AppState,
    participant: Participant<'_>,
    id: &str,
    request: MarkReadRequest,
) -> ApiResult<MarkReadResponse> {
    let project_id: ProjectId = parse_id(id, "project")?;
    let updated = state
        .services
        .messages
        .mark_read(participant, &project_id, request.message_ids)
        .await?;
    Ok(MarkReadResponse { updated })
}

pub async fn list_project_messages(
    State(state): State<AppState>,
    user: AgencyUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Message>>> {
    list(&state, Participant::User(&user), &id).await.map(Json)
}

pub async fn post_project_message(
    State(state): State<AppState>,
    user: AgencyUser,
    Path(id): Path<String>,
    Json(body): Json<NewMessage>,
) -> ApiResult<Json<Message>> {
    post(&state, Participant::User(&user), &id, body).await.map(Json)
}

pub async fn mark_project_messages_read(
    State(state): State<AppState>,
    user: AgencyUser,
    Path(id): Path<String>,
    body: Option<Json<MarkReadRequest>>,
) -> ApiResult<Json<MarkReadResponse>> {
    mark_read(&state, Participant::User(&user), &id, read_request(body))
        .await
        .map(Json)
}

pub async fn list_portal_messages(
    State(state): State<AppState>,
    identity: PortalIdentity,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Message>>> {
    list(&state, Participant::Client(&identity), &id).await.map(Json)
}

pub async fn post_portal_message(
    State(state): State<AppState>,
    identity: PortalIdentity,
    Path(id): Path<String>,
    Json(body): Json<NewMessage>,
) -> ApiResult<Json<Message>> {
    post(&state, Participant::Client(&identity), &id, body)
        .await
        .map(Json)
}

pub async fn mark_portal_messages_read(
    State(state): State<AppState>,
    identity: PortalIdentity,
    Path(id): Path<String>,
    body: Option<Json<MarkReadRequest>>,
) -> ApiResult<Json<MarkReadResponse>> {
    mark_read(&state, Participant::Client(&identity), &id, read_request(body))
        .await
        .map(Json)
}
