//! Portal member (allowlist) handlers

use super::parse_id;
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use crate::services::identity::NewMember;
use crate::services::AgencyUser;
use axum::{
    extract::{Path, State},
    Json,
};
use portico_types::{AllowlistEntry, AllowlistEntryId, ClientId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct AddMembersRequest {
    #[serde(default)]
    pub members: Vec<NewMember>,
}

#[derive(Debug, Serialize)]
pub struct AddMembersResponse {
    pub added_count: usize,
}

/// Add people to a client's portal allowlist
pub async fn add_members(
    State(state): State<AppState>,
    user: AgencyUser,
    Path(id): Path<String>,
    Json(request): Json<AddMembersRequest>,
) -> ApiResult<Json<AddMembersResponse>> {
    let client_id: ClientId = parse_id(&id, "client")?;
    let added_count = state
        .services
        .identity
        .add_members(&user.account_id, &client_id, request.members)
        .await?;
    Ok(Json(AddMembersResponse { added_count }))
}

/// List a client's portal members
pub async fn list_members(
    State(state): State<AppState>,
    user: AgencyUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<AllowlistEntry>>> {
    let client_id: ClientId = parse_id(&id, "client")?;
    let members = state
        .services
        .identity
        .list_members(&user.account_id, &client_id)
        .await?;
    Ok(Json(members.iter().map(AllowlistEntry::redacted).collect()))
}

/// Revoke a member's portal access
pub async fn deactivate_member(
    State(state): State<AppState>,
    user: AgencyUser,
    Path(id): Path<String>,
) -> ApiResult<Json<AllowlistEntry>> {
    let entry_id: AllowlistEntryId = parse_id(&id, "member")?;
    let entry = state
        .services
        .identity
        .deactivate_member(&user.account_id, &entry_id)
        .await?;
    Ok(Json(entry.redacted()))
}
