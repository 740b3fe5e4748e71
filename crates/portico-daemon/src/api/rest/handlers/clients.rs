//! Agency handlers for clients, projects and portals

use super::parse_id;
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use crate::services::clients::{ClientChanges, NewClient, NewPortal, NewProject, ProjectChanges};
use crate::services::AgencyUser;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use portico_types::{Client, ClientId, Portal, Project, ProjectId};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProjectFilter {
    pub client_id: Option<String>,
}

pub async fn list_clients(
    State(state): State<AppState>,
    user: AgencyUser,
) -> ApiResult<Json<Vec<Client>>> {
    Ok(Json(state.services.clients.list_clients(&user.account_id).await?))
}

pub async fn get_client(
    State(state): State<AppState>,
    user: AgencyUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Client>> {
    let client_id: ClientId = parse_id(&id, "client")?;
    let client = state
        .services
        .clients
        .get_client(&user.account_id, &client_id)
        .await?;
    Ok(Json(client))
}

pub async fn create_client(
    State(state): State<AppState>,
    user: AgencyUser,
    Json(request): Json<NewClient>,
) -> ApiResult<(StatusCode, Json<Client>)> {
    let client = state.services.clients.create_client(&user, request).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

pub async fn update_client(
    State(state): State<AppState>,
    user: AgencyUser,
    Path(id): Path<String>,
    Json(request): Json<ClientChanges>,
) -> ApiResult<Json<Client>> {
    let client_id: ClientId = parse_id(&id, "client")?;
    let client = state
        .services
        .clients
        .update_client(&user, &client_id, request)
        .await?;
    Ok(Json(client))
}

/// Archive a client and revoke its portal access
pub async fn archive_client(
    State(state): State<AppState>,
    user: AgencyUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Client>> {
    let client_id: ClientId = parse_id(&id, "client")?;
    let client = state
        .services
        .clients
        .archive_client(&user, &client_id)
        .await?;
    Ok(Json(client))
}

pub async fn list_projects(
    State(state): State<AppState>,
    user: AgencyUser,
    Query(filter): Query<ProjectFilter>,
) -> ApiResult<Json<Vec<Project>>> {
    let client_id: Option<ClientId> = filter
        .client_id
        .as_deref()
        .filter(|raw| !raw.is_empty())
        .map(|raw| parse_id(raw, "client"))
        .transpose()?;
    let projects = state
        .services
        .clients
        .list_projects(&user.account_id, client_id.as_ref())
        .await?;
    Ok(Json(projects))
}

pub async fn get_project(
    State(state): State<AppState>,
    user: AgencyUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Project>> {
    let project_id: ProjectId = parse_id(&id, "project")?;
    let project = state
        .services
        .clients
        .get_project(&user.account_id, &project_id)
        .await?;
    Ok(Json(project))
}

pub async fn create_project(
    State(state): State<AppState>,
    user: AgencyUser,
    Json(request): Json<NewProject>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    let project = state.services.clients.create_project(&user, request).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn update_project(
    State(state): State<AppState>,
    user: AgencyUser,
    Path(id): Path<String>,
    Json(request): Json<ProjectChanges>,
) -> ApiResult<Json<Project>> {
    let project_id: ProjectId = parse_id(&id, "project")?;
    let project = state
        .services
        .clients
        .update_project(&user, &project_id, request)
        .await?;
    Ok(Json(project))
}

pub async fn list_portals(
    State(state): State<AppState>,
    user: AgencyUser,
) -> ApiResult<Json<Vec<Portal>>> {
    Ok(Json(state.services.clients.list_portals(&user.account_id).await?))
}

/// Create a client's portal; the client's email is added to its allowlist
pub async fn create_portal(
    State(state): State<AppState>,
    user: AgencyUser,
    Json(request): Json<NewPortal>,
) -> ApiResult<(StatusCode, Json<Portal>)> {
    let portal = state.services.clients.create_portal(&user, request).await?;
    Ok((StatusCode::CREATED, Json(portal)))
}
