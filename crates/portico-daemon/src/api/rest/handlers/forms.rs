//! Form handlers: agency authoring, public and portal submissions

use super::parse_id;
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use crate::services::forms::{NewForm, SubmissionCheck, SubmissionRequest};
use crate::services::{AgencyUser, PortalIdentity};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use portico_types::{Form, FormId, FormSubmission};
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FormStatusRequest {
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SubmissionFilter {
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PortalSubmissionRequest {
    pub responses: Map<String, Value>,
}

pub async fn list_forms(
    State(state): State<AppState>,
    user: AgencyUser,
) -> ApiResult<Json<Vec<Form>>> {
    Ok(Json(state.services.forms.list(&user.account_id).await?))
}

pub async fn get_form(
    State(state): State<AppState>,
    user: AgencyUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Form>> {
    let form_id: FormId = parse_id(&id, "form")?;
    Ok(Json(state.services.forms.get(&user.account_id, &form_id).await?))
}

pub async fn create_form(
    State(state): State<AppState>,
    user: AgencyUser,
    Json(request): Json<NewForm>,
) -> ApiResult<(StatusCode, Json<Form>)> {
    let form = state.services.forms.create(&user, request).await?;
    Ok((StatusCode::CREATED, Json(form)))
}

/// Publish a form or take it back to draft
pub async fn set_form_status(
    State(state): State<AppState>,
    user: AgencyUser,
    Path(id): Path<String>,
    Json(request): Json<FormStatusRequest>,
) -> ApiResult<Json<Form>> {
    let form_id: FormId = parse_id(&id, "form")?;
    let form = state
        .services
        .forms
        .set_status(&user, &form_id, &request.status)
        .await?;
    Ok(Json(form))
}

pub async fn list_form_submissions(
    State(state): State<AppState>,
    user: AgencyUser,
    Path(id): Path<String>,
    Query(filter): Query<SubmissionFilter>,
) -> ApiResult<Json<Vec<FormSubmission>>> {
    let form_id: FormId = parse_id(&id, "form")?;
    let submissions = state
        .services
        .forms
        .list_submissions(&user.account_id, &form_id, filter.email.as_deref())
        .await?;
    Ok(Json(submissions))
}

/// Unauthenticated submission through the form's public link
pub async fn submit_public_form(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SubmissionRequest>,
) -> ApiResult<(StatusCode, Json<FormSubmission>)> {
    let form_id: FormId = parse_id(&id, "form")?;
    let submission = state.services.forms.submit(&form_id, request).await?;
    Ok((StatusCode::CREATED, Json(submission)))
}

pub async fn list_portal_forms(
    State(state): State<AppState>,
    identity: PortalIdentity,
) -> ApiResult<Json<Vec<Form>>> {
    Ok(Json(state.services.forms.list_for_client(&identity).await?))
}

pub async fn submit_portal_form(
    State(state): State<AppState>,
    identity: PortalIdentity,
    Path(id): Path<String>,
    Json(request): Json<PortalSubmissionRequest>,
) -> ApiResult<(StatusCode, Json<FormSubmission>)> {
    let form_id: FormId = parse_id(&id, "form")?;
    let submission = state
        .services
        .forms
        .submit_from_portal(&identity, &form_id, request.responses)
        .await?;
    Ok((StatusCode::CREATED, Json(submission)))
}

pub async fn check_portal_form_submission(
    State(state): State<AppState>,
    identity: PortalIdentity,
    Path(id): Path<String>,
) -> ApiResult<Json<SubmissionCheck>> {
    let form_id: FormId = parse_id(&id, "form")?;
    let check = state
        .services
        .forms
        .check_submitted(&identity, &form_id)
        .await?;
    Ok(Json(check))
}
