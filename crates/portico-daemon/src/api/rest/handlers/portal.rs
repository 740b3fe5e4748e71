//! Portal sign-in, session and discovery handlers

use super::parse_id;
use crate::api::rest::auth::bearer_token;
use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::services::identity::{ClientSlugLookup, PortalCheck};
use crate::services::magic_link::{MagicLinkIssued, MagicLinkRequest, SessionGrant};
use crate::services::PortalIdentity;
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use portico_types::PortalId;
use serde::{Deserialize, Serialize};

/// Request a magic link by email
pub async fn request_magic_link(
    State(state): State<AppState>,
    Json(request): Json<MagicLinkRequest>,
) -> ApiResult<Json<MagicLinkIssued>> {
    let issued = state.services.magic_link.request_magic_link(request).await?;
    Ok(Json(issued))
}

/// Token plus the portal it was issued for
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ValidateTokenRequest {
    pub token: String,
    pub company_slug: String,
    pub client_slug: String,
}

/// Exchange a magic link token for a session
pub async fn validate_token(
    State(state): State<AppState>,
    Json(request): Json<ValidateTokenRequest>,
) -> ApiResult<Json<SessionGrant>> {
    let grant = state
        .services
        .magic_link
        .validate_magic_link(&request.token, &request.company_slug, &request.client_slug)
        .await?;
    Ok(Json(grant))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ValidateSessionRequest {
    pub session_token: String,
    pub company_slug: String,
    pub client_slug: String,
}

/// Check a session token and return who it belongs to
pub async fn validate_session(
    State(state): State<AppState>,
    Json(request): Json<ValidateSessionRequest>,
) -> ApiResult<Json<PortalIdentity>> {
    let identity = state
        .services
        .magic_link
        .validate_session(
            &request.session_token,
            &request.company_slug,
            &request.client_slug,
        )
        .await?;
    Ok(Json(identity))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Rotate a session using its refresh token
pub async fn refresh_session(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> ApiResult<Json<SessionGrant>> {
    let grant = state
        .services
        .magic_link
        .refresh_session(&request.refresh_token)
        .await?;
    Ok(Json(grant))
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
}

/// Revoke the bearer session
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<LogoutResponse>> {
    let token = bearer_token(&headers).ok_or_else(|| ApiError::Unauthorized {
        message: "Missing session token".to_string(),
        rejection: None,
    })?;
    let revoked = state.services.magic_link.revoke_session(token).await?;
    Ok(Json(LogoutResponse { success: revoked }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PasswordRequest {
    pub email: String,
    pub password: String,
    pub slug: String,
}

#[derive(Debug, Serialize)]
pub struct PasswordSetupResponse {
    pub success: bool,
}

/// Set a portal password; changing an existing one needs the member's bearer session
pub async fn setup_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PasswordRequest>,
) -> ApiResult<Json<PasswordSetupResponse>> {
    state
        .services
        .magic_link
        .setup_password(
            &request.email,
            &request.password,
            &request.slug,
            bearer_token(&headers),
        )
        .await?;
    Ok(Json(PasswordSetupResponse { success: true }))
}

/// Password sign-in; issues a session like a magic link does
pub async fn verify_password(
    State(state): State<AppState>,
    Json(request): Json<PasswordRequest>,
) -> ApiResult<Json<SessionGrant>> {
    let grant = state
        .services
        .magic_link
        .verify_password(&request.email, &request.password, &request.slug)
        .await?;
    Ok(Json(grant))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CheckPortalRequest {
    pub company_slug: String,
    pub client_slug: Option<String>,
    pub email: Option<String>,
}

/// Does a portal exist for this company (and may the email enter it)?
pub async fn check_portal_exists(
    State(state): State<AppState>,
    Json(request): Json<CheckPortalRequest>,
) -> ApiResult<Json<PortalCheck>> {
    if request.company_slug.trim().is_empty() {
        return Err(ApiError::BadRequest("Company slug is required".to_string()));
    }
    let check = state
        .services
        .identity
        .check_portal(
            &request.company_slug,
            request.client_slug.as_deref().filter(|s| !s.trim().is_empty()),
            request.email.as_deref().filter(|e| !e.trim().is_empty()),
        )
        .await?;
    Ok(Json(check))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ClientSlugRequest {
    pub company_slug: String,
    pub email: String,
}

/// Find the client slug an email signs in under
pub async fn lookup_client_slug(
    State(state): State<AppState>,
    Json(request): Json<ClientSlugRequest>,
) -> ApiResult<Json<ClientSlugLookup>> {
    if request.company_slug.trim().is_empty() || request.email.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Company slug and email are required".to_string(),
        ));
    }
    let lookup = state
        .services
        .identity
        .lookup_client_slug(&request.company_slug, &request.email)
        .await?;
    Ok(Json(lookup))
}

#[derive(Debug, Serialize)]
pub struct ViewCountResponse {
    pub view_count: u64,
}

/// Count a portal page view
pub async fn increment_portal_view(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ViewCountResponse>> {
    let portal_id: PortalId = parse_id(&id, "portal")?;
    let view_count = state.services.identity.increment_view(&portal_id).await?;
    Ok(Json(ViewCountResponse { view_count }))
}
