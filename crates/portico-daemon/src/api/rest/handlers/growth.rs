//! Growth tools: brand profile and generated content

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use crate::services::AgencyUser;
use axum::{extract::State, Json};
use portico_types::{BrandProfile, PlanRequest, PostsRequest};
use serde_json::{Map, Value};

pub async fn get_brand_profile(
    State(state): State<AppState>,
    user: AgencyUser,
) -> ApiResult<Json<BrandProfile>> {
    Ok(Json(state.services.growth.brand_profile(&user.account_id).await?))
}

pub async fn save_brand_profile(
    State(state): State<AppState>,
    user: AgencyUser,
    Json(profile): Json<BrandProfile>,
) -> ApiResult<Json<BrandProfile>> {
    let saved = state
        .services
        .growth
        .save_brand_profile(&user.account_id, profile)
        .await?;
    Ok(Json(saved))
}

/// Weekly content plan
pub async fn generate_plan(
    State(state): State<AppState>,
    user: AgencyUser,
    Json(request): Json<PlanRequest>,
) -> ApiResult<Json<Map<String, Value>>> {
    let plan = state
        .services
        .growth
        .generate_plan(&user.account_id, request)
        .await?;
    Ok(Json(plan))
}

pub async fn generate_posts(
    State(state): State<AppState>,
    user: AgencyUser,
    Json(request): Json<PostsRequest>,
) -> ApiResult<Json<Map<String, Value>>> {
    let posts = state
        .services
        .growth
        .generate_posts(&user.account_id, request)
        .await?;
    Ok(Json(posts))
}
