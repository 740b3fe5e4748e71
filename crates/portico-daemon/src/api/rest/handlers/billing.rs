//! Subscription checkout and payment webhook handlers

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use crate::services::billing::CheckoutResponse;
use crate::services::AgencyUser;
use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};

/// Header carrying the `t=…,v1=…` webhook signature
pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CheckoutRequest {
    pub plan_tier: String,
}

/// Start a subscription checkout for the caller's account
pub async fn create_checkout(
    State(state): State<AppState>,
    user: AgencyUser,
    Json(request): Json<CheckoutRequest>,
) -> ApiResult<Json<CheckoutResponse>> {
    let checkout = state
        .services
        .billing
        .create_checkout(&user, &request.plan_tier)
        .await?;
    Ok(Json(checkout))
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub received: bool,
}

/// Payment processor events. The raw body is needed to check the signature.
pub async fn billing_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookResponse>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    state
        .services
        .billing
        .handle_webhook(&body, signature)
        .await?;
    Ok(Json(WebhookResponse { received: true }))
}
