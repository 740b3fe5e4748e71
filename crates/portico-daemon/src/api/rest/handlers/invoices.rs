//! Invoice handlers: authoring, sharing and the portal list

use super::parse_id;
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use crate::services::invoices::{InvoiceChanges, NewInvoice, PublicInvoice, ShareLink};
use crate::services::{AgencyUser, PortalIdentity};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use portico_types::{Invoice, InvoiceId};

pub async fn list_invoices(
    State(state): State<AppState>,
    user: AgencyUser,
) -> ApiResult<Json<Vec<Invoice>>> {
    Ok(Json(state.services.invoices.list(&user.account_id).await?))
}

pub async fn create_invoice(
    State(state): State<AppState>,
    user: AgencyUser,
    Json(request): Json<NewInvoice>,
) -> ApiResult<(StatusCode, Json<Invoice>)> {
    let invoice = state.services.invoices.create(&user, request).await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

pub async fn update_invoice(
    State(state): State<AppState>,
    user: AgencyUser,
    Path(id): Path<String>,
    Json(request): Json<InvoiceChanges>,
) -> ApiResult<Json<Invoice>> {
    let invoice_id: InvoiceId = parse_id(&id, "invoice")?;
    let invoice = state
        .services
        .invoices
        .update(&user, &invoice_id, request)
        .await?;
    Ok(Json(invoice))
}

pub async fn send_invoice(
    State(state): State<AppState>,
    user: AgencyUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Invoice>> {
    let invoice_id: InvoiceId = parse_id(&id, "invoice")?;
    Ok(Json(state.services.invoices.send(&user, &invoice_id).await?))
}

/// Record an offline payment
pub async fn mark_invoice_paid(
    State(state): State<AppState>,
    user: AgencyUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Invoice>> {
    let invoice_id: InvoiceId = parse_id(&id, "invoice")?;
    let invoice = state
        .services
        .invoices
        .mark_paid(&user, &invoice_id)
        .await?;
    Ok(Json(invoice))
}

/// Create (or return) the invoice's public share link
pub async fn share_invoice(
    State(state): State<AppState>,
    user: AgencyUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ShareLink>> {
    let invoice_id: InvoiceId = parse_id(&id, "invoice")?;
    let link = state
        .services
        .invoices
        .share(&user.account_id, &invoice_id)
        .await?;
    Ok(Json(link))
}

/// Unauthenticated invoice page data
pub async fn get_public_invoice(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Json<PublicInvoice>> {
    Ok(Json(state.services.invoices.public_invoice(&token).await?))
}

pub async fn list_portal_invoices(
    State(state): State<AppState>,
    identity: PortalIdentity,
) -> ApiResult<Json<Vec<Invoice>>> {
    Ok(Json(state.services.invoices.list_for_client(&identity).await?))
}
