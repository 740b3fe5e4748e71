//! Contract handlers for agency users and portal clients

use super::parse_id;
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use crate::services::contracts::{ContractChanges, NewContract, Signer};
use crate::services::{AgencyUser, PortalIdentity};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use portico_types::{Contract, ContractId, ContractStats, SignatureInput, StatusFix};
use serde::{Deserialize, Serialize};

/// Signature body. The signing party comes from the caller's credentials.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SignContractRequest {
    pub signature_data: String,
    pub signer_name: Option<String>,
    pub signer_email: Option<String>,
}

impl From<SignContractRequest> for SignatureInput {
    fn from(request: SignContractRequest) -> Self {
        SignatureInput {
            data: request.signature_data,
            signer_name: request.signer_name,
            signer_email: request.signer_email,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    pub fixed: usize,
    pub changes: Vec<StatusFix>,
}

pub async fn list_contracts(
    State(state): State<AppState>,
    user: AgencyUser,
) -> ApiResult<Json<Vec<Contract>>> {
    Ok(Json(state.services.contracts.list(&user.account_id).await?))
}

/// Count of contracts per status
pub async fn contract_stats(
    State(state): State<AppState>,
    user: AgencyUser,
) -> ApiResult<Json<ContractStats>> {
    Ok(Json(state.services.contracts.stats(&user.account_id).await?))
}

pub async fn get_contract(
    State(state): State<AppState>,
    user: AgencyUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Contract>> {
    let contract_id: ContractId = parse_id(&id, "contract")?;
    let contract = state
        .services
        .contracts
        .get(&user.account_id, &contract_id)
        .await?;
    Ok(Json(contract))
}

pub async fn create_contract(
    State(state): State<AppState>,
    user: AgencyUser,
    Json(request): Json<NewContract>,
) -> ApiResult<(StatusCode, Json<Contract>)> {
    let contract = state.services.contracts.create(&user, request).await?;
    Ok((StatusCode::CREATED, Json(contract)))
}

/// Edit a contract nobody has signed yet
pub async fn update_contract(
    State(state): State<AppState>,
    user: AgencyUser,
    Path(id): Path<String>,
    Json(request): Json<ContractChanges>,
) -> ApiResult<Json<Contract>> {
    let contract_id: ContractId = parse_id(&id, "contract")?;
    let contract = state
        .services
        .contracts
        .update(&user, &contract_id, request)
        .await?;
    Ok(Json(contract))
}

/// Release a draft to the client's portal
pub async fn send_contract(
    State(state): State<AppState>,
    user: AgencyUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Contract>> {
    let contract_id: ContractId = parse_id(&id, "contract")?;
    let contract = state.services.contracts.send(&user, &contract_id).await?;
    Ok(Json(contract))
}

/// Countersign as the agency
pub async fn sign_contract(
    State(state): State<AppState>,
    user: AgencyUser,
    Path(id): Path<String>,
    Json(request): Json<SignContractRequest>,
) -> ApiResult<Json<Contract>> {
    let contract_id: ContractId = parse_id(&id, "contract")?;
    let contract = state
        .services
        .contracts
        .sign(&contract_id, Signer::User(&user), request.into())
        .await?;
    Ok(Json(contract))
}

/// Recompute every contract status from its signature flags
pub async fn reconcile_contracts(
    State(state): State<AppState>,
    user: AgencyUser,
) -> ApiResult<Json<ReconcileResponse>> {
    let changes = state.services.contracts.reconcile(&user.account_id).await?;
    Ok(Json(ReconcileResponse {
        fixed: changes.len(),
        changes,
    }))
}

pub async fn list_portal_contracts(
    State(state): State<AppState>,
    identity: PortalIdentity,
) -> ApiResult<Json<Vec<Contract>>> {
    Ok(Json(state.services.contracts.list_for_client(&identity).await?))
}

/// Sign as the portal client
pub async fn sign_portal_contract(
    State(state): State<AppState>,
    identity: PortalIdentity,
    Path(id): Path<String>,
    Json(request): Json<SignContractRequest>,
) -> ApiResult<Json<Contract>> {
    let contract_id: ContractId = parse_id(&id, "contract")?;
    let contract = state
        .services
        .contracts
        .sign(&contract_id, Signer::Client(&identity), request.into())
        .await?;
    Ok(Json(contract))
}
