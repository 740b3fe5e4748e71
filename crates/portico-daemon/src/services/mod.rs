//! Domain services behind the REST handlers
//!
//! Each service owns a storage handle plus whatever integrations it needs and
//! speaks `ServiceError`. Handlers stay thin.

pub mod activities;
pub mod billing;
pub mod clients;
pub mod contracts;
pub mod files;
pub mod forms;
pub mod growth;
pub mod identity;
pub mod invoices;
pub mod magic_link;
pub mod messages;

use crate::config::DaemonConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::integrations::Integrations;
use crate::storage::Storage;
use portico_types::{AccountId, Client, ClientId, Project, ProjectId, UserId};
use serde::Serialize;
use std::sync::Arc;

pub use activities::ActivityService;
pub use billing::BillingService;
pub use clients::ClientService;
pub use contracts::ContractService;
pub use files::FileService;
pub use forms::FormService;
pub use growth::GrowthService;
pub use identity::IdentityService;
pub use invoices::InvoiceService;
pub use magic_link::MagicLinkService;
pub use messages::MessageService;

/// An authenticated agency-side user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgencyUser {
    pub account_id: AccountId,
    pub user_id: UserId,
    pub user_name: String,
}

/// An authenticated portal client, as established by a valid session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortalIdentity {
    pub email: String,
    pub name: Option<String>,
    pub role: Option<String>,
    pub account_id: AccountId,
    pub client_id: Option<ClientId>,
    pub company_slug: String,
    pub client_slug: String,
}

impl PortalIdentity {
    /// The client this identity is linked to
    pub fn require_client(&self) -> ServiceResult<ClientId> {
        self.client_id
            .ok_or_else(|| ServiceError::NotFound("Client not found".to_string()))
    }

    /// Name to record as author of client actions
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.email)
    }
}

/// Client `id` if it belongs to `account_id`; another tenant's client reads as missing
pub(crate) async fn require_owned_client(
    storage: &dyn Storage,
    account_id: &AccountId,
    id: &ClientId,
) -> ServiceResult<Client> {
    storage
        .get_client(id)
        .await?
        .filter(|c| c.account_id == *account_id)
        .ok_or_else(|| ServiceError::NotFound("Client not found".to_string()))
}

pub(crate) async fn require_owned_project(
    storage: &dyn Storage,
    account_id: &AccountId,
    id: &ProjectId,
) -> ServiceResult<Project> {
    storage
        .get_project(id)
        .await?
        .filter(|p| p.account_id == *account_id)
        .ok_or_else(|| ServiceError::NotFound("Project not found".to_string()))
}

/// Every service, wired to one storage backend and one set of integrations
#[derive(Clone)]
pub struct Services {
    pub identity: IdentityService,
    pub clients: ClientService,
    pub magic_link: Arc<MagicLinkService>,
    pub contracts: ContractService,
    pub files: Arc<FileService>,
    pub billing: Arc<BillingService>,
    pub growth: GrowthService,
    pub invoices: InvoiceService,
    pub messages: MessageService,
    pub activities: ActivityService,
    pub forms: FormService,
}

impl Services {
    pub fn new(
        storage: Arc<dyn Storage>,
        integrations: &Integrations,
        config: &DaemonConfig,
    ) -> Self {
        let identity = IdentityService::new(storage.clone());
        Self {
            magic_link: Arc::new(MagicLinkService::new(
                storage.clone(),
                identity.clone(),
                integrations.mailer.clone(),
                config.auth.clone(),
                config.server.public_base_url.clone(),
                config.environment,
            )),
            clients: ClientService::new(
                storage.clone(),
                identity.clone(),
                config.server.public_base_url.clone(),
            ),
            contracts: ContractService::new(storage.clone()),
            files: Arc::new(FileService::new(
                storage.clone(),
                integrations.object_store.clone(),
                config.uploads.clone(),
            )),
            billing: Arc::new(BillingService::new(
                storage.clone(),
                integrations.payments.clone(),
                config.billing.clone(),
                config.server.public_base_url.clone(),
            )),
            growth: GrowthService::new(storage.clone(), integrations.llm.clone()),
            invoices: InvoiceService::new(storage.clone(), config.server.public_base_url.clone()),
            messages: MessageService::new(storage.clone()),
            activities: ActivityService::new(storage.clone()),
            forms: FormService::new(storage),
            identity,
        }
    }
}
