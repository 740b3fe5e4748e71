//! Contract authoring, signing and status reconciliation
//!
//! Every change to an existing contract is a read-modify-write guarded by the
//! row's version; a write that lost the race is replayed on a fresh read.

use super::{require_owned_client, require_owned_project, AgencyUser, PortalIdentity};
use crate::error::{ServiceError, ServiceResult};
use crate::storage::Storage;
use chrono::Utc;
use portico_types::{
    AccountId, Activity, ClientId, Contract, ContractId, ContractStats, PortalId, ProjectId,
    SignatureError, SignatureInput, SignerParty, StatusFix,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

const MAX_WRITE_ATTEMPTS: usize = 5;

/// Who is signing. The party follows from how the caller authenticated.
#[derive(Debug, Clone, Copy)]
pub enum Signer<'a> {
    Client(&'a PortalIdentity),
    User(&'a AgencyUser),
}

impl Signer<'_> {
    pub fn party(&self) -> SignerParty {
        match self {
            Signer::Client(_) => SignerParty::Client,
            Signer::User(_) => SignerParty::User,
        }
    }

    fn account_id(&self) -> AccountId {
        match self {
            Signer::Client(identity) => identity.account_id,
            Signer::User(user) => user.account_id,
        }
    }

    fn name(&self) -> String {
        match self {
            Signer::Client(identity) => identity.display_name().to_string(),
            Signer::User(user) => user.user_name.clone(),
        }
    }
}

impl From<SignatureError> for ServiceError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::EmptySignature => ServiceError::BadRequest(err.to_string()),
            SignatureError::Terminal(_) | SignatureError::NotSent => {
                ServiceError::Conflict(err.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewContract {
    pub name: String,
    pub client_id: Option<ClientId>,
    pub project_id: Option<ProjectId>,
    pub portal_id: Option<PortalId>,
    pub content: Value,
    pub total_value_cents: Option<i64>,
    pub currency: Option<String>,
}

/// Fields an agency may change before anyone has signed
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContractChanges {
    pub name: Option<String>,
    pub client_id: Option<ClientId>,
    pub project_id: Option<ProjectId>,
    pub content: Option<Value>,
    pub total_value_cents: Option<i64>,
    pub currency: Option<String>,
}

fn not_found() -> ServiceError {
    ServiceError::NotFound("Contract not found".to_string())
}

#[derive(Clone)]
pub struct ContractService {
    storage: Arc<dyn Storage>,
}

impl ContractService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Read, change and write back one contract, replaying `apply` on a fresh
    /// read whenever another writer got in between.
    async fn modify<T, F>(&self, id: &ContractId, mut apply: F) -> ServiceResult<(Contract, T)>
    where
        F: FnMut(&mut Contract) -> ServiceResult<T> + Send,
        T: Send,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let mut contract = self.storage.get_contract(id).await?.ok_or_else(not_found)?;
            let output = apply(&mut contract)?;
            if self.storage.update_contract(contract.clone()).await? {
                contract.version += 1;
                return Ok((contract, output));
            }
            tracing::debug!(contract_id = %id, attempt, "Contract changed concurrently, retrying");
        }
        tracing::warn!(contract_id = %id, "Contract update kept losing races");
        Err(ServiceError::Conflict(
            "Contract is being modified, try again".to_string(),
        ))
    }

    /// Apply one signing event and persist the recomputed status
    pub async fn sign(
        &self,
        contract_id: &ContractId,
        signer: Signer<'_>,
        input: SignatureInput,
    ) -> ServiceResult<Contract> {
        let client_id = match signer {
            Signer::Client(identity) => Some(identity.require_client()?),
            Signer::User(_) => None,
        };
        let input = SignatureInput {
            signer_name: input
                .signer_name
                .filter(|n| !n.trim().is_empty())
                .or_else(|| Some(signer.name())),
            ..input
        };

        let (contract, outcome) = self
            .modify(contract_id, |contract| {
                if contract.account_id != signer.account_id() {
                    return Err(match signer {
                        Signer::Client(_) => ServiceError::Forbidden(
                            "Contract does not belong to this client".to_string(),
                        ),
                        Signer::User(_) => not_found(),
                    });
                }
                if client_id.is_some() && contract.client_id != client_id {
                    return Err(ServiceError::Forbidden(
                        "Contract does not belong to this client".to_string(),
                    ));
                }
                Ok(contract.apply_signature(signer.party(), input.clone(), Utc::now())?)
            })
            .await?;

        let mut activity = Activity::new(
            signer.account_id(),
            contract.project_id,
            "status_change",
            "contract_signed",
            signer.name(),
        );
        if let Signer::User(user) = signer {
            activity.actor_id = Some(user.user_id);
        }
        activity.metadata = json!({
            "contract_id": contract.id,
            "party": outcome.party,
            "status": outcome.status,
        });
        self.storage.insert_activity(activity).await?;
        if let Some(project_id) = contract.project_id {
            self.storage.touch_project(&project_id, Utc::now()).await?;
        }

        tracing::info!(
            contract_id = %contract.id,
            party = %outcome.party,
            from = %outcome.previous_status,
            to = %outcome.status,
            "Contract signed"
        );
        Ok(contract)
    }

    /// Recompute every contract's status from its signature flags, fixing drift
    pub async fn reconcile(&self, account_id: &AccountId) -> ServiceResult<Vec<StatusFix>> {
        let now = Utc::now();
        let mut fixes = Vec::new();
        for mut contract in self.storage.list_contracts(account_id).await? {
            if let Some(fix) = contract.reconcile(now) {
                if !self.storage.update_contract(contract).await? {
                    // Changed since listing; the next sweep sees the new state.
                    tracing::debug!(contract_id = %fix.id, "Skipped reconcile of a changing contract");
                    continue;
                }
                tracing::info!(
                    contract_id = %fix.id,
                    from = %fix.old_status,
                    to = %fix.new_status,
                    "Contract status reconciled"
                );
                fixes.push(fix);
            }
        }
        Ok(fixes)
    }

    pub async fn create(&self, user: &AgencyUser, new: NewContract) -> ServiceResult<Contract> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(ServiceError::BadRequest("Contract name is required".to_string()));
        }
        if let Some(client_id) = &new.client_id {
            require_owned_client(self.storage.as_ref(), &user.account_id, client_id).await?;
        }
        if let Some(project_id) = &new.project_id {
            require_owned_project(self.storage.as_ref(), &user.account_id, project_id).await?;
        }

        let mut contract = Contract::new(user.account_id, name);
        contract.client_id = new.client_id;
        contract.project_id = new.project_id;
        contract.portal_id = new.portal_id;
        contract.content = new.content;
        contract.total_value_cents = new.total_value_cents;
        contract.currency = new.currency.filter(|c| !c.trim().is_empty());
        self.storage.upsert_contract(contract.clone()).await?;

        tracing::info!(contract_id = %contract.id, account_id = %user.account_id, "Contract created");
        Ok(contract)
    }

    /// Edit an unsigned contract
    pub async fn update(
        &self,
        user: &AgencyUser,
        id: &ContractId,
        changes: ContractChanges,
    ) -> ServiceResult<Contract> {
        if let Some(client_id) = &changes.client_id {
            require_owned_client(self.storage.as_ref(), &user.account_id, client_id).await?;
        }
        if let Some(project_id) = &changes.project_id {
            require_owned_project(self.storage.as_ref(), &user.account_id, project_id).await?;
        }
        if matches!(&changes.name, Some(name) if name.trim().is_empty()) {
            return Err(ServiceError::BadRequest("Contract name is required".to_string()));
        }

        let (contract, ()) = self
            .modify(id, |contract| {
                if contract.account_id != user.account_id {
                    return Err(not_found());
                }
                if !contract.is_editable() {
                    return Err(ServiceError::Conflict(format!(
                        "Contract is {} and can no longer be edited",
                        contract.status
                    )));
                }
                let changes = changes.clone();
                if let Some(name) = changes.name {
                    contract.name = name.trim().to_string();
                }
                if changes.client_id.is_some() {
                    contract.client_id = changes.client_id;
                }
                if changes.project_id.is_some() {
                    contract.project_id = changes.project_id;
                }
                if let Some(content) = changes.content {
                    contract.content = content;
                }
                if changes.total_value_cents.is_some() {
                    contract.total_value_cents = changes.total_value_cents;
                }
                if changes.currency.is_some() {
                    contract.currency = changes.currency;
                }
                contract.updated_at = Utc::now();
                Ok(())
            })
            .await?;
        Ok(contract)
    }

    /// Release a contract to its client for signature
    pub async fn send(&self, user: &AgencyUser, id: &ContractId) -> ServiceResult<Contract> {
        let (contract, previous) = self
            .modify(id, |contract| {
                if contract.account_id != user.account_id {
                    return Err(not_found());
                }
                if contract.client_id.is_none() {
                    return Err(ServiceError::BadRequest(
                        "Contract has no client to send to".to_string(),
                    ));
                }
                let previous = contract.status;
                contract.send(Utc::now())?;
                Ok(previous)
            })
            .await?;

        let mut activity = Activity::new(
            user.account_id,
            contract.project_id,
            "status_change",
            "contract_sent",
            user.user_name.clone(),
        );
        activity.actor_id = Some(user.user_id);
        activity.metadata = json!({ "contract_id": contract.id, "status": contract.status });
        self.storage.insert_activity(activity).await?;

        tracing::info!(contract_id = %contract.id, from = %previous, to = %contract.status, "Contract sent");
        Ok(contract)
    }

    pub async fn get(&self, account_id: &AccountId, id: &ContractId) -> ServiceResult<Contract> {
        self.storage
            .get_contract(id)
            .await?
            .filter(|c| c.account_id == *account_id)
            .ok_or_else(not_found)
    }

    pub async fn list(&self, account_id: &AccountId) -> ServiceResult<Vec<Contract>> {
        Ok(self.storage.list_contracts(account_id).await?)
    }

    pub async fn stats(&self, account_id: &AccountId) -> ServiceResult<ContractStats> {
        let contracts = self.storage.list_contracts(account_id).await?;
        Ok(ContractStats::from_statuses(
            contracts.iter().map(|c| c.status),
        ))
    }

    pub async fn list_for_client(&self, identity: &PortalIdentity) -> ServiceResult<Vec<Contract>> {
        let client_id = identity.require_client()?;
        Ok(self
            .storage
            .list_contracts_for_client(&identity.account_id, &client_id)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use portico_types::{ClientId, ContractStatus, ProjectId, SignatureStatus, UserId};

    struct Fixture {
        service: ContractService,
        storage: Arc<dyn Storage>,
        user: AgencyUser,
        client: PortalIdentity,
    }

    fn fixture() -> Fixture {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let account_id = AccountId::generate();
        Fixture {
            service: ContractService::new(storage.clone()),
            storage,
            user: AgencyUser {
                account_id,
                user_id: UserId::generate(),
                user_name: "Jane Doe".to_string(),
            },
            client: PortalIdentity {
                email: "ada@example.com".to_string(),
                name: Some("Ada".to_string()),
                role: None,
                account_id,
                client_id: Some(ClientId::generate()),
                company_slug: "acme".to_string(),
                client_slug: "ada".to_string(),
            },
        }
    }

    async fn sent_contract(f: &Fixture) -> Contract {
        let mut contract = Contract::new(f.user.account_id, "Website redesign");
        contract.client_id = f.client.client_id;
        contract.status = ContractStatus::AwaitingSignature;
        f.storage.upsert_contract(contract.clone()).await.unwrap();
        contract
    }

    fn signature(data: &str) -> SignatureInput {
        SignatureInput {
            data: data.to_string(),
            signer_name: None,
            signer_email: None,
        }
    }

    #[tokio::test]
    async fn test_both_parties_sign() {
        let f = fixture();
        let contract = sent_contract(&f).await;

        let after_client = f
            .service
            .sign(&contract.id, Signer::Client(&f.client), signature("data:image/png;base64,AA"))
            .await
            .unwrap();
        assert_eq!(after_client.status, ContractStatus::PartiallySigned);
        assert_eq!(after_client.signature_status, SignatureStatus::Pending);
        assert_eq!(
            after_client.client_signature.signer_name.as_deref(),
            Some("Ada")
        );

        let after_user = f
            .service
            .sign(&contract.id, Signer::User(&f.user), signature("Jane"))
            .await
            .unwrap();
        assert_eq!(after_user.status, ContractStatus::Signed);
        assert_eq!(after_user.signature_status, SignatureStatus::Signed);
        assert!(after_user.signed_at.is_some());
    }

    #[tokio::test]
    async fn test_signing_logs_activity() {
        let f = fixture();
        let project = ProjectId::generate();
        let mut contract = sent_contract(&f).await;
        contract.project_id = Some(project);
        f.storage.upsert_contract(contract.clone()).await.unwrap();

        f.service
            .sign(&contract.id, Signer::User(&f.user), signature("Jane"))
            .await
            .unwrap();

        let activities = f
            .storage
            .list_activities(&f.user.account_id, &project, 10)
            .await
            .unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].action, "contract_signed");
        assert_eq!(activities[0].activity_type, "status_change");
        assert_eq!(activities[0].metadata["party"], "user");
        assert_eq!(activities[0].metadata["status"], "partially_signed");
    }

    #[tokio::test]
    async fn test_client_cannot_sign_foreign_contract() {
        let f = fixture();
        let mut contract = sent_contract(&f).await;
        contract.client_id = Some(ClientId::generate());
        f.storage.upsert_contract(contract.clone()).await.unwrap();

        let err = f
            .service
            .sign(&contract.id, Signer::Client(&f.client), signature("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let err = f
            .service
            .sign(&ContractId::generate(), Signer::Client(&f.client), signature("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_signing_rejections() {
        let f = fixture();
        let contract = sent_contract(&f).await;

        let err = f
            .service
            .sign(&contract.id, Signer::User(&f.user), signature("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));

        let mut declined = contract.clone();
        declined.status = ContractStatus::Declined;
        f.storage.upsert_contract(declined).await.unwrap();
        let err = f
            .service
            .sign(&contract.id, Signer::User(&f.user), signature("Jane"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let mut draft = Contract::new(f.user.account_id, "Draft");
        draft.client_id = f.client.client_id;
        f.storage.upsert_contract(draft.clone()).await.unwrap();
        let err = f
            .service
            .sign(&draft.id, Signer::Client(&f.client), signature("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_signatures_are_both_kept() {
        let f = fixture();
        let mut ids = Vec::new();
        for _ in 0..16 {
            ids.push(sent_contract(&f).await.id);
        }

        let mut tasks = Vec::new();
        for id in ids.clone() {
            for party in [SignerParty::Client, SignerParty::User] {
                let service = f.service.clone();
                let client = f.client.clone();
                let user = f.user.clone();
                tasks.push(tokio::spawn(async move {
                    let signer = match party {
                        SignerParty::Client => Signer::Client(&client),
                        SignerParty::User => Signer::User(&user),
                    };
                    service.sign(&id, signer, signature("sig")).await
                }));
            }
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        for id in ids {
            let stored = f.storage.get_contract(&id).await.unwrap().unwrap();
            assert!(stored.client_signed() && stored.user_signed());
            assert_eq!(stored.status, ContractStatus::Signed);
            assert_eq!(stored.version, 2);
        }
    }

    #[tokio::test]
    async fn test_interleaved_signatures_replay_on_fresh_read() {
        let f = fixture();
        let contract = sent_contract(&f).await;

        // A client signature lands between the user's read and write.
        let stale = f.storage.get_contract(&contract.id).await.unwrap().unwrap();
        f.service
            .sign(&contract.id, Signer::Client(&f.client), signature("client"))
            .await
            .unwrap();
        let mut lost = stale.clone();
        lost.apply_signature(SignerParty::User, signature("user"), Utc::now())
            .unwrap();
        assert!(!f.storage.update_contract(lost).await.unwrap());

        let signed = f
            .service
            .sign(&contract.id, Signer::User(&f.user), signature("user"))
            .await
            .unwrap();
        assert_eq!(signed.status, ContractStatus::Signed);
        assert!(signed.client_signed());
    }

    #[tokio::test]
    async fn test_create_update_send() {
        let f = fixture();
        let client = portico_types::Client::new(f.user.account_id, "Ada", "Lovelace", "ada@example.com");
        f.storage.upsert_client(client.clone()).await.unwrap();

        let err = f
            .service
            .create(&f.user, NewContract::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));

        let foreign = portico_types::Client::new(AccountId::generate(), "Eve", "X", "eve@example.com");
        f.storage.upsert_client(foreign.clone()).await.unwrap();
        let err = f
            .service
            .create(
                &f.user,
                NewContract {
                    name: "Retainer".to_string(),
                    client_id: Some(foreign.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let draft = f
            .service
            .create(
                &f.user,
                NewContract {
                    name: " Retainer ".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(draft.name, "Retainer");
        assert_eq!(draft.status, ContractStatus::Draft);

        let err = f.service.send(&f.user, &draft.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));

        let edited = f
            .service
            .update(
                &f.user,
                &draft.id,
                ContractChanges {
                    client_id: Some(client.id),
                    total_value_cents: Some(120_000),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.client_id, Some(client.id));

        let sent = f.service.send(&f.user, &draft.id).await.unwrap();
        assert_eq!(sent.status, ContractStatus::Sent);
        assert!(sent.sent_at.is_some());

        let other = AgencyUser {
            account_id: AccountId::generate(),
            ..f.user.clone()
        };
        let err = f.service.send(&other, &draft.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        f.service
            .sign(&draft.id, Signer::User(&f.user), signature("Jane"))
            .await
            .unwrap();
        let err = f
            .service
            .update(
                &f.user,
                &draft.id,
                ContractChanges {
                    name: Some("Changed".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_reconcile_fixes_drift() {
        let f = fixture();
        let mut drifted = sent_contract(&f).await;
        drifted.status = ContractStatus::Signed;
        f.storage.upsert_contract(drifted.clone()).await.unwrap();
        sent_contract(&f).await;

        let fixes = f.service.reconcile(&f.user.account_id).await.unwrap();
        assert_eq!(fixes.len(), 1);
        assert_eq!(fixes[0].id, drifted.id);
        assert_eq!(fixes[0].new_status, ContractStatus::AwaitingSignature);

        assert!(f.service.reconcile(&f.user.account_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stats_and_tenant_isolation() {
        let f = fixture();
        let contract = sent_contract(&f).await;
        f.storage
            .upsert_contract(Contract::new(f.user.account_id, "Draft"))
            .await
            .unwrap();

        let stats = f.service.stats(&f.user.account_id).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.draft, 1);
        assert_eq!(stats.awaiting_signature, 1);

        assert!(f
            .service
            .get(&AccountId::generate(), &contract.id)
            .await
            .is_err());
        assert_eq!(f.service.list_for_client(&f.client).await.unwrap().len(), 1);
    }
}
