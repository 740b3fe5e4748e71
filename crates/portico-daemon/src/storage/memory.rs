//! In-memory storage implementation

use super::traits::*;
use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portico_types::{
    Account, AccountId, Activity, AllowlistEntry, AllowlistEntryId, BrandProfile, Client,
    ClientId, ClientSessionRecord, Contract, ContractId, FileApproval, FileId, FileRecord, Form,
    FormId, FormSubmission, Invoice, InvoiceId, MagicLinkRecord, Message, Portal, PortalId,
    Project, ProjectId, UserId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory storage for development and testing
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    accounts: Arc<RwLock<HashMap<AccountId, Account>>>,
    clients: Arc<RwLock<HashMap<ClientId, Client>>>,
    projects: Arc<RwLock<HashMap<ProjectId, Project>>>,
    allowlist: Arc<RwLock<HashMap<AllowlistEntryId, AllowlistEntry>>>,
    portals: Arc<RwLock<HashMap<PortalId, Portal>>>,
    magic_links: Arc<RwLock<HashMap<String, MagicLinkRecord>>>,
    sessions: Arc<RwLock<HashMap<String, ClientSessionRecord>>>,
    contracts: Arc<RwLock<HashMap<ContractId, Contract>>>,
    files: Arc<RwLock<HashMap<FileId, FileRecord>>>,
    file_approvals: Arc<RwLock<Vec<FileApproval>>>,
    invoices: Arc<RwLock<HashMap<InvoiceId, Invoice>>>,
    messages: Arc<RwLock<Vec<Message>>>,
    activities: Arc<RwLock<Vec<Activity>>>,
    brand_profiles: Arc<RwLock<HashMap<AccountId, BrandProfile>>>,
    forms: Arc<RwLock<HashMap<FormId, Form>>>,
    form_submissions: Arc<RwLock<Vec<FormSubmission>>>,
}

impl InMemoryStorage {
    /// Create a new in-memory storage
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStorage for InMemoryStorage {
    async fn get_account(&self, id: &AccountId) -> StorageResult<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(id).cloned())
    }

    async fn find_account_by_company_slug(&self, slug: &str) -> StorageResult<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .values()
            .find(|a| a.company_slug().as_deref() == Some(slug))
            .cloned())
    }

    async fn find_account_by_owner_slug(&self, slug: &str) -> StorageResult<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .values()
            .find(|a| a.owner_slug().as_deref() == Some(slug))
            .cloned())
    }

    async fn find_account_by_billing_customer(
        &self,
        customer_id: &str,
    ) -> StorageResult<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .values()
            .find(|a| a.billing_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn upsert_account(&self, account: Account) -> StorageResult<()> {
        let mut accounts = self.accounts.write().await;
        accounts.insert(account.id, account);
        Ok(())
    }
}

#[async_trait]
impl ClientStorage for InMemoryStorage {
    async fn get_client(&self, id: &ClientId) -> StorageResult<Option<Client>> {
        let clients = self.clients.read().await;
        Ok(clients.get(id).cloned())
    }

    async fn find_client_by_email(
        &self,
        account_id: &AccountId,
        email: &str,
    ) -> StorageResult<Option<Client>> {
        let clients = self.clients.read().await;
        Ok(clients
            .values()
            .find(|c| &c.account_id == account_id && c.email == email)
            .cloned())
    }

    async fn list_clients(&self, account_id: &AccountId) -> StorageResult<Vec<Client>> {
        let clients = self.clients.read().await;
        let mut list: Vec<_> = clients
            .values()
            .filter(|c| &c.account_id == account_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn upsert_client(&self, client: Client) -> StorageResult<()> {
        let mut clients = self.clients.write().await;
        clients.insert(client.id, client);
        Ok(())
    }

    async fn list_projects(&self, account_id: &AccountId) -> StorageResult<Vec<Project>> {
        let projects = self.projects.read().await;
        let mut list: Vec<_> = projects
            .values()
            .filter(|p| &p.account_id == account_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn get_project(&self, id: &ProjectId) -> StorageResult<Option<Project>> {
        let projects = self.projects.read().await;
        Ok(projects.get(id).cloned())
    }

    async fn upsert_project(&self, project: Project) -> StorageResult<()> {
        let mut projects = self.projects.write().await;
        projects.insert(project.id, project);
        Ok(())
    }

    async fn touch_project(&self, id: &ProjectId, at: DateTime<Utc>) -> StorageResult<()> {
        let mut projects = self.projects.write().await;
        if let Some(project) = projects.get_mut(id) {
            project.last_activity_at = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl AllowlistStorage for InMemoryStorage {
    async fn get_allowlist_entry(
        &self,
        id: &AllowlistEntryId,
    ) -> StorageResult<Option<AllowlistEntry>> {
        let allowlist = self.allowlist.read().await;
        Ok(allowlist.get(id).cloned())
    }

    async fn find_allowlist_entry(
        &self,
        account_id: &AccountId,
        email: &str,
    ) -> StorageResult<Option<AllowlistEntry>> {
        let allowlist = self.allowlist.read().await;
        Ok(allowlist
            .values()
            .find(|e| &e.account_id == account_id && e.email == email)
            .cloned())
    }

    async fn list_allowlist(&self, account_id: &AccountId) -> StorageResult<Vec<AllowlistEntry>> {
        let allowlist = self.allowlist.read().await;
        let mut entries: Vec<_> = allowlist
            .values()
            .filter(|e| &e.account_id == account_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    async fn list_allowlist_for_client(
        &self,
        account_id: &AccountId,
        client_id: &ClientId,
    ) -> StorageResult<Vec<AllowlistEntry>> {
        let allowlist = self.allowlist.read().await;
        let mut entries: Vec<_> = allowlist
            .values()
            .filter(|e| &e.account_id == account_id && e.client_id.as_ref() == Some(client_id))
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    async fn insert_allowlist_entry(&self, entry: AllowlistEntry) -> StorageResult<()> {
        let mut allowlist = self.allowlist.write().await;
        if allowlist
            .values()
            .any(|e| e.account_id == entry.account_id && e.email == entry.email)
        {
            return Err(StorageError::Conflict(format!(
                "Allowlist entry for {} already exists",
                entry.email
            )));
        }
        allowlist.insert(entry.id, entry);
        Ok(())
    }

    async fn update_allowlist_entry(&self, entry: AllowlistEntry) -> StorageResult<()> {
        let mut allowlist = self.allowlist.write().await;
        match allowlist.get_mut(&entry.id) {
            Some(existing) => {
                *existing = entry;
                Ok(())
            }
            None => Err(StorageError::NotFound(format!(
                "Allowlist entry {} not found",
                entry.id
            ))),
        }
    }

    async fn link_allowlist_client(
        &self,
        id: &AllowlistEntryId,
        client_id: &ClientId,
    ) -> StorageResult<Option<ClientId>> {
        let mut allowlist = self.allowlist.write().await;
        Ok(allowlist.get_mut(id).map(|entry| {
            if entry.client_id.is_none() {
                entry.client_id = Some(*client_id);
            }
            entry.client_id.unwrap_or(*client_id)
        }))
    }
}

#[async_trait]
impl PortalStorage for InMemoryStorage {
    async fn get_portal(&self, id: &PortalId) -> StorageResult<Option<Portal>> {
        let portals = self.portals.read().await;
        Ok(portals.get(id).cloned())
    }

    async fn find_portal_for_client(
        &self,
        account_id: &AccountId,
        client_id: &ClientId,
    ) -> StorageResult<Option<Portal>> {
        let portals = self.portals.read().await;
        Ok(portals
            .values()
            .find(|p| &p.account_id == account_id && &p.client_id == client_id)
            .cloned())
    }

    async fn list_portals_for_account(&self, account_id: &AccountId) -> StorageResult<Vec<Portal>> {
        let portals = self.portals.read().await;
        Ok(portals
            .values()
            .filter(|p| &p.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn upsert_portal(&self, portal: Portal) -> StorageResult<()> {
        let mut portals = self.portals.write().await;
        portals.insert(portal.id, portal);
        Ok(())
    }

    async fn increment_portal_views(&self, id: &PortalId) -> StorageResult<Option<u64>> {
        let mut portals = self.portals.write().await;
        Ok(portals.get_mut(id).map(|portal| {
            portal.view_count += 1;
            portal.view_count
        }))
    }
}

#[async_trait]
impl AuthStorage for InMemoryStorage {
    async fn insert_magic_link(&self, link: MagicLinkRecord) -> StorageResult<()> {
        let mut links = self.magic_links.write().await;
        links.insert(link.token_hash.clone(), link);
        Ok(())
    }

    async fn get_magic_link(&self, token_hash: &str) -> StorageResult<Option<MagicLinkRecord>> {
        let links = self.magic_links.read().await;
        Ok(links.get(token_hash).cloned())
    }

    async fn consume_magic_link(&self, token_hash: &str, at: DateTime<Utc>) -> StorageResult<bool> {
        let mut links = self.magic_links.write().await;
        match links.get_mut(token_hash) {
            Some(link) if link.used_at.is_none() => {
                link.used_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_session(&self, session: ClientSessionRecord) -> StorageResult<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.session_hash.clone(), session);
        Ok(())
    }

    async fn get_session(&self, session_hash: &str) -> StorageResult<Option<ClientSessionRecord>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_hash).cloned())
    }

    async fn find_session_by_refresh(
        &self,
        refresh_hash: &str,
    ) -> StorageResult<Option<ClientSessionRecord>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .find(|s| s.refresh_hash == refresh_hash)
            .cloned())
    }

    async fn delete_session(&self, session_hash: &str) -> StorageResult<bool> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.remove(session_hash).is_some())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StorageResult<PurgeCounts> {
        let mut links = self.magic_links.write().await;
        let before = links.len();
        links.retain(|_, link| !link.is_expired(now));
        let magic_links = before - links.len();
        drop(links);

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.is_refreshable(now));
        Ok(PurgeCounts {
            magic_links,
            sessions: before - sessions.len(),
        })
    }
}

#[async_trait]
impl ContractStorage for InMemoryStorage {
    async fn get_contract(&self, id: &ContractId) -> StorageResult<Option<Contract>> {
        let contracts = self.contracts.read().await;
        Ok(contracts.get(id).cloned())
    }

    async fn list_contracts(&self, account_id: &AccountId) -> StorageResult<Vec<Contract>> {
        let contracts = self.contracts.read().await;
        let mut list: Vec<_> = contracts
            .values()
            .filter(|c| &c.account_id == account_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn list_contracts_for_client(
        &self,
        account_id: &AccountId,
        client_id: &ClientId,
    ) -> StorageResult<Vec<Contract>> {
        let mut list = self.list_contracts(account_id).await?;
        list.retain(|c| c.client_id.as_ref() == Some(client_id));
        Ok(list)
    }

    async fn upsert_contract(&self, mut contract: Contract) -> StorageResult<()> {
        let mut contracts = self.contracts.write().await;
        if let Some(existing) = contracts.get(&contract.id) {
            contract.version = existing.version + 1;
        }
        contracts.insert(contract.id, contract);
        Ok(())
    }

    async fn update_contract(&self, mut contract: Contract) -> StorageResult<bool> {
        let mut contracts = self.contracts.write().await;
        match contracts.get_mut(&contract.id) {
            Some(existing) if existing.version == contract.version => {
                contract.version += 1;
                *existing = contract;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl FileStorage for InMemoryStorage {
    async fn get_file(&self, id: &FileId) -> StorageResult<Option<FileRecord>> {
        let files = self.files.read().await;
        Ok(files.get(id).cloned())
    }

    async fn list_files_for_client(
        &self,
        account_id: &AccountId,
        client_id: &ClientId,
    ) -> StorageResult<Vec<FileRecord>> {
        let files = self.files.read().await;
        let mut list: Vec<_> = files
            .values()
            .filter(|f| &f.account_id == account_id && f.client_id.as_ref() == Some(client_id))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn upsert_file(&self, file: FileRecord) -> StorageResult<()> {
        let mut files = self.files.write().await;
        files.insert(file.id, file);
        Ok(())
    }

    async fn insert_file_approval(&self, approval: FileApproval) -> StorageResult<()> {
        let mut approvals = self.file_approvals.write().await;
        approvals.push(approval);
        Ok(())
    }

    async fn list_file_approvals(&self, file_id: &FileId) -> StorageResult<Vec<FileApproval>> {
        let approvals = self.file_approvals.read().await;
        Ok(approvals
            .iter()
            .filter(|a| &a.file_id == file_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl InvoiceStorage for InMemoryStorage {
    async fn get_invoice(&self, id: &InvoiceId) -> StorageResult<Option<Invoice>> {
        let invoices = self.invoices.read().await;
        Ok(invoices.get(id).cloned())
    }

    async fn find_invoice_by_share_token(&self, token: &str) -> StorageResult<Option<Invoice>> {
        let invoices = self.invoices.read().await;
        Ok(invoices
            .values()
            .find(|i| i.share_token.as_deref() == Some(token))
            .cloned())
    }

    async fn list_invoices(&self, account_id: &AccountId) -> StorageResult<Vec<Invoice>> {
        let invoices = self.invoices.read().await;
        let mut list: Vec<_> = invoices
            .values()
            .filter(|i| &i.account_id == account_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn list_invoices_for_client(
        &self,
        account_id: &AccountId,
        client_id: &ClientId,
    ) -> StorageResult<Vec<Invoice>> {
        let invoices = self.invoices.read().await;
        let mut list: Vec<_> = invoices
            .values()
            .filter(|i| &i.account_id == account_id && i.client_id.as_ref() == Some(client_id))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn upsert_invoice(&self, invoice: Invoice) -> StorageResult<()> {
        let mut invoices = self.invoices.write().await;
        invoices.insert(invoice.id, invoice);
        Ok(())
    }
}

#[async_trait]
impl MessageStorage for InMemoryStorage {
    async fn list_messages(
        &self,
        account_id: &AccountId,
        project_id: &ProjectId,
    ) -> StorageResult<Vec<Message>> {
        let messages = self.messages.read().await;
        let mut list: Vec<_> = messages
            .iter()
            .filter(|m| &m.account_id == account_id && &m.project_id == project_id)
            .cloned()
            .collect();
        list.sort_by_key(|m| m.created_at);
        Ok(list)
    }

    async fn insert_message(&self, message: Message) -> StorageResult<()> {
        let mut messages = self.messages.write().await;
        messages.push(message);
        Ok(())
    }

    async fn mark_messages_read(
        &self,
        account_id: &AccountId,
        project_id: &ProjectId,
        scope: ReadScope,
        at: DateTime<Utc>,
    ) -> StorageResult<usize> {
        let mut messages = self.messages.write().await;
        let mut changed = 0;
        for message in messages
            .iter_mut()
            .filter(|m| &m.account_id == account_id && &m.project_id == project_id && !m.is_read)
        {
            let selected = match &scope {
                ReadScope::Ids(ids) => ids.contains(&message.id),
                ReadScope::FromSender(sender) => &message.sender_type == sender,
            };
            if selected {
                message.mark_read(at);
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[async_trait]
impl ActivityStorage for InMemoryStorage {
    async fn insert_activity(&self, activity: Activity) -> StorageResult<()> {
        let mut activities = self.activities.write().await;
        activities.push(activity);
        Ok(())
    }

    async fn find_recent_activity(
        &self,
        project_id: &ProjectId,
        action: &str,
        actor_id: &UserId,
        since: DateTime<Utc>,
    ) -> StorageResult<Option<Activity>> {
        let activities = self.activities.read().await;
        Ok(activities
            .iter()
            .rev()
            .find(|a| {
                a.project_id.as_ref() == Some(project_id)
                    && a.action == action
                    && a.actor_id.as_ref() == Some(actor_id)
                    && a.created_at >= since
            })
            .cloned())
    }

    async fn list_activities(
        &self,
        account_id: &AccountId,
        project_id: &ProjectId,
        limit: usize,
    ) -> StorageResult<Vec<Activity>> {
        let activities = self.activities.read().await;
        let mut list: Vec<_> = activities
            .iter()
            .filter(|a| &a.account_id == account_id && a.project_id.as_ref() == Some(project_id))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list.truncate(limit);
        Ok(list)
    }
}

#[async_trait]
impl BrandProfileStorage for InMemoryStorage {
    async fn get_brand_profile(
        &self,
        account_id: &AccountId,
    ) -> StorageResult<Option<BrandProfile>> {
        let profiles = self.brand_profiles.read().await;
        Ok(profiles.get(account_id).cloned())
    }

    async fn upsert_brand_profile(
        &self,
        account_id: &AccountId,
        mut profile: BrandProfile,
    ) -> StorageResult<()> {
        profile.account_id = Some(*account_id);
        let mut profiles = self.brand_profiles.write().await;
        profiles.insert(*account_id, profile);
        Ok(())
    }
}

#[async_trait]
impl FormStorage for InMemoryStorage {
    async fn get_form(&self, id: &FormId) -> StorageResult<Option<Form>> {
        let forms = self.forms.read().await;
        Ok(forms.get(id).cloned())
    }

    async fn list_forms(&self, account_id: &AccountId) -> StorageResult<Vec<Form>> {
        let forms = self.forms.read().await;
        let mut list: Vec<_> = forms
            .values()
            .filter(|f| &f.account_id == account_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn upsert_form(&self, mut form: Form) -> StorageResult<()> {
        let mut forms = self.forms.write().await;
        if let Some(existing) = forms.get(&form.id) {
            form.total_submissions = existing.total_submissions;
            form.last_submission_at = existing.last_submission_at;
        }
        forms.insert(form.id, form);
        Ok(())
    }

    async fn record_form_submission(
        &self,
        mut submission: FormSubmission,
        max_submissions: Option<u32>,
    ) -> StorageResult<Option<FormSubmission>> {
        let mut forms = self.forms.write().await;
        let Some(form) = forms.get_mut(&submission.form_id) else {
            return Ok(None);
        };
        if matches!(max_submissions, Some(max) if form.total_submissions >= max) {
            return Ok(None);
        }
        form.total_submissions += 1;
        form.last_submission_at = Some(submission.created_at);
        submission.submission_number = form.total_submissions;

        let mut submissions = self.form_submissions.write().await;
        submissions.push(submission.clone());
        Ok(Some(submission))
    }

    async fn list_form_submissions(&self, form_id: &FormId) -> StorageResult<Vec<FormSubmission>> {
        let submissions = self.form_submissions.read().await;
        Ok(submissions
            .iter()
            .filter(|s| &s.form_id == form_id)
            .cloned()
            .collect())
    }
}

impl Storage for InMemoryStorage {}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_types::{Message, SenderType};

    #[tokio::test]
    async fn test_allowlist_unique_per_account_email() {
        let storage = InMemoryStorage::new();
        let account = AccountId::generate();

        storage
            .insert_allowlist_entry(AllowlistEntry::new(account, "a@b.co"))
            .await
            .unwrap();
        let err = storage
            .insert_allowlist_entry(AllowlistEntry::new(account, "A@B.co "))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));

        // Same email on another account is fine
        storage
            .insert_allowlist_entry(AllowlistEntry::new(AccountId::generate(), "a@b.co"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_link_allowlist_client_only_fills_empty() {
        let storage = InMemoryStorage::new();
        let entry = AllowlistEntry::new(AccountId::generate(), "a@b.co");
        let id = entry.id;
        storage.insert_allowlist_entry(entry).await.unwrap();

        let first = ClientId::generate();
        let second = ClientId::generate();
        assert_eq!(
            storage.link_allowlist_client(&id, &first).await.unwrap(),
            Some(first)
        );
        assert_eq!(
            storage.link_allowlist_client(&id, &second).await.unwrap(),
            Some(first)
        );
        assert_eq!(
            storage
                .link_allowlist_client(&AllowlistEntryId::generate(), &first)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_consume_magic_link_once() {
        let storage = InMemoryStorage::new();
        let now = Utc::now();
        storage
            .insert_magic_link(MagicLinkRecord {
                token_hash: "h".to_string(),
                email: "a@b.co".to_string(),
                company_slug: "acme".to_string(),
                client_slug: "ada".to_string(),
                expires_at: now,
                used_at: None,
                created_at: now,
            })
            .await
            .unwrap();

        assert!(storage.consume_magic_link("h", now).await.unwrap());
        assert!(!storage.consume_magic_link("h", now).await.unwrap());
        assert!(!storage.consume_magic_link("missing", now).await.unwrap());
    }

    fn link(hash: &str, expires_at: DateTime<Utc>) -> MagicLinkRecord {
        MagicLinkRecord {
            token_hash: hash.to_string(),
            email: "a@b.co".to_string(),
            company_slug: "acme".to_string(),
            client_slug: "ada".to_string(),
            expires_at,
            used_at: None,
            created_at: expires_at,
        }
    }

    fn session(
        hash: &str,
        expires_at: DateTime<Utc>,
        refresh_expires_at: DateTime<Utc>,
    ) -> ClientSessionRecord {
        ClientSessionRecord {
            session_hash: hash.to_string(),
            refresh_hash: format!("r-{}", hash),
            account_id: AccountId::generate(),
            email: "a@b.co".to_string(),
            company_slug: "acme".to_string(),
            client_slug: "ada".to_string(),
            expires_at,
            refresh_expires_at,
            created_at: expires_at,
        }
    }

    #[tokio::test]
    async fn test_purge_expired_keeps_live_and_refreshable() {
        let storage = InMemoryStorage::new();
        let now = Utc::now();
        let hour = chrono::Duration::hours(1);

        storage.insert_magic_link(link("old", now - hour)).await.unwrap();
        storage.insert_magic_link(link("live", now + hour)).await.unwrap();
        storage.insert_session(session("dead", now - hour, now - hour)).await.unwrap();
        // Access token expired but still refreshable
        storage.insert_session(session("idle", now - hour, now + hour)).await.unwrap();
        storage.insert_session(session("live", now + hour, now + hour * 2)).await.unwrap();

        let purged = storage.purge_expired(now).await.unwrap();
        assert_eq!(purged, PurgeCounts { magic_links: 1, sessions: 1 });
        assert_eq!(purged.total(), 2);

        assert!(storage.get_magic_link("old").await.unwrap().is_none());
        assert!(storage.get_magic_link("live").await.unwrap().is_some());
        assert!(storage.get_session("dead").await.unwrap().is_none());
        assert!(storage.find_session_by_refresh("r-idle").await.unwrap().is_some());

        assert_eq!(storage.purge_expired(now).await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_update_contract_rejects_stale_version() {
        let storage = InMemoryStorage::new();
        let contract = Contract::new(AccountId::generate(), "Retainer");
        storage.upsert_contract(contract.clone()).await.unwrap();

        let mut first = storage.get_contract(&contract.id).await.unwrap().unwrap();
        let mut second = first.clone();
        first.name = "First".to_string();
        second.name = "Second".to_string();

        assert!(storage.update_contract(first).await.unwrap());
        assert!(!storage.update_contract(second).await.unwrap());

        let stored = storage.get_contract(&contract.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "First");
        assert_eq!(stored.version, 1);

        let mut missing = Contract::new(AccountId::generate(), "Gone");
        missing.version = 0;
        assert!(!storage.update_contract(missing).await.unwrap());
    }

    #[tokio::test]
    async fn test_form_submissions_numbered_and_capped() {
        use portico_types::FormStatus;
        use serde_json::{json, Map};

        let storage = InMemoryStorage::new();
        let mut form = Form::new(AccountId::generate(), "Brief", vec![]);
        form.set_status(FormStatus::Published, Utc::now());
        storage.upsert_form(form.clone()).await.unwrap();

        let mut responses = Map::new();
        responses.insert("q".to_string(), json!("a"));
        let submission = FormSubmission::build(&form, responses, None, None, Utc::now()).unwrap();

        for expected in 1..=2 {
            let mut next = submission.clone();
            next.id = portico_types::FormSubmissionId::generate();
            let stored = storage
                .record_form_submission(next, Some(2))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(stored.submission_number, expected);
        }
        assert!(storage
            .record_form_submission(submission, Some(2))
            .await
            .unwrap()
            .is_none());

        // Re-saving the form keeps the stored counters
        storage.upsert_form(form.clone()).await.unwrap();
        let stored = storage.get_form(&form.id).await.unwrap().unwrap();
        assert_eq!(stored.total_submissions, 2);
        assert_eq!(storage.list_form_submissions(&form.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_mark_messages_read_by_sender() {
        let storage = InMemoryStorage::new();
        let account = AccountId::generate();
        let project = ProjectId::generate();

        for (sender, text) in [
            (SenderType::Client, "hi"),
            (SenderType::Client, "there"),
            (SenderType::User, "hello"),
        ] {
            storage
                .insert_message(Message::new(account, project, sender, "x", text))
                .await
                .unwrap();
        }

        let changed = storage
            .mark_messages_read(
                &account,
                &project,
                ReadScope::FromSender(SenderType::Client),
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(changed, 2);

        let messages = storage.list_messages(&account, &project).await.unwrap();
        assert_eq!(messages.iter().filter(|m| m.is_read).count(), 2);
    }
}
