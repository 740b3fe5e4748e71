//! Storage trait definitions

use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portico_types::{
    Account, AccountId, Activity, AllowlistEntry, AllowlistEntryId, BrandProfile, Client,
    ClientId, ClientSessionRecord, Contract, ContractId, FileApproval, FileId, FileRecord, Form,
    FormId, FormSubmission, Invoice, InvoiceId, MagicLinkRecord, Message, MessageId, Portal,
    PortalId, Project, ProjectId, SenderType, UserId,
};

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Combined storage trait
#[async_trait]
pub trait Storage:
    AccountStorage
    + ClientStorage
    + AllowlistStorage
    + PortalStorage
    + AuthStorage
    + ContractStorage
    + FileStorage
    + InvoiceStorage
    + MessageStorage
    + ActivityStorage
    + BrandProfileStorage
    + FormStorage
    + Send
    + Sync
{
}

/// Storage for tenant accounts
#[async_trait]
pub trait AccountStorage: Send + Sync {
    async fn get_account(&self, id: &AccountId) -> StorageResult<Option<Account>>;

    /// Account whose derived company slug equals `slug`
    async fn find_account_by_company_slug(&self, slug: &str) -> StorageResult<Option<Account>>;

    /// Account whose owner-name slug equals `slug`
    async fn find_account_by_owner_slug(&self, slug: &str) -> StorageResult<Option<Account>>;

    async fn find_account_by_billing_customer(
        &self,
        customer_id: &str,
    ) -> StorageResult<Option<Account>>;

    async fn upsert_account(&self, account: Account) -> StorageResult<()>;
}

/// Storage for clients and projects
#[async_trait]
pub trait ClientStorage: Send + Sync {
    async fn get_client(&self, id: &ClientId) -> StorageResult<Option<Client>>;

    /// Client of `account_id` with the given normalized email
    async fn find_client_by_email(
        &self,
        account_id: &AccountId,
        email: &str,
    ) -> StorageResult<Option<Client>>;

    /// Clients of an account, newest first
    async fn list_clients(&self, account_id: &AccountId) -> StorageResult<Vec<Client>>;

    async fn upsert_client(&self, client: Client) -> StorageResult<()>;

    /// Projects of an account, newest first
    async fn list_projects(&self, account_id: &AccountId) -> StorageResult<Vec<Project>>;

    async fn get_project(&self, id: &ProjectId) -> StorageResult<Option<Project>>;

    async fn upsert_project(&self, project: Project) -> StorageResult<()>;

    /// Stamp the project's last activity time
    async fn touch_project(&self, id: &ProjectId, at: DateTime<Utc>) -> StorageResult<()>;
}

/// Storage for the per-account portal allowlist
#[async_trait]
pub trait AllowlistStorage: Send + Sync {
    async fn get_allowlist_entry(
        &self,
        id: &AllowlistEntryId,
    ) -> StorageResult<Option<AllowlistEntry>>;

    /// Row for (account, normalized email), active or not
    async fn find_allowlist_entry(
        &self,
        account_id: &AccountId,
        email: &str,
    ) -> StorageResult<Option<AllowlistEntry>>;

    /// Every allowlist row of an account, oldest first
    async fn list_allowlist(&self, account_id: &AccountId) -> StorageResult<Vec<AllowlistEntry>>;

    async fn list_allowlist_for_client(
        &self,
        account_id: &AccountId,
        client_id: &ClientId,
    ) -> StorageResult<Vec<AllowlistEntry>>;

    /// Insert a new row; `Conflict` when (account, email) already exists
    async fn insert_allowlist_entry(&self, entry: AllowlistEntry) -> StorageResult<()>;

    async fn update_allowlist_entry(&self, entry: AllowlistEntry) -> StorageResult<()>;

    /// Set `client_id` only where it is still unset; returns the client id the row ends up with
    async fn link_allowlist_client(
        &self,
        id: &AllowlistEntryId,
        client_id: &ClientId,
    ) -> StorageResult<Option<ClientId>>;
}

/// Storage for portals
#[async_trait]
pub trait PortalStorage: Send + Sync {
    async fn get_portal(&self, id: &PortalId) -> StorageResult<Option<Portal>>;

    async fn find_portal_for_client(
        &self,
        account_id: &AccountId,
        client_id: &ClientId,
    ) -> StorageResult<Option<Portal>>;

    async fn list_portals_for_account(&self, account_id: &AccountId) -> StorageResult<Vec<Portal>>;

    async fn upsert_portal(&self, portal: Portal) -> StorageResult<()>;

    /// Increment the view counter, returning the new count
    async fn increment_portal_views(&self, id: &PortalId) -> StorageResult<Option<u64>>;
}

/// Storage for magic links and portal sessions
#[async_trait]
pub trait AuthStorage: Send + Sync {
    async fn insert_magic_link(&self, link: MagicLinkRecord) -> StorageResult<()>;

    async fn get_magic_link(&self, token_hash: &str) -> StorageResult<Option<MagicLinkRecord>>;

    /// Mark a link used if it is still unused; false when another request got there first
    async fn consume_magic_link(&self, token_hash: &str, at: DateTime<Utc>) -> StorageResult<bool>;

    async fn insert_session(&self, session: ClientSessionRecord) -> StorageResult<()>;

    async fn get_session(&self, session_hash: &str) -> StorageResult<Option<ClientSessionRecord>>;

    async fn find_session_by_refresh(
        &self,
        refresh_hash: &str,
    ) -> StorageResult<Option<ClientSessionRecord>>;

    async fn delete_session(&self, session_hash: &str) -> StorageResult<bool>;

    /// Drop magic links past their expiry and sessions that can no longer be refreshed
    async fn purge_expired(&self, now: DateTime<Utc>) -> StorageResult<PurgeCounts>;
}

/// Rows removed by [`AuthStorage::purge_expired`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeCounts {
    pub magic_links: usize,
    pub sessions: usize,
}

impl PurgeCounts {
    pub fn total(&self) -> usize {
        self.magic_links + self.sessions
    }
}

/// Storage for contracts
#[async_trait]
pub trait ContractStorage: Send + Sync {
    async fn get_contract(&self, id: &ContractId) -> StorageResult<Option<Contract>>;

    /// Contracts of an account, newest first
    async fn list_contracts(&self, account_id: &AccountId) -> StorageResult<Vec<Contract>>;

    async fn list_contracts_for_client(
        &self,
        account_id: &AccountId,
        client_id: &ClientId,
    ) -> StorageResult<Vec<Contract>>;

    /// Unconditional write; bumps the stored version so in-flight guarded updates fail
    async fn upsert_contract(&self, contract: Contract) -> StorageResult<()>;

    /// Write `contract` only if the stored version still equals `contract.version`.
    ///
    /// Returns false when the row changed since it was read (or is gone); the
    /// stored version is incremented on success.
    async fn update_contract(&self, contract: Contract) -> StorageResult<bool>;
}

/// Storage for file metadata and approvals
#[async_trait]
pub trait FileStorage: Send + Sync {
    async fn get_file(&self, id: &FileId) -> StorageResult<Option<FileRecord>>;

    /// Files shared with or uploaded by a client, newest first
    async fn list_files_for_client(
        &self,
        account_id: &AccountId,
        client_id: &ClientId,
    ) -> StorageResult<Vec<FileRecord>>;

    async fn upsert_file(&self, file: FileRecord) -> StorageResult<()>;

    async fn insert_file_approval(&self, approval: FileApproval) -> StorageResult<()>;

    async fn list_file_approvals(&self, file_id: &FileId) -> StorageResult<Vec<FileApproval>>;
}

/// Storage for invoices
#[async_trait]
pub trait InvoiceStorage: Send + Sync {
    async fn get_invoice(&self, id: &InvoiceId) -> StorageResult<Option<Invoice>>;

    async fn find_invoice_by_share_token(&self, token: &str) -> StorageResult<Option<Invoice>>;

    /// Invoices of an account, newest first
    async fn list_invoices(&self, account_id: &AccountId) -> StorageResult<Vec<Invoice>>;

    async fn list_invoices_for_client(
        &self,
        account_id: &AccountId,
        client_id: &ClientId,
    ) -> StorageResult<Vec<Invoice>>;

    async fn upsert_invoice(&self, invoice: Invoice) -> StorageResult<()>;
}

/// Which messages a read receipt applies to
#[derive(Debug, Clone, PartialEq)]
pub enum ReadScope {
    /// Exactly these messages
    Ids(Vec<MessageId>),
    /// Every unread message of the project sent by this party
    FromSender(SenderType),
}

/// Storage for project messages
#[async_trait]
pub trait MessageStorage: Send + Sync {
    /// Messages of a project, oldest first
    async fn list_messages(
        &self,
        account_id: &AccountId,
        project_id: &ProjectId,
    ) -> StorageResult<Vec<Message>>;

    async fn insert_message(&self, message: Message) -> StorageResult<()>;

    /// Mark messages read, returning how many changed
    async fn mark_messages_read(
        &self,
        account_id: &AccountId,
        project_id: &ProjectId,
        scope: ReadScope,
        at: DateTime<Utc>,
    ) -> StorageResult<usize>;
}

/// Storage for the activity feed
#[async_trait]
pub trait ActivityStorage: Send + Sync {
    async fn insert_activity(&self, activity: Activity) -> StorageResult<()>;

    /// Most recent entry for (project, action, actor) created at or after `since`
    async fn find_recent_activity(
        &self,
        project_id: &ProjectId,
        action: &str,
        actor_id: &UserId,
        since: DateTime<Utc>,
    ) -> StorageResult<Option<Activity>>;

    /// Activities of a project, newest first
    async fn list_activities(
        &self,
        account_id: &AccountId,
        project_id: &ProjectId,
        limit: usize,
    ) -> StorageResult<Vec<Activity>>;
}

/// Storage for brand profiles
#[async_trait]
pub trait BrandProfileStorage: Send + Sync {
    async fn get_brand_profile(&self, account_id: &AccountId)
        -> StorageResult<Option<BrandProfile>>;

    async fn upsert_brand_profile(
        &self,
        account_id: &AccountId,
        profile: BrandProfile,
    ) -> StorageResult<()>;
}

/// Storage for forms and their submissions
#[async_trait]
pub trait FormStorage: Send + Sync {
    async fn get_form(&self, id: &FormId) -> StorageResult<Option<Form>>;

    /// Forms of an account, newest first
    async fn list_forms(&self, account_id: &AccountId) -> StorageResult<Vec<Form>>;

    /// Insert or update a form; the submission counters are left as stored
    async fn upsert_form(&self, form: Form) -> StorageResult<()>;

    /// Count the submission against its form and insert it, numbering it in order.
    ///
    /// Returns `None` without inserting when the form is gone or already holds
    /// `max_submissions` responses.
    async fn record_form_submission(
        &self,
        submission: FormSubmission,
        max_submissions: Option<u32>,
    ) -> StorageResult<Option<FormSubmission>>;

    /// Submissions of a form, oldest first
    async fn list_form_submissions(&self, form_id: &FormId) -> StorageResult<Vec<FormSubmission>>;
}
