//! PostgreSQL storage implementation
//!
//! Each table keeps the full record in a `data JSONB` column next to the columns
//! used for lookups. Fields that are updated in place by conditional statements
//! (allowlist `client_id`, magic-link `used_at`, portal `view_count`, message read
//! state, contract `version`, form submission counters) live in their own columns
//! and are overlaid on the decoded record.

use super::traits::*;
use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portico_types::{
    Account, AccountId, Activity, AllowlistEntry, AllowlistEntryId, BrandProfile, Client,
    ClientId, ClientSessionRecord, Contract, ContractId, FileApproval, FileId, FileRecord, Form,
    FormId, FormSubmission, Invoice, InvoiceId, MagicLinkRecord, Message, Portal, PortalId,
    Project, ProjectId, SenderType, UserId,
};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL-backed storage
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connect to PostgreSQL and initialize schema
    pub async fn new(
        url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let storage = Self { pool };
        storage.initialize_schema().await?;
        Ok(storage)
    }

    async fn initialize_schema(&self) -> Result<(), StorageError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id UUID PRIMARY KEY,
                company_slug TEXT,
                owner_slug TEXT,
                billing_customer_id TEXT,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS accounts_company_slug ON accounts(company_slug);"#,
            r#"CREATE INDEX IF NOT EXISTS accounts_owner_slug ON accounts(owner_slug);"#,
            r#"CREATE INDEX IF NOT EXISTS accounts_billing_customer ON accounts(billing_customer_id);"#,
            r#"
            CREATE TABLE IF NOT EXISTS clients (
                id UUID PRIMARY KEY,
                account_id UUID NOT NULL,
                email TEXT NOT NULL,
                data JSONB NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS clients_account_email ON clients(account_id, email);"#,
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                id UUID PRIMARY KEY,
                account_id UUID NOT NULL,
                last_activity_at TIMESTAMPTZ,
                data JSONB NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS client_allowlist (
                id UUID PRIMARY KEY,
                account_id UUID NOT NULL,
                email TEXT NOT NULL,
                client_id UUID,
                created_at TIMESTAMPTZ NOT NULL,
                data JSONB NOT NULL,
                UNIQUE (account_id, email)
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS client_allowlist_client ON client_allowlist(account_id, client_id);"#,
            r#"
            CREATE TABLE IF NOT EXISTS portals (
                id UUID PRIMARY KEY,
                account_id UUID NOT NULL,
                client_id UUID NOT NULL,
                view_count BIGINT NOT NULL DEFAULT 0,
                data JSONB NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS portals_account_client ON portals(account_id, client_id);"#,
            r#"
            CREATE TABLE IF NOT EXISTS magic_links (
                token_hash TEXT PRIMARY KEY,
                used_at TIMESTAMPTZ,
                expires_at TIMESTAMPTZ NOT NULL,
                data JSONB NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS client_sessions (
                session_hash TEXT PRIMARY KEY,
                refresh_hash TEXT NOT NULL UNIQUE,
                expires_at TIMESTAMPTZ NOT NULL,
                refresh_expires_at TIMESTAMPTZ,
                data JSONB NOT NULL
            );
            "#,
            r#"ALTER TABLE client_sessions ADD COLUMN IF NOT EXISTS refresh_expires_at TIMESTAMPTZ;"#,
            r#"CREATE INDEX IF NOT EXISTS magic_links_expires ON magic_links(expires_at);"#,
            r#"
            CREATE TABLE IF NOT EXISTS contracts (
                id UUID PRIMARY KEY,
                account_id UUID NOT NULL,
                client_id UUID,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                version BIGINT NOT NULL DEFAULT 0,
                data JSONB NOT NULL
            );
            "#,
            r#"ALTER TABLE contracts ADD COLUMN IF NOT EXISTS version BIGINT NOT NULL DEFAULT 0;"#,
            r#"CREATE INDEX IF NOT EXISTS contracts_account ON contracts(account_id, created_at DESC);"#,
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id UUID PRIMARY KEY,
                account_id UUID NOT NULL,
                client_id UUID,
                created_at TIMESTAMPTZ NOT NULL,
                data JSONB NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS files_account_client ON files(account_id, client_id);"#,
            r#"
            CREATE TABLE IF NOT EXISTS file_approvals (
                id UUID PRIMARY KEY,
                file_id UUID NOT NULL,
                decided_at TIMESTAMPTZ NOT NULL,
                data JSONB NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS invoices (
                id UUID PRIMARY KEY,
                account_id UUID NOT NULL,
                client_id UUID,
                share_token TEXT UNIQUE,
                created_at TIMESTAMPTZ NOT NULL,
                data JSONB NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id UUID PRIMARY KEY,
                account_id UUID NOT NULL,
                project_id UUID NOT NULL,
                sender_type TEXT NOT NULL,
                is_read BOOLEAN NOT NULL DEFAULT FALSE,
                read_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL,
                data JSONB NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS messages_project ON messages(account_id, project_id, created_at);"#,
            r#"
            CREATE TABLE IF NOT EXISTS activities (
                id UUID PRIMARY KEY,
                account_id UUID NOT NULL,
                project_id UUID,
                action TEXT NOT NULL,
                actor_id UUID,
                created_at TIMESTAMPTZ NOT NULL,
                data JSONB NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS activities_project ON activities(project_id, created_at DESC);"#,
            r#"CREATE INDEX IF NOT EXISTS invoices_account ON invoices(account_id, created_at DESC);"#,
            r#"
            CREATE TABLE IF NOT EXISTS forms (
                id UUID PRIMARY KEY,
                account_id UUID NOT NULL,
                total_submissions BIGINT NOT NULL DEFAULT 0,
                last_submission_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL,
                data JSONB NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS forms_account ON forms(account_id, created_at DESC);"#,
            r#"
            CREATE TABLE IF NOT EXISTS form_submissions (
                id UUID PRIMARY KEY,
                form_id UUID NOT NULL REFERENCES forms(id) ON DELETE CASCADE,
                submission_number BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                data JSONB NOT NULL,
                UNIQUE (form_id, submission_number)
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS brand_profiles (
                account_id UUID PRIMARY KEY,
                updated_at TIMESTAMPTZ NOT NULL,
                data JSONB NOT NULL
            );
            "#,
        ];

        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Query(e.to_string()))?;
        }

        Ok(())
    }

    fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, StorageError> {
        serde_json::to_value(value)
            .map_err(|e| StorageError::InvalidData(format!("json serialize error: {}", e)))
    }

    fn from_json<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, StorageError> {
        serde_json::from_value(value)
            .map_err(|e| StorageError::InvalidData(format!("json deserialize error: {}", e)))
    }

    fn decode<T: serde::de::DeserializeOwned>(row: &PgRow) -> Result<T, StorageError> {
        let data: Value = row
            .try_get("data")
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Self::from_json(data)
    }

    fn decode_all<T: serde::de::DeserializeOwned>(rows: Vec<PgRow>) -> StorageResult<Vec<T>> {
        rows.iter().map(Self::decode).collect()
    }

    fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StorageError>
    where
        T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    {
        row.try_get(name)
            .map_err(|e| StorageError::Query(e.to_string()))
    }

    fn decode_allowlist(row: &PgRow) -> StorageResult<AllowlistEntry> {
        let mut entry: AllowlistEntry = Self::decode(row)?;
        let client_id: Option<Uuid> = Self::column(row, "client_id")?;
        entry.client_id = client_id.map(ClientId::from_uuid);
        Ok(entry)
    }

    fn decode_portal(row: &PgRow) -> StorageResult<Portal> {
        let mut portal: Portal = Self::decode(row)?;
        let views: i64 = Self::column(row, "view_count")?;
        portal.view_count = views.max(0) as u64;
        Ok(portal)
    }

    fn decode_contract(row: &PgRow) -> StorageResult<Contract> {
        let mut contract: Contract = Self::decode(row)?;
        let version: i64 = Self::column(row, "version")?;
        contract.version = version.max(0) as u64;
        Ok(contract)
    }

    fn decode_form(row: &PgRow) -> StorageResult<Form> {
        let mut form: Form = Self::decode(row)?;
        let total: i64 = Self::column(row, "total_submissions")?;
        form.total_submissions = u32::try_from(total.max(0)).unwrap_or(u32::MAX);
        form.last_submission_at = Self::column(row, "last_submission_at")?;
        Ok(form)
    }

    fn decode_message(row: &PgRow) -> StorageResult<Message> {
        let mut message: Message = Self::decode(row)?;
        message.is_read = Self::column(row, "is_read")?;
        message.read_at = Self::column(row, "read_at")?;
        Ok(message)
    }

    fn sender_type_str(sender: SenderType) -> &'static str {
        match sender {
            SenderType::Client => "client",
            SenderType::User => "user",
        }
    }
}

fn query_error(e: sqlx::Error) -> StorageError {
    if let Some(db) = e.as_database_error() {
        if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return StorageError::Conflict(db.message().to_string());
        }
    }
    StorageError::Query(e.to_string())
}

#[async_trait]
impl AccountStorage for PostgresStorage {
    async fn get_account(&self, id: &AccountId) -> StorageResult<Option<Account>> {
        let row = sqlx::query("SELECT data FROM accounts WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn find_account_by_company_slug(&self, slug: &str) -> StorageResult<Option<Account>> {
        let row = sqlx::query(
            "SELECT data FROM accounts WHERE company_slug = $1 ORDER BY created_at LIMIT 1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn find_account_by_owner_slug(&self, slug: &str) -> StorageResult<Option<Account>> {
        let row = sqlx::query(
            "SELECT data FROM accounts WHERE owner_slug = $1 ORDER BY created_at LIMIT 1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn find_account_by_billing_customer(
        &self,
        customer_id: &str,
    ) -> StorageResult<Option<Account>> {
        let row = sqlx::query("SELECT data FROM accounts WHERE billing_customer_id = $1 LIMIT 1")
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn upsert_account(&self, account: Account) -> StorageResult<()> {
        let data = Self::to_json(&account)?;

        sqlx::query(
            r#"
            INSERT INTO accounts (id, company_slug, owner_slug, billing_customer_id, data, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id)
            DO UPDATE SET
                company_slug = EXCLUDED.company_slug,
                owner_slug = EXCLUDED.owner_slug,
                billing_customer_id = EXCLUDED.billing_customer_id,
                data = EXCLUDED.data
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(account.company_slug())
        .bind(account.owner_slug())
        .bind(account.billing_customer_id.as_deref())
        .bind(data)
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(())
    }
}

#[async_trait]
impl ClientStorage for PostgresStorage {
    async fn get_client(&self, id: &ClientId) -> StorageResult<Option<Client>> {
        let row = sqlx::query("SELECT data FROM clients WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn find_client_by_email(
        &self,
        account_id: &AccountId,
        email: &str,
    ) -> StorageResult<Option<Client>> {
        let row = sqlx::query("SELECT data FROM clients WHERE account_id = $1 AND email = $2 LIMIT 1")
            .bind(account_id.as_uuid())
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn list_clients(&self, account_id: &AccountId) -> StorageResult<Vec<Client>> {
        let rows = sqlx::query(
            r#"
            SELECT data FROM clients
            WHERE account_id = $1
            ORDER BY (data->>'created_at')::timestamptz DESC
            "#,
        )
        .bind(account_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;
        Self::decode_all(rows)
    }

    async fn upsert_client(&self, client: Client) -> StorageResult<()> {
        let data = Self::to_json(&client)?;

        sqlx::query(
            r#"
            INSERT INTO clients (id, account_id, email, data)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id)
            DO UPDATE SET email = EXCLUDED.email, data = EXCLUDED.data
            "#,
        )
        .bind(client.id.as_uuid())
        .bind(client.account_id.as_uuid())
        .bind(&client.email)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn get_project(&self, id: &ProjectId) -> StorageResult<Option<Project>> {
        let row = sqlx::query("SELECT data, last_activity_at FROM projects WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let mut project: Project = Self::decode(&row)?;
                project.last_activity_at = Self::column(&row, "last_activity_at")?;
                Ok(Some(project))
            }
            None => Ok(None),
        }
    }

    async fn list_projects(&self, account_id: &AccountId) -> StorageResult<Vec<Project>> {
        let rows = sqlx::query(
            r#"
            SELECT data, last_activity_at FROM projects
            WHERE account_id = $1
            ORDER BY (data->>'created_at')::timestamptz DESC
            "#,
        )
        .bind(account_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|row| {
                let mut project: Project = Self::decode(row)?;
                project.last_activity_at = Self::column(row, "last_activity_at")?;
                Ok(project)
            })
            .collect()
    }

    async fn upsert_project(&self, project: Project) -> StorageResult<()> {
        let data = Self::to_json(&project)?;

        sqlx::query(
            r#"
            INSERT INTO projects (id, account_id, last_activity_at, data)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id)
            DO UPDATE SET last_activity_at = EXCLUDED.last_activity_at, data = EXCLUDED.data
            "#,
        )
        .bind(project.id.as_uuid())
        .bind(project.account_id.as_uuid())
        .bind(project.last_activity_at)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn touch_project(&self, id: &ProjectId, at: DateTime<Utc>) -> StorageResult<()> {
        sqlx::query("UPDATE projects SET last_activity_at = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(())
    }
}

#[async_trait]
impl AllowlistStorage for PostgresStorage {
    async fn get_allowlist_entry(
        &self,
        id: &AllowlistEntryId,
    ) -> StorageResult<Option<AllowlistEntry>> {
        let row = sqlx::query("SELECT data, client_id FROM client_allowlist WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;
        row.as_ref().map(Self::decode_allowlist).transpose()
    }

    async fn find_allowlist_entry(
        &self,
        account_id: &AccountId,
        email: &str,
    ) -> StorageResult<Option<AllowlistEntry>> {
        let row = sqlx::query(
            "SELECT data, client_id FROM client_allowlist WHERE account_id = $1 AND email = $2",
        )
        .bind(account_id.as_uuid())
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;
        row.as_ref().map(Self::decode_allowlist).transpose()
    }

    async fn list_allowlist(&self, account_id: &AccountId) -> StorageResult<Vec<AllowlistEntry>> {
        let rows = sqlx::query(
            "SELECT data, client_id FROM client_allowlist WHERE account_id = $1 ORDER BY created_at",
        )
        .bind(account_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;
        rows.iter().map(Self::decode_allowlist).collect()
    }

    async fn list_allowlist_for_client(
        &self,
        account_id: &AccountId,
        client_id: &ClientId,
    ) -> StorageResult<Vec<AllowlistEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT data, client_id FROM client_allowlist
            WHERE account_id = $1 AND client_id = $2
            ORDER BY created_at
            "#,
        )
        .bind(account_id.as_uuid())
        .bind(client_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;
        rows.iter().map(Self::decode_allowlist).collect()
    }

    async fn insert_allowlist_entry(&self, entry: AllowlistEntry) -> StorageResult<()> {
        let data = Self::to_json(&entry)?;

        sqlx::query(
            r#"
            INSERT INTO client_allowlist (id, account_id, email, client_id, created_at, data)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.account_id.as_uuid())
        .bind(&entry.email)
        .bind(entry.client_id.map(|c| *c.as_uuid()))
        .bind(entry.created_at)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn update_allowlist_entry(&self, entry: AllowlistEntry) -> StorageResult<()> {
        let data = Self::to_json(&entry)?;

        let result = sqlx::query(
            "UPDATE client_allowlist SET client_id = $2, data = $3 WHERE id = $1",
        )
        .bind(entry.id.as_uuid())
        .bind(entry.client_id.map(|c| *c.as_uuid()))
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!(
                "Allowlist entry {} not found",
                entry.id
            )));
        }
        Ok(())
    }

    async fn link_allowlist_client(
        &self,
        id: &AllowlistEntryId,
        client_id: &ClientId,
    ) -> StorageResult<Option<ClientId>> {
        sqlx::query(
            "UPDATE client_allowlist SET client_id = $2 WHERE id = $1 AND client_id IS NULL",
        )
        .bind(id.as_uuid())
        .bind(client_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        let row = sqlx::query("SELECT client_id FROM client_allowlist WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let linked: Option<Uuid> = Self::column(&row, "client_id")?;
                Ok(linked.map(ClientId::from_uuid))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PortalStorage for PostgresStorage {
    async fn get_portal(&self, id: &PortalId) -> StorageResult<Option<Portal>> {
        let row = sqlx::query("SELECT data, view_count FROM portals WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;
        row.as_ref().map(Self::decode_portal).transpose()
    }

    async fn find_portal_for_client(
        &self,
        account_id: &AccountId,
        client_id: &ClientId,
    ) -> StorageResult<Option<Portal>> {
        let row = sqlx::query(
            "SELECT data, view_count FROM portals WHERE account_id = $1 AND client_id = $2 LIMIT 1",
        )
        .bind(account_id.as_uuid())
        .bind(client_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;
        row.as_ref().map(Self::decode_portal).transpose()
    }

    async fn list_portals_for_account(&self, account_id: &AccountId) -> StorageResult<Vec<Portal>> {
        let rows = sqlx::query("SELECT data, view_count FROM portals WHERE account_id = $1")
            .bind(account_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        rows.iter().map(Self::decode_portal).collect()
    }

    async fn upsert_portal(&self, portal: Portal) -> StorageResult<()> {
        let data = Self::to_json(&portal)?;

        sqlx::query(
            r#"
            INSERT INTO portals (id, account_id, client_id, view_count, data)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id)
            DO UPDATE SET client_id = EXCLUDED.client_id, data = EXCLUDED.data
            "#,
        )
        .bind(portal.id.as_uuid())
        .bind(portal.account_id.as_uuid())
        .bind(portal.client_id.as_uuid())
        .bind(portal.view_count as i64)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn increment_portal_views(&self, id: &PortalId) -> StorageResult<Option<u64>> {
        let row = sqlx::query(
            "UPDATE portals SET view_count = view_count + 1 WHERE id = $1 RETURNING view_count",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        match row {
            Some(row) => {
                let views: i64 = Self::column(&row, "view_count")?;
                Ok(Some(views.max(0) as u64))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl AuthStorage for PostgresStorage {
    async fn insert_magic_link(&self, link: MagicLinkRecord) -> StorageResult<()> {
        let data = Self::to_json(&link)?;

        sqlx::query(
            "INSERT INTO magic_links (token_hash, used_at, expires_at, data) VALUES ($1, $2, $3, $4)",
        )
        .bind(&link.token_hash)
        .bind(link.used_at)
        .bind(link.expires_at)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn get_magic_link(&self, token_hash: &str) -> StorageResult<Option<MagicLinkRecord>> {
        let row = sqlx::query("SELECT data, used_at FROM magic_links WHERE token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let mut link: MagicLinkRecord = Self::decode(&row)?;
                link.used_at = Self::column(&row, "used_at")?;
                Ok(Some(link))
            }
            None => Ok(None),
        }
    }

    async fn consume_magic_link(&self, token_hash: &str, at: DateTime<Utc>) -> StorageResult<bool> {
        let result = sqlx::query(
            "UPDATE magic_links SET used_at = $2 WHERE token_hash = $1 AND used_at IS NULL",
        )
        .bind(token_hash)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_session(&self, session: ClientSessionRecord) -> StorageResult<()> {
        let data = Self::to_json(&session)?;

        sqlx::query(
            r#"
            INSERT INTO client_sessions (session_hash, refresh_hash, expires_at, refresh_expires_at, data)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&session.session_hash)
        .bind(&session.refresh_hash)
        .bind(session.expires_at)
        .bind(session.refresh_expires_at)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn get_session(&self, session_hash: &str) -> StorageResult<Option<ClientSessionRecord>> {
        let row = sqlx::query("SELECT data FROM client_sessions WHERE session_hash = $1")
            .bind(session_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn find_session_by_refresh(
        &self,
        refresh_hash: &str,
    ) -> StorageResult<Option<ClientSessionRecord>> {
        let row = sqlx::query("SELECT data FROM client_sessions WHERE refresh_hash = $1")
            .bind(refresh_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn delete_session(&self, session_hash: &str) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM client_sessions WHERE session_hash = $1")
            .bind(session_hash)
            .execute(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StorageResult<PurgeCounts> {
        let links = sqlx::query("DELETE FROM magic_links WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(query_error)?;

        // Rows written before refresh_expires_at had a column fall back to the access expiry.
        let sessions = sqlx::query(
            "DELETE FROM client_sessions WHERE COALESCE(refresh_expires_at, expires_at) <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(PurgeCounts {
            magic_links: links.rows_affected() as usize,
            sessions: sessions.rows_affected() as usize,
        })
    }
}

#[async_trait]
impl ContractStorage for PostgresStorage {
    async fn get_contract(&self, id: &ContractId) -> StorageResult<Option<Contract>> {
        let row = sqlx::query("SELECT data, version FROM contracts WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;
        row.as_ref().map(Self::decode_contract).transpose()
    }

    async fn list_contracts(&self, account_id: &AccountId) -> StorageResult<Vec<Contract>> {
        let rows = sqlx::query(
            "SELECT data, version FROM contracts WHERE account_id = $1 ORDER BY created_at DESC",
        )
        .bind(account_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;
        rows.iter().map(Self::decode_contract).collect()
    }

    async fn list_contracts_for_client(
        &self,
        account_id: &AccountId,
        client_id: &ClientId,
    ) -> StorageResult<Vec<Contract>> {
        let rows = sqlx::query(
            r#"
            SELECT data, version FROM contracts
            WHERE account_id = $1 AND client_id = $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(account_id.as_uuid())
        .bind(client_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;
        rows.iter().map(Self::decode_contract).collect()
    }

    async fn upsert_contract(&self, contract: Contract) -> StorageResult<()> {
        let data = Self::to_json(&contract)?;

        sqlx::query(
            r#"
            INSERT INTO contracts (id, account_id, client_id, status, created_at, updated_at, version, data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id)
            DO UPDATE SET
                client_id = EXCLUDED.client_id,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at,
                version = contracts.version + 1,
                data = EXCLUDED.data
            "#,
        )
        .bind(contract.id.as_uuid())
        .bind(contract.account_id.as_uuid())
        .bind(contract.client_id.map(|c| *c.as_uuid()))
        .bind(contract.status.as_str())
        .bind(contract.created_at)
        .bind(contract.updated_at)
        .bind(contract.version as i64)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn update_contract(&self, contract: Contract) -> StorageResult<bool> {
        let data = Self::to_json(&contract)?;

        let result = sqlx::query(
            r#"
            UPDATE contracts SET
                client_id = $3,
                status = $4,
                updated_at = $5,
                version = version + 1,
                data = $6
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(contract.id.as_uuid())
        .bind(contract.version as i64)
        .bind(contract.client_id.map(|c| *c.as_uuid()))
        .bind(contract.status.as_str())
        .bind(contract.updated_at)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl FileStorage for PostgresStorage {
    async fn get_file(&self, id: &FileId) -> StorageResult<Option<FileRecord>> {
        let row = sqlx::query("SELECT data FROM files WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn list_files_for_client(
        &self,
        account_id: &AccountId,
        client_id: &ClientId,
    ) -> StorageResult<Vec<FileRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT data FROM files
            WHERE account_id = $1 AND client_id = $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(account_id.as_uuid())
        .bind(client_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;
        Self::decode_all(rows)
    }

    async fn upsert_file(&self, file: FileRecord) -> StorageResult<()> {
        let data = Self::to_json(&file)?;

        sqlx::query(
            r#"
            INSERT INTO files (id, account_id, client_id, created_at, data)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id)
            DO UPDATE SET client_id = EXCLUDED.client_id, data = EXCLUDED.data
            "#,
        )
        .bind(file.id.as_uuid())
        .bind(file.account_id.as_uuid())
        .bind(file.client_id.map(|c| *c.as_uuid()))
        .bind(file.created_at)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn insert_file_approval(&self, approval: FileApproval) -> StorageResult<()> {
        let data = Self::to_json(&approval)?;

        sqlx::query(
            "INSERT INTO file_approvals (id, file_id, decided_at, data) VALUES ($1, $2, $3, $4)",
        )
        .bind(approval.id.as_uuid())
        .bind(approval.file_id.as_uuid())
        .bind(approval.decided_at)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn list_file_approvals(&self, file_id: &FileId) -> StorageResult<Vec<FileApproval>> {
        let rows = sqlx::query(
            "SELECT data FROM file_approvals WHERE file_id = $1 ORDER BY decided_at",
        )
        .bind(file_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;
        Self::decode_all(rows)
    }
}

#[async_trait]
impl InvoiceStorage for PostgresStorage {
    async fn get_invoice(&self, id: &InvoiceId) -> StorageResult<Option<Invoice>> {
        let row = sqlx::query("SELECT data FROM invoices WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn find_invoice_by_share_token(&self, token: &str) -> StorageResult<Option<Invoice>> {
        let row = sqlx::query("SELECT data FROM invoices WHERE share_token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn list_invoices(&self, account_id: &AccountId) -> StorageResult<Vec<Invoice>> {
        let rows = sqlx::query(
            "SELECT data FROM invoices WHERE account_id = $1 ORDER BY created_at DESC",
        )
        .bind(account_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;
        Self::decode_all(rows)
    }

    async fn list_invoices_for_client(
        &self,
        account_id: &AccountId,
        client_id: &ClientId,
    ) -> StorageResult<Vec<Invoice>> {
        let rows = sqlx::query(
            r#"
            SELECT data FROM invoices
            WHERE account_id = $1 AND client_id = $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(account_id.as_uuid())
        .bind(client_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;
        Self::decode_all(rows)
    }

    async fn upsert_invoice(&self, invoice: Invoice) -> StorageResult<()> {
        let data = Self::to_json(&invoice)?;

        sqlx::query(
            r#"
            INSERT INTO invoices (id, account_id, client_id, share_token, created_at, data)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id)
            DO UPDATE SET
                client_id = EXCLUDED.client_id,
                share_token = EXCLUDED.share_token,
                data = EXCLUDED.data
            "#,
        )
        .bind(invoice.id.as_uuid())
        .bind(invoice.account_id.as_uuid())
        .bind(invoice.client_id.map(|c| *c.as_uuid()))
        .bind(invoice.share_token.as_deref())
        .bind(invoice.created_at)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(())
    }
}

#[async_trait]
impl MessageStorage for PostgresStorage {
    async fn list_messages(
        &self,
        account_id: &AccountId,
        project_id: &ProjectId,
    ) -> StorageResult<Vec<Message>> {
        let rows = sqlx::query(
            r#"
            SELECT data, is_read, read_at FROM messages
            WHERE account_id = $1 AND project_id = $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(account_id.as_uuid())
        .bind(project_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;
        rows.iter().map(Self::decode_message).collect()
    }

    async fn insert_message(&self, message: Message) -> StorageResult<()> {
        let data = Self::to_json(&message)?;

        sqlx::query(
            r#"
            INSERT INTO messages (id, account_id, project_id, sender_type, is_read, read_at, created_at, data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(message.id.as_uuid())
        .bind(message.account_id.as_uuid())
        .bind(message.project_id.as_uuid())
        .bind(Self::sender_type_str(message.sender_type))
        .bind(message.is_read)
        .bind(message.read_at)
        .bind(message.created_at)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn mark_messages_read(
        &self,
        account_id: &AccountId,
        project_id: &ProjectId,
        scope: ReadScope,
        at: DateTime<Utc>,
    ) -> StorageResult<usize> {
        let result = match scope {
            ReadScope::Ids(ids) => {
                let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
                sqlx::query(
                    r#"
                    UPDATE messages SET is_read = TRUE, read_at = $3
                    WHERE account_id = $1 AND project_id = $2 AND is_read = FALSE AND id = ANY($4)
                    "#,
                )
                .bind(account_id.as_uuid())
                .bind(project_id.as_uuid())
                .bind(at)
                .bind(ids)
                .execute(&self.pool)
                .await
            }
            ReadScope::FromSender(sender) => {
                sqlx::query(
                    r#"
                    UPDATE messages SET is_read = TRUE, read_at = $3
                    WHERE account_id = $1 AND project_id = $2 AND is_read = FALSE AND sender_type = $4
                    "#,
                )
                .bind(account_id.as_uuid())
                .bind(project_id.as_uuid())
                .bind(at)
                .bind(Self::sender_type_str(sender))
                .execute(&self.pool)
                .await
            }
        }
        .map_err(query_error)?;

        Ok(result.rows_affected() as usize)
    }
}

#[async_trait]
impl ActivityStorage for PostgresStorage {
    async fn insert_activity(&self, activity: Activity) -> StorageResult<()> {
        let data = Self::to_json(&activity)?;

        sqlx::query(
            r#"
            INSERT INTO activities (id, account_id, project_id, action, actor_id, created_at, data)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(activity.id.as_uuid())
        .bind(activity.account_id.as_uuid())
        .bind(activity.project_id.map(|p| *p.as_uuid()))
        .bind(&activity.action)
        .bind(activity.actor_id.map(|a| *a.as_uuid()))
        .bind(activity.created_at)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn find_recent_activity(
        &self,
        project_id: &ProjectId,
        action: &str,
        actor_id: &UserId,
        since: DateTime<Utc>,
    ) -> StorageResult<Option<Activity>> {
        let row = sqlx::query(
            r#"
            SELECT data FROM activities
            WHERE project_id = $1 AND action = $2 AND actor_id = $3 AND created_at >= $4
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(project_id.as_uuid())
        .bind(action)
        .bind(actor_id.as_uuid())
        .bind(since)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn list_activities(
        &self,
        account_id: &AccountId,
        project_id: &ProjectId,
        limit: usize,
    ) -> StorageResult<Vec<Activity>> {
        let rows = sqlx::query(
            r#"
            SELECT data FROM activities
            WHERE account_id = $1 AND project_id = $2
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(account_id.as_uuid())
        .bind(project_id.as_uuid())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;
        Self::decode_all(rows)
    }
}

#[async_trait]
impl BrandProfileStorage for PostgresStorage {
    async fn get_brand_profile(
        &self,
        account_id: &AccountId,
    ) -> StorageResult<Option<BrandProfile>> {
        let row = sqlx::query("SELECT data FROM brand_profiles WHERE account_id = $1")
            .bind(account_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn upsert_brand_profile(
        &self,
        account_id: &AccountId,
        mut profile: BrandProfile,
    ) -> StorageResult<()> {
        profile.account_id = Some(*account_id);
        let data = Self::to_json(&profile)?;

        sqlx::query(
            r#"
            INSERT INTO brand_profiles (account_id, updated_at, data)
            VALUES ($1, $2, $3)
            ON CONFLICT (account_id)
            DO UPDATE SET updated_at = EXCLUDED.updated_at, data = EXCLUDED.data
            "#,
        )
        .bind(account_id.as_uuid())
        .bind(Utc::now())
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(())
    }
}

#[async_trait]
impl FormStorage for PostgresStorage {
    async fn get_form(&self, id: &FormId) -> StorageResult<Option<Form>> {
        let row = sqlx::query(
            "SELECT data, total_submissions, last_submission_at FROM forms WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;
        row.as_ref().map(Self::decode_form).transpose()
    }

    async fn list_forms(&self, account_id: &AccountId) -> StorageResult<Vec<Form>> {
        let rows = sqlx::query(
            r#"
            SELECT data, total_submissions, last_submission_at FROM forms
            WHERE account_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(account_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;
        rows.iter().map(Self::decode_form).collect()
    }

    async fn upsert_form(&self, form: Form) -> StorageResult<()> {
        let data = Self::to_json(&form)?;

        sqlx::query(
            r#"
            INSERT INTO forms (id, account_id, total_submissions, last_submission_at, created_at, data)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id)
            DO UPDATE SET data = EXCLUDED.data
            "#,
        )
        .bind(form.id.as_uuid())
        .bind(form.account_id.as_uuid())
        .bind(i64::from(form.total_submissions))
        .bind(form.last_submission_at)
        .bind(form.created_at)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn record_form_submission(
        &self,
        mut submission: FormSubmission,
        max_submissions: Option<u32>,
    ) -> StorageResult<Option<FormSubmission>> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;

        let row = sqlx::query(
            r#"
            UPDATE forms
            SET total_submissions = total_submissions + 1, last_submission_at = $2
            WHERE id = $1 AND ($3::BIGINT IS NULL OR total_submissions < $3)
            RETURNING total_submissions
            "#,
        )
        .bind(submission.form_id.as_uuid())
        .bind(submission.created_at)
        .bind(max_submissions.map(i64::from))
        .fetch_optional(&mut *tx)
        .await
        .map_err(query_error)?;

        let Some(row) = row else {
            tx.rollback().await.map_err(query_error)?;
            return Ok(None);
        };
        let number: i64 = Self::column(&row, "total_submissions")?;
        submission.submission_number = u32::try_from(number.max(0)).unwrap_or(u32::MAX);

        let data = Self::to_json(&submission)?;
        sqlx::query(
            r#"
            INSERT INTO form_submissions (id, form_id, submission_number, created_at, data)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(submission.id.as_uuid())
        .bind(submission.form_id.as_uuid())
        .bind(number)
        .bind(submission.created_at)
        .bind(data)
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        tx.commit().await.map_err(query_error)?;
        Ok(Some(submission))
    }

    async fn list_form_submissions(&self, form_id: &FormId) -> StorageResult<Vec<FormSubmission>> {
        let rows = sqlx::query(
            "SELECT data FROM form_submissions WHERE form_id = $1 ORDER BY submission_number",
        )
        .bind(form_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;
        Self::decode_all(rows)
    }
}

impl Storage for PostgresStorage {}
