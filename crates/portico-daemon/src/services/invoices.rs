//! Invoice authoring, share links and the portal invoice list

use super::{require_owned_client, require_owned_project, AgencyUser, PortalIdentity};
use crate::error::{ServiceError, ServiceResult};
use crate::storage::Storage;
use chrono::{NaiveDate, Utc};
use portico_types::{
    clean_share_token, generate_share_token, line_items_total, AccountId, Activity, ClientId,
    Invoice, InvoiceId, InvoiceStatus, LineItem, ProjectId,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

const SHARE_TOKEN_ATTEMPTS: usize = 5;
const FALLBACK_COMPANY_SLUG: &str = "company";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShareLink {
    pub share_token: String,
    pub share_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewInvoice {
    pub client_id: Option<ClientId>,
    pub project_id: Option<ProjectId>,
    pub invoice_number: Option<String>,
    pub title: Option<String>,
    pub currency: Option<String>,
    pub line_items: Vec<LineItem>,
    /// Used only when there are no line items
    pub total_cents: Option<i64>,
    pub due_date: Option<NaiveDate>,
}

/// Edits allowed while an invoice is still a draft
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InvoiceChanges {
    pub title: Option<String>,
    pub currency: Option<String>,
    pub line_items: Option<Vec<LineItem>>,
    pub total_cents: Option<i64>,
    pub due_date: Option<NaiveDate>,
}

fn not_found() -> ServiceError {
    ServiceError::NotFound("Invoice not found".to_string())
}

/// Total in cents from line items, or the explicit amount when there are none
fn invoice_total(items: &[LineItem], explicit: Option<i64>) -> ServiceResult<i64> {
    let total = if items.is_empty() {
        explicit.ok_or_else(|| {
            ServiceError::BadRequest("Line items or a total are required".to_string())
        })?
    } else {
        if items.iter().any(|i| i.description.trim().is_empty() || i.quantity == 0) {
            return Err(ServiceError::Validation(
                "Line items need a description and a quantity".to_string(),
            ));
        }
        line_items_total(items)
            .ok_or_else(|| ServiceError::Validation("Invoice total is too large".to_string()))?
    };
    if total < 0 {
        return Err(ServiceError::Validation(
            "Invoice total cannot be negative".to_string(),
        ));
    }
    Ok(total)
}

fn line_items_json(items: &[LineItem]) -> ServiceResult<serde_json::Value> {
    serde_json::to_value(items)
        .map_err(|e| ServiceError::Internal(format!("line item encoding failed: {}", e)))
}

/// An invoice as shown on its public page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicInvoice {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub company_name: String,
}

#[derive(Clone)]
pub struct InvoiceService {
    storage: Arc<dyn Storage>,
    public_base_url: String,
}

impl InvoiceService {
    pub fn new(storage: Arc<dyn Storage>, public_base_url: String) -> Self {
        Self {
            storage,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn list(&self, account_id: &AccountId) -> ServiceResult<Vec<Invoice>> {
        Ok(self.storage.list_invoices(account_id).await?)
    }

    async fn owned(&self, account_id: &AccountId, id: &InvoiceId) -> ServiceResult<Invoice> {
        self.storage
            .get_invoice(id)
            .await?
            .filter(|i| i.account_id == *account_id)
            .ok_or_else(not_found)
    }

    pub async fn create(&self, user: &AgencyUser, new: NewInvoice) -> ServiceResult<Invoice> {
        let total = invoice_total(&new.line_items, new.total_cents)?;
        if let Some(client_id) = &new.client_id {
            require_owned_client(self.storage.as_ref(), &user.account_id, client_id).await?;
        }
        if let Some(project_id) = &new.project_id {
            require_owned_project(self.storage.as_ref(), &user.account_id, project_id).await?;
        }

        let number = match new.invoice_number.map(|n| n.trim().to_string()) {
            Some(number) if !number.is_empty() => number,
            _ => {
                let issued = self.storage.list_invoices(&user.account_id).await?.len();
                format!("INV-{:04}", issued + 1)
            }
        };

        let mut invoice = Invoice::new(user.account_id, number, total);
        invoice.client_id = new.client_id;
        invoice.project_id = new.project_id;
        invoice.title = new.title.filter(|t| !t.trim().is_empty());
        if let Some(currency) = new.currency.filter(|c| !c.trim().is_empty()) {
            invoice.currency = currency.trim().to_uppercase();
        }
        invoice.line_items = line_items_json(&new.line_items)?;
        invoice.due_date = new.due_date;
        self.storage.upsert_invoice(invoice.clone()).await?;

        tracing::info!(
            invoice_id = %invoice.id,
            number = %invoice.invoice_number,
            total_cents = invoice.total_cents,
            "Invoice created"
        );
        Ok(invoice)
    }

    pub async fn update(
        &self,
        user: &AgencyUser,
        id: &InvoiceId,
        changes: InvoiceChanges,
    ) -> ServiceResult<Invoice> {
        let mut invoice = self.owned(&user.account_id, id).await?;
        if invoice.status != InvoiceStatus::Draft {
            return Err(ServiceError::Conflict(
                "Only draft invoices can be edited".to_string(),
            ));
        }

        if let Some(items) = changes.line_items {
            invoice.total_cents = invoice_total(&items, changes.total_cents)?;
            invoice.line_items = line_items_json(&items)?;
        } else if let Some(total) = changes.total_cents {
            invoice.total_cents = invoice_total(&[], Some(total))?;
        }
        if changes.title.is_some() {
            invoice.title = changes.title.filter(|t| !t.trim().is_empty());
        }
        if let Some(currency) = changes.currency.filter(|c| !c.trim().is_empty()) {
            invoice.currency = currency.trim().to_uppercase();
        }
        if changes.due_date.is_some() {
            invoice.due_date = changes.due_date;
        }

        self.storage.upsert_invoice(invoice.clone()).await?;
        Ok(invoice)
    }

    /// Issue a draft to its client, making it visible in the portal
    pub async fn send(&self, user: &AgencyUser, id: &InvoiceId) -> ServiceResult<Invoice> {
        let mut invoice = self.owned(&user.account_id, id).await?;
        if invoice.client_id.is_none() {
            return Err(ServiceError::BadRequest(
                "Invoice has no client to send to".to_string(),
            ));
        }
        if invoice.status == InvoiceStatus::Void {
            return Err(ServiceError::Conflict("Invoice is void".to_string()));
        }
        invoice.mark_sent(Utc::now());
        self.storage.upsert_invoice(invoice.clone()).await?;
        self.log_status(user, &invoice, "invoice_sent").await?;
        Ok(invoice)
    }

    pub async fn mark_paid(&self, user: &AgencyUser, id: &InvoiceId) -> ServiceResult<Invoice> {
        let mut invoice = self.owned(&user.account_id, id).await?;
        if invoice.status == InvoiceStatus::Paid {
            return Ok(invoice);
        }
        if !invoice.mark_paid(Utc::now()) {
            return Err(ServiceError::Conflict("Invoice is void".to_string()));
        }
        self.storage.upsert_invoice(invoice.clone()).await?;
        self.log_status(user, &invoice, "invoice_paid").await?;
        Ok(invoice)
    }

    async fn log_status(&self, user: &AgencyUser, invoice: &Invoice, action: &str) -> ServiceResult<()> {
        tracing::info!(invoice_id = %invoice.id, action, "Invoice status changed");
        let Some(project_id) = invoice.project_id else {
            return Ok(());
        };
        let mut activity = Activity::new(
            user.account_id,
            Some(project_id),
            "status_change",
            action,
            user.user_name.clone(),
        );
        activity.actor_id = Some(user.user_id);
        activity.metadata = json!({
            "invoice_id": invoice.id,
            "invoice_number": invoice.invoice_number,
            "activity_source": "invoice",
        });
        self.storage.insert_activity(activity).await?;
        self.storage.touch_project(&project_id, Utc::now()).await?;
        Ok(())
    }

    /// Return the invoice's share link, minting a token on first use
    pub async fn share(&self, account_id: &AccountId, invoice_id: &InvoiceId) -> ServiceResult<ShareLink> {
        let mut invoice = self.owned(account_id, invoice_id).await?;
        let account = self
            .storage
            .get_account(account_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Account not found".to_string()))?;

        let token = match invoice.share_token.clone() {
            Some(token) => token,
            None => {
                let token = self.unused_token().await?;
                invoice.share_token = Some(token.clone());
                self.storage.upsert_invoice(invoice).await?;
                tracing::info!(invoice_id = %invoice_id, "Invoice share link created");
                token
            }
        };

        let company_slug = account
            .company_slug()
            .unwrap_or_else(|| FALLBACK_COMPANY_SLUG.to_string());
        Ok(ShareLink {
            share_url: format!(
                "{}/{}/invoice/{}",
                self.public_base_url, company_slug, token
            ),
            share_token: token,
        })
    }

    async fn unused_token(&self) -> ServiceResult<String> {
        for _ in 0..SHARE_TOKEN_ATTEMPTS {
            let token = generate_share_token(&mut rand::thread_rng());
            if self
                .storage
                .find_invoice_by_share_token(&token)
                .await?
                .is_none()
            {
                return Ok(token);
            }
        }
        Err(ServiceError::Internal(
            "could not allocate a unique share token".to_string(),
        ))
    }

    /// Look up a shared invoice by its token; anything after a `.` is ignored
    pub async fn public_invoice(&self, token: &str) -> ServiceResult<PublicInvoice> {
        let token = clean_share_token(token.trim());
        if token.is_empty() {
            return Err(not_found());
        }

        let invoice = self
            .storage
            .find_invoice_by_share_token(token)
            .await?
            .ok_or_else(not_found)?;
        let account = self.storage.get_account(&invoice.account_id).await?;
        let company_name = account
            .as_ref()
            .map(|a| a.display_name().to_string())
            .unwrap_or_default();

        Ok(PublicInvoice {
            invoice,
            company_name,
        })
    }

    /// Invoices issued to the portal's client; drafts stay hidden
    pub async fn list_for_client(&self, identity: &PortalIdentity) -> ServiceResult<Vec<Invoice>> {
        let client_id = identity.require_client()?;
        let invoices = self
            .storage
            .list_invoices_for_client(&identity.account_id, &client_id)
            .await?;
        Ok(invoices
            .into_iter()
            .filter(|i| i.status != InvoiceStatus::Draft)
            .collect())
    }
}
