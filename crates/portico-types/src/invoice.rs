//! Invoices and public share links

use crate::{AccountId, ClientId, InvoiceId, ProjectId};
use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

const SHARE_TOKEN_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const SHARE_TOKEN_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    #[default]
    Draft,
    Sent,
    Viewed,
    Paid,
    Overdue,
    Void,
}

/// One billed line as entered by the agency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    pub unit_price_cents: i64,
}

fn default_quantity() -> u32 {
    1
}

impl LineItem {
    pub fn total_cents(&self) -> Option<i64> {
        self.unit_price_cents.checked_mul(i64::from(self.quantity))
    }
}

/// Sum of the line totals; `None` on overflow
pub fn line_items_total(items: &[LineItem]) -> Option<i64> {
    items
        .iter()
        .try_fold(0i64, |sum, item| sum.checked_add(item.total_cents()?))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub account_id: AccountId,
    pub client_id: Option<ClientId>,
    pub project_id: Option<ProjectId>,
    pub invoice_number: String,
    pub title: Option<String>,
    #[serde(default)]
    pub status: InvoiceStatus,
    pub currency: String,
    pub total_cents: i64,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub line_items: serde_json::Value,
    pub share_token: Option<String>,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    pub fn new(account_id: AccountId, invoice_number: impl Into<String>, total_cents: i64) -> Self {
        Self {
            id: InvoiceId::generate(),
            account_id,
            client_id: None,
            project_id: None,
            invoice_number: invoice_number.into(),
            title: None,
            status: InvoiceStatus::Draft,
            currency: "USD".to_string(),
            total_cents,
            due_date: None,
            line_items: serde_json::Value::Array(Vec::new()),
            share_token: None,
            sent_at: None,
            paid_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn mark_sent(&mut self, now: DateTime<Utc>) {
        if self.status == InvoiceStatus::Draft {
            self.status = InvoiceStatus::Sent;
        }
        self.sent_at.get_or_insert(now);
    }

    /// Record payment; a void invoice cannot be paid
    pub fn mark_paid(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == InvoiceStatus::Void {
            return false;
        }
        self.status = InvoiceStatus::Paid;
        self.paid_at.get_or_insert(now);
        true
    }
}

/// Random alphanumeric token for a public invoice link
pub fn generate_share_token<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..SHARE_TOKEN_LEN)
        .map(|_| SHARE_TOKEN_ALPHABET[rng.gen_range(0..SHARE_TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// Strip anything after the first `.`; links pasted into some clients pick up a suffix.
pub fn clean_share_token(token: &str) -> &str {
    token.split('.').next().unwrap_or(token)
}
