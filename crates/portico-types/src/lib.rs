//! Portico Types - Core domain types for the client portal service
//!
//! Portico hosts branded client portals for agencies and freelancers. Each
//! account (the tenant) manages clients, contracts, files and invoices; each
//! client reaches its portal at `/{company_slug}?client={client_slug}` and logs
//! in with a magic link or a portal password.
//!
//! ## Key Concepts
//!
//! - **Account**: tenant workspace; every record is scoped to one
//! - **AllowlistEntry**: an email authorized to enter an account's portals
//! - **Contract**: dual-signature document whose status is derived from both signatures
//! - **FileRecord**: portal file with approval state
//! - **BrandProfile**: voice settings for the content generators
//!
//! This crate holds pure data and decision logic only. I/O lives in `portico-daemon`.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod account;
pub mod activity;
pub mod auth;
pub mod client;
pub mod contract;
pub mod file;
pub mod form;
pub mod growth;
pub mod ids;
pub mod invoice;
pub mod message;
pub mod slug;

use thiserror::Error;

pub use account::{Account, PlanTier};
pub use activity::{Activity, ActivitySource, DUPLICATE_WINDOW_SECS};
pub use auth::{ClientSessionRecord, MagicLinkRecord, SessionRejection};
pub use client::{
    AllowlistEntry, Client, ClientStatus, MemberSummary, Portal, PortalStatus, Project,
    ProjectStatus,
};
pub use contract::{
    status_for, Contract, ContractStats, ContractStatus, PartySignature, SignatureError,
    SignatureInput, SignatureOutcome, SignatureStatus, SignerParty, StatusFix,
};
pub use file::{
    client_upload_path, file_type_for_mime, format_file_size, sanitize_file_name, AccessLevel,
    ApprovalStatus, FileApproval, FileRecord, FileTag,
};
pub use form::{
    DetailedResponse, Form, FormField, FormStatus, FormSubmission, SubmissionError,
};
pub use growth::{
    build_brand_prompt, promo_distribution, BrandProfile, Goal, Platform, PlatformMode,
    PlanRequest, PostsRequest, PromoFocus, Tone,
};
pub use ids::{
    AccountId, ActivityId, AllowlistEntryId, ClientId, ContractId, FileApprovalId, FileId,
    FormId, FormSubmissionId, InvoiceId, MessageId, PortalId, ProjectId, UserId,
};
pub use invoice::{
    clean_share_token, generate_share_token, line_items_total, Invoice, InvoiceStatus, LineItem,
};
pub use message::{Attachment, Message, SenderType};
pub use slug::{normalize_email, slugify};

/// A string did not name a known variant
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}
