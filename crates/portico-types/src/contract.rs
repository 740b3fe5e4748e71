//! Contracts and dual-signature status reconciliation
//!
//! A contract carries two independent signatures: the client's and the account
//! user's. The contract status is a pure function of those two flags and is
//! recomputed on every signing event; it is never accepted from the caller.
//!
//! | client signed | user signed | status               | signature status |
//! |---------------|-------------|----------------------|------------------|
//! | yes           | yes         | `signed`             | `signed`         |
//! | yes           | no          | `partially_signed`   | `pending`        |
//! | no            | yes         | `partially_signed`   | `pending`        |
//! | no            | no          | `awaiting_signature` | `pending`        |

use crate::{AccountId, ClientId, ContractId, PortalId, ProjectId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lifecycle status of a contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Draft,
    Sent,
    AwaitingSignature,
    PartiallySigned,
    Signed,
    Declined,
    Expired,
    Archived,
}

impl ContractStatus {
    pub const ALL: [ContractStatus; 8] = [
        ContractStatus::Draft,
        ContractStatus::Sent,
        ContractStatus::AwaitingSignature,
        ContractStatus::PartiallySigned,
        ContractStatus::Signed,
        ContractStatus::Declined,
        ContractStatus::Expired,
        ContractStatus::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Draft => "draft",
            ContractStatus::Sent => "sent",
            ContractStatus::AwaitingSignature => "awaiting_signature",
            ContractStatus::PartiallySigned => "partially_signed",
            ContractStatus::Signed => "signed",
            ContractStatus::Declined => "declined",
            ContractStatus::Expired => "expired",
            ContractStatus::Archived => "archived",
        }
    }

    /// Statuses that no signing event may leave
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ContractStatus::Declined | ContractStatus::Expired | ContractStatus::Archived
        )
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one side's signature, and the contract-level summary of both
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureStatus {
    #[default]
    Pending,
    Signed,
    Declined,
}

/// Which side of the contract is signing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignerParty {
    /// The account's client, signing from the portal
    Client,
    /// An agency user of the account
    User,
}

impl fmt::Display for SignerParty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignerParty::Client => f.write_str("client"),
            SignerParty::User => f.write_str("user"),
        }
    }
}

/// One side's signature
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PartySignature {
    #[serde(default)]
    pub status: SignatureStatus,
    /// Signature image or typed-name payload
    pub data: Option<String>,
    pub signed_at: Option<DateTime<Utc>>,
    pub signer_name: Option<String>,
    pub signer_email: Option<String>,
}

impl PartySignature {
    pub fn is_signed(&self) -> bool {
        self.status == SignatureStatus::Signed
    }
}

/// Contract row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub account_id: AccountId,
    pub client_id: Option<ClientId>,
    pub project_id: Option<ProjectId>,
    pub portal_id: Option<PortalId>,
    pub name: String,
    pub contract_number: String,
    #[serde(default)]
    pub content: serde_json::Value,
    pub status: ContractStatus,
    #[serde(default)]
    pub signature_status: SignatureStatus,
    #[serde(default)]
    pub client_signature: PartySignature,
    #[serde(default)]
    pub user_signature: PartySignature,
    pub total_value_cents: Option<i64>,
    pub currency: Option<String>,
    pub signed_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped by storage on every guarded write
    #[serde(default)]
    pub version: u64,
}

/// A signing event as received from an authenticated caller
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureInput {
    pub data: String,
    pub signer_name: Option<String>,
    pub signer_email: Option<String>,
}

/// Result of applying a signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SignatureOutcome {
    pub party: SignerParty,
    pub previous_status: ContractStatus,
    pub status: ContractStatus,
    pub signature_status: SignatureStatus,
}

/// A status correction found by [`Contract::reconciled_status`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFix {
    pub id: ContractId,
    pub old_status: ContractStatus,
    pub new_status: ContractStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature data is required")]
    EmptySignature,

    #[error("contract is {0} and can no longer be signed")]
    Terminal(ContractStatus),

    #[error("contract has not been sent to the client yet")]
    NotSent,
}

/// The decision table: contract status and summary signature status from the two flags.
pub fn status_for(client_signed: bool, user_signed: bool) -> (ContractStatus, SignatureStatus) {
    match (client_signed, user_signed) {
        (true, true) => (ContractStatus::Signed, SignatureStatus::Signed),
        (true, false) | (false, true) => {
            (ContractStatus::PartiallySigned, SignatureStatus::Pending)
        }
        (false, false) => (ContractStatus::AwaitingSignature, SignatureStatus::Pending),
    }
}

impl Contract {
    pub fn new(account_id: AccountId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ContractId::generate(),
            account_id,
            client_id: None,
            project_id: None,
            portal_id: None,
            name: name.into(),
            contract_number: format!("CON-{}-{}", now.format("%Y"), now.timestamp_millis()),
            content: serde_json::Value::Null,
            status: ContractStatus::Draft,
            signature_status: SignatureStatus::Pending,
            client_signature: PartySignature::default(),
            user_signature: PartySignature::default(),
            total_value_cents: None,
            currency: None,
            signed_at: None,
            sent_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Move a draft out to the client for signature
    pub fn send(&mut self, now: DateTime<Utc>) -> Result<(), SignatureError> {
        if self.status.is_terminal() {
            return Err(SignatureError::Terminal(self.status));
        }
        if self.status == ContractStatus::Draft {
            self.status = ContractStatus::Sent;
        }
        self.sent_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Whether the body may still be edited: nobody has signed yet
    pub fn is_editable(&self) -> bool {
        !self.status.is_terminal() && !self.client_signed() && !self.user_signed()
    }

    pub fn client_signed(&self) -> bool {
        self.client_signature.is_signed()
    }

    pub fn user_signed(&self) -> bool {
        self.user_signature.is_signed()
    }

    pub fn signature(&self, party: SignerParty) -> &PartySignature {
        match party {
            SignerParty::Client => &self.client_signature,
            SignerParty::User => &self.user_signature,
        }
    }

    fn signature_mut(&mut self, party: SignerParty) -> &mut PartySignature {
        match party {
            SignerParty::Client => &mut self.client_signature,
            SignerParty::User => &mut self.user_signature,
        }
    }

    /// Whether `party` may sign in the contract's current state.
    pub fn check_signable(&self, party: SignerParty) -> Result<(), SignatureError> {
        if self.status.is_terminal() {
            return Err(SignatureError::Terminal(self.status));
        }
        if self.status == ContractStatus::Draft && party == SignerParty::Client {
            return Err(SignatureError::NotSent);
        }
        Ok(())
    }

    /// Record `party`'s signature and recompute the status from both flags.
    pub fn apply_signature(
        &mut self,
        party: SignerParty,
        input: SignatureInput,
        now: DateTime<Utc>,
    ) -> Result<SignatureOutcome, SignatureError> {
        if input.data.trim().is_empty() {
            return Err(SignatureError::EmptySignature);
        }
        self.check_signable(party)?;

        let previous_status = self.status;
        {
            let signature = self.signature_mut(party);
            signature.status = SignatureStatus::Signed;
            signature.data = Some(input.data);
            signature.signed_at = Some(now);
            signature.signer_name = input.signer_name.or_else(|| {
                Some(match party {
                    SignerParty::Client => "Client".to_string(),
                    SignerParty::User => "Company".to_string(),
                })
            });
            signature.signer_email = input.signer_email;
        }

        let (status, signature_status) = status_for(self.client_signed(), self.user_signed());
        self.status = status;
        self.signature_status = signature_status;
        if status == ContractStatus::Signed {
            self.signed_at = Some(now);
        }
        self.updated_at = now;

        Ok(SignatureOutcome {
            party,
            previous_status,
            status,
            signature_status,
        })
    }

    /// The status this contract should have given its signature flags, when it
    /// differs from the stored one. Drafts are left alone.
    ///
    /// With neither side signed only a claimed `signed`/`partially_signed` is
    /// corrected; `sent` and the terminal statuses stay as they are.
    pub fn reconciled_status(&self) -> Option<ContractStatus> {
        if self.status == ContractStatus::Draft {
            return None;
        }

        let correct = match (self.client_signed(), self.user_signed()) {
            (true, true) => ContractStatus::Signed,
            (true, false) | (false, true) => ContractStatus::PartiallySigned,
            (false, false) => match self.status {
                ContractStatus::Signed | ContractStatus::PartiallySigned => {
                    ContractStatus::AwaitingSignature
                }
                other => other,
            },
        };

        (correct != self.status).then_some(correct)
    }

    /// Apply [`reconciled_status`](Self::reconciled_status), returning the fix if one was needed.
    pub fn reconcile(&mut self, now: DateTime<Utc>) -> Option<StatusFix> {
        let new_status = self.reconciled_status()?;
        let fix = StatusFix {
            id: self.id,
            old_status: self.status,
            new_status,
        };
        self.status = new_status;
        self.signature_status = status_for(self.client_signed(), self.user_signed()).1;
        self.updated_at = now;
        Some(fix)
    }
}

/// Count of contracts per status for one account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractStats {
    pub total: usize,
    pub draft: usize,
    pub sent: usize,
    pub awaiting_signature: usize,
    pub partially_signed: usize,
    pub signed: usize,
    pub declined: usize,
    pub expired: usize,
    pub archived: usize,
}

impl ContractStats {
    pub fn from_statuses(statuses: impl IntoIterator<Item = ContractStatus>) -> Self {
        let mut stats = Self::default();
        for status in statuses {
            stats.total += 1;
            let bucket = match status {
                ContractStatus::Draft => &mut stats.draft,
                ContractStatus::Sent => &mut stats.sent,
                ContractStatus::AwaitingSignature => &mut stats.awaiting_signature,
                ContractStatus::PartiallySigned => &mut stats.partially_signed,
                ContractStatus::Signed => &mut stats.signed,
                ContractStatus::Declined => &mut stats.declined,
                ContractStatus::Expired => &mut stats.expired,
                ContractStatus::Archived => &mut stats.archived,
            };
            *bucket += 1;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sent_contract(client_signed: bool, user_signed: bool) -> Contract {
        let mut contract = Contract::new(AccountId::generate(), "Website redesign");
        contract.status = ContractStatus::AwaitingSignature;
        if client_signed {
            contract.client_signature.status = SignatureStatus::Signed;
        }
        if user_signed {
            contract.user_signature.status = SignatureStatus::Signed;
        }
        contract
    }

    fn input() -> SignatureInput {
        SignatureInput {
            data: "data:image/png;base64,AAAA".to_string(),
            signer_name: None,
            signer_email: None,
        }
    }

    #[test]
    fn test_decision_table() {
        assert_eq!(
            status_for(true, true),
            (ContractStatus::Signed, SignatureStatus::Signed)
        );
        assert_eq!(
            status_for(true, false),
            (ContractStatus::PartiallySigned, SignatureStatus::Pending)
        );
        assert_eq!(
            status_for(false, true),
            (ContractStatus::PartiallySigned, SignatureStatus::Pending)
        );
        assert_eq!(
            status_for(false, false),
            (ContractStatus::AwaitingSignature, SignatureStatus::Pending)
        );
    }

    #[test]
    fn test_second_signature_completes_contract() {
        let mut contract = sent_contract(false, true);
        let now = Utc::now();
        let outcome = contract
            .apply_signature(SignerParty::Client, input(), now)
            .unwrap();

        assert_eq!(outcome.previous_status, ContractStatus::AwaitingSignature);
        assert_eq!(outcome.status, ContractStatus::Signed);
        assert_eq!(contract.signed_at, Some(now));
        assert_eq!(contract.client_signature.signer_name.as_deref(), Some("Client"));
    }

    #[test]
    fn test_spoofed_status_is_overwritten() {
        // A stored "signed" with no signatures is recomputed on the next event.
        let mut contract = sent_contract(false, false);
        contract.status = ContractStatus::Signed;
        contract.signature_status = SignatureStatus::Signed;

        let outcome = contract
            .apply_signature(SignerParty::User, input(), Utc::now())
            .unwrap();
        assert_eq!(outcome.status, ContractStatus::PartiallySigned);
        assert_eq!(contract.signature_status, SignatureStatus::Pending);
    }

    #[test]
    fn test_terminal_contracts_reject_signatures() {
        for status in [
            ContractStatus::Declined,
            ContractStatus::Expired,
            ContractStatus::Archived,
        ] {
            let mut contract = sent_contract(false, false);
            contract.status = status;
            let err = contract
                .apply_signature(SignerParty::Client, input(), Utc::now())
                .unwrap_err();
            assert_eq!(err, SignatureError::Terminal(status));
            assert!(!contract.client_signed());
        }
    }

    #[test]
    fn test_draft_only_signable_by_user() {
        let mut contract = Contract::new(AccountId::generate(), "Retainer");
        assert_eq!(
            contract.check_signable(SignerParty::Client),
            Err(SignatureError::NotSent)
        );
        let outcome = contract
            .apply_signature(SignerParty::User, input(), Utc::now())
            .unwrap();
        assert_eq!(outcome.status, ContractStatus::PartiallySigned);
    }

    #[test]
    fn test_empty_signature_rejected() {
        let mut contract = sent_contract(false, false);
        let err = contract
            .apply_signature(
                SignerParty::Client,
                SignatureInput {
                    data: "   ".to_string(),
                    signer_name: None,
                    signer_email: None,
                },
                Utc::now(),
            )
            .unwrap_err();
        assert_eq!(err, SignatureError::EmptySignature);
    }

    #[test]
    fn test_reconcile_sweep_rules() {
        let mut draft = sent_contract(true, true);
        draft.status = ContractStatus::Draft;
        assert_eq!(draft.reconciled_status(), None);

        let mut stale = sent_contract(true, true);
        stale.status = ContractStatus::PartiallySigned;
        assert_eq!(stale.reconciled_status(), Some(ContractStatus::Signed));

        let mut claimed = sent_contract(false, false);
        claimed.status = ContractStatus::Signed;
        let fix = claimed.reconcile(Utc::now()).unwrap();
        assert_eq!(fix.old_status, ContractStatus::Signed);
        assert_eq!(fix.new_status, ContractStatus::AwaitingSignature);
        assert_eq!(claimed.signature_status, SignatureStatus::Pending);

        let mut sent = sent_contract(false, false);
        sent.status = ContractStatus::Sent;
        assert_eq!(sent.reconciled_status(), None);
    }

    #[test]
    fn test_send_releases_draft_to_client() {
        let mut contract = Contract::new(AccountId::generate(), "Retainer");
        let now = Utc::now();
        contract.send(now).unwrap();
        assert_eq!(contract.status, ContractStatus::Sent);
        assert_eq!(contract.sent_at, Some(now));
        assert!(contract.check_signable(SignerParty::Client).is_ok());

        contract.status = ContractStatus::Archived;
        assert_eq!(
            contract.send(now),
            Err(SignatureError::Terminal(ContractStatus::Archived))
        );
    }

    #[test]
    fn test_stats_count_each_status() {
        let stats = ContractStats::from_statuses([
            ContractStatus::Signed,
            ContractStatus::Signed,
            ContractStatus::Draft,
        ]);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.signed, 2);
        assert_eq!(stats.draft, 1);
    }

    fn party() -> impl Strategy<Value = SignerParty> {
        prop_oneof![Just(SignerParty::Client), Just(SignerParty::User)]
    }

    fn stored_status() -> impl Strategy<Value = ContractStatus> {
        prop_oneof![
            Just(ContractStatus::Sent),
            Just(ContractStatus::AwaitingSignature),
            Just(ContractStatus::PartiallySigned),
            Just(ContractStatus::Signed),
        ]
    }

    proptest! {
        #[test]
        fn signing_always_follows_the_table(
            client_signed in any::<bool>(),
            user_signed in any::<bool>(),
            signer in party(),
            stored in stored_status(),
        ) {
            let mut contract = sent_contract(client_signed, user_signed);
            contract.status = stored;

            let outcome = contract.apply_signature(signer, input(), Utc::now()).unwrap();

            prop_assert!(contract.signature(signer).is_signed());
            let expected_client = client_signed || signer == SignerParty::Client;
            let expected_user = user_signed || signer == SignerParty::User;
            prop_assert_eq!(contract.client_signed(), expected_client);
            prop_assert_eq!(contract.user_signed(), expected_user);

            let (status, signature_status) = status_for(expected_client, expected_user);
            prop_assert_eq!(outcome.status, status);
            prop_assert_eq!(contract.status, status);
            prop_assert_eq!(contract.signature_status, signature_status);
        }

        #[test]
        fn reconcile_is_idempotent(
            client_signed in any::<bool>(),
            user_signed in any::<bool>(),
            stored in stored_status(),
        ) {
            let mut contract = sent_contract(client_signed, user_signed);
            contract.status = stored;
            contract.reconcile(Utc::now());
            prop_assert_eq!(contract.reconciled_status(), None);
        }
    }
}
