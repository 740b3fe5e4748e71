//! Strongly-typed identifiers for Portico entities
//!
//! All IDs are UUID-based but wrapped in newtype structs for type safety.
//! They serialize as the bare UUID so they can travel in URLs and JSON unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

uuid_id!(
    /// Tenant account (an agency or freelancer workspace)
    AccountId
);
uuid_id!(
    /// Agency-side user acting on behalf of an account
    UserId
);
uuid_id!(
    /// Client record owned by an account
    ClientId
);
uuid_id!(
    /// Row of the per-account portal allowlist
    AllowlistEntryId
);
uuid_id!(
    /// Branded client portal
    PortalId
);
uuid_id!(ProjectId);
uuid_id!(ContractId);
uuid_id!(FileId);
uuid_id!(FileApprovalId);
uuid_id!(InvoiceId);
uuid_id!(MessageId);
uuid_id!(ActivityId);
uuid_id!(FormId);
uuid_id!(FormSubmissionId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_generation_is_unique() {
        let id1 = ContractId::generate();
        let id2 = ContractId::generate();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_id_roundtrips_through_display() {
        let id = AccountId::generate();
        let parsed: AccountId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_id_serializes_as_bare_uuid() {
        let uuid = Uuid::new_v4();
        let id = ClientId::from_uuid(uuid);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", uuid));
    }

    #[test]
    fn test_invalid_id_is_rejected() {
        assert!("not-a-uuid".parse::<PortalId>().is_err());
    }
}
