//! Stable identifier newtypes.
//!
//! §9 calls for breaking the order/escrow/dispute/shipment cycle by
//! referencing entities only through stable ids resolved via the Store —
//! no entity ever holds a live reference to another.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn inner(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
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
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(u: Uuid) -> Self {
                Self(u)
            }
        }
    };
}

uuid_id!(OrderId);
uuid_id!(EscrowId);
uuid_id!(ProviderId);
uuid_id!(QuoteId);
uuid_id!(ShipmentId);
uuid_id!(DisputeId);
uuid_id!(RatingId);
uuid_id!(ProposalId);
uuid_id!(ReputationEventId);
uuid_id!(GovernanceExecutionId);

/// A decentralized identifier: `did:<method>:<opaque-id>`.
///
/// DIDs are never reassigned (§4.2); the opaque id is a freshly generated
/// UUID minted once at registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Did(String);

/// Protocol token used as the DID method segment.
pub const DID_METHOD: &str = "mkt";

impl Did {
    /// Mint a fresh DID with a new opaque UUID.
    pub fn generate() -> Self {
        Self(format!("did:{}:{}", DID_METHOD, Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Did {
    type Err = DidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("did"), Some(_method), Some(opaque)) if !opaque.is_empty() => {
                Ok(Did(s.to_string()))
            }
            _ => Err(DidParseError(s.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid DID format: {0}")]
pub struct DidParseError(String);

/// A governance signer identifier, distinct from a DID since a signer seat
/// may outlive the identity bound to it (replacement on key rotation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignerId(Uuid);

impl SignerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SignerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SignerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn did_roundtrip_through_display_and_parse() {
        let did = Did::generate();
        let parsed: Did = did.as_str().parse().unwrap();
        assert_eq!(did, parsed);
    }

    #[test]
    fn did_format_is_fixed_method() {
        let did = Did::generate();
        assert!(did.as_str().starts_with("did:mkt:"));
    }

    #[test]
    fn rejects_malformed_did() {
        assert!("not-a-did".parse::<Did>().is_err());
        assert!("did:mkt:".parse::<Did>().is_err());
    }

    #[test]
    fn order_id_unique_and_displayable() {
        let a = OrderId::new();
        let b = OrderId::new();
        assert_ne!(a, b);
        assert!(!a.to_string().is_empty());
    }
}
