//! Identity (§4.2): issues and resolves a stable DID per actor, tracks a
//! verification status, and never reassigns a DID once minted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::ids::Did;
use crate::reputation::{BASE_SCORE_ANONYMOUS, BASE_SCORE_KYC, BASE_SCORE_NOSTR, ReputationStore};
use crate::reputation::{ReputationEvent, ReputationEventType, Service as ReputationService};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityType {
    Kyc,
    Nostr,
    Anonymous,
}

impl IdentityType {
    /// §4.3: the reputation score multiplier per identity type.
    pub fn score_multiplier(&self) -> f64 {
        match self {
            IdentityType::Kyc => 1.2,
            IdentityType::Nostr => 1.0,
            IdentityType::Anonymous => 0.8,
        }
    }

    fn base_reputation_score(&self) -> u32 {
        match self {
            IdentityType::Kyc => BASE_SCORE_KYC,
            IdentityType::Nostr => BASE_SCORE_NOSTR,
            IdentityType::Anonymous => BASE_SCORE_ANONYMOUS,
        }
    }

    /// §4.2: initial verification status by type.
    fn initial_status(&self) -> VerificationStatus {
        match self {
            IdentityType::Kyc => VerificationStatus::Pending,
            IdentityType::Nostr | IdentityType::Anonymous => VerificationStatus::Verified,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Rejected,
    Suspended,
    Banned,
}

impl VerificationStatus {
    /// §4.2: `CanTransact` is true iff status ∈ {pending, verified}.
    pub fn can_transact(&self) -> bool {
        matches!(self, VerificationStatus::Pending | VerificationStatus::Verified)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub did: Did,
    pub identity_type: IdentityType,
    pub verification_status: VerificationStatus,
    pub client_id: String,
    pub public_profile: serde_json::Value,
    pub type_specific_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub did: Did,
    pub from_status: Option<VerificationStatus>,
    pub to_status: VerificationStatus,
    pub changed_by: String,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn insert(&self, identity: Identity) -> Result<()>;
    async fn get(&self, did: &Did) -> Result<Option<Identity>>;
    async fn update_status(&self, did: &Did, status: VerificationStatus) -> Result<()>;
    async fn append_audit(&self, entry: AuditEntry) -> Result<()>;
    async fn audit_log(&self, did: &Did) -> Result<Vec<AuditEntry>>;
}

#[derive(Default)]
pub struct InMemoryIdentityStore {
    identities: dashmap::DashMap<Did, Identity>,
    audit: dashmap::DashMap<Did, Vec<AuditEntry>>,
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn insert(&self, identity: Identity) -> Result<()> {
        self.identities.insert(identity.did.clone(), identity);
        Ok(())
    }

    async fn get(&self, did: &Did) -> Result<Option<Identity>> {
        Ok(self.identities.get(did).map(|i| i.clone()))
    }

    async fn update_status(&self, did: &Did, status: VerificationStatus) -> Result<()> {
        let mut entry = self
            .identities
            .get_mut(did)
            .ok_or_else(|| Error::not_found(format!("identity {did}")))?;
        entry.verification_status = status;
        Ok(())
    }

    async fn append_audit(&self, entry: AuditEntry) -> Result<()> {
        self.audit.entry(entry.did.clone()).or_default().push(entry);
        Ok(())
    }

    async fn audit_log(&self, did: &Did) -> Result<Vec<AuditEntry>> {
        Ok(self.audit.get(did).map(|v| v.clone()).unwrap_or_default())
    }
}

/// §4.2 operations.
pub struct Service<IS: IdentityStore, RS: ReputationStore> {
    store: Arc<IS>,
    reputation: Arc<ReputationService<RS>>,
}

impl<IS: IdentityStore, RS: ReputationStore> Service<IS, RS> {
    pub fn new(store: Arc<IS>, reputation: Arc<ReputationService<RS>>) -> Self {
        Self { store, reputation }
    }

    /// `Register(type, client_id, public_profile, type_specific_data) -> did`.
    ///
    /// Also initializes a Reputation record at the type's default base
    /// score (§4.2).
    pub async fn register(
        &self,
        identity_type: IdentityType,
        client_id: impl Into<String>,
        public_profile: serde_json::Value,
        type_specific_data: serde_json::Value,
    ) -> Result<Did> {
        let did = Did::generate();
        let identity = Identity {
            did: did.clone(),
            identity_type,
            verification_status: identity_type.initial_status(),
            client_id: client_id.into(),
            public_profile,
            type_specific_data,
            created_at: Utc::now(),
        };
        self.store.insert(identity).await?;
        self.store
            .append_audit(AuditEntry {
                did: did.clone(),
                from_status: None,
                to_status: identity_type.initial_status(),
                changed_by: "system:register".to_string(),
                reason: Some("initial registration".to_string()),
                at: Utc::now(),
            })
            .await?;

        self.reputation
            .initialize(&did, identity_type, identity_type.base_reputation_score())
            .await?;

        Ok(did)
    }

    /// `Verify(did, status, verified_by, notes)`.
    ///
    /// A kyc identity transitioning pending -> verified adds a one-time
    /// +25 boost as a verification milestone event (§4.2, §8 resolves the
    /// source's inconsistent boost behavior).
    pub async fn verify(
        &self,
        did: &Did,
        status: VerificationStatus,
        verified_by: impl Into<String>,
        notes: Option<String>,
    ) -> Result<()> {
        let identity = self
            .store
            .get(did)
            .await?
            .ok_or_else(|| Error::not_found(format!("identity {did}")))?;

        let is_kyc_first_verification = identity.identity_type == IdentityType::Kyc
            && identity.verification_status == VerificationStatus::Pending
            && status == VerificationStatus::Verified;

        self.store.update_status(did, status).await?;
        self.store
            .append_audit(AuditEntry {
                did: did.clone(),
                from_status: Some(identity.verification_status),
                to_status: status,
                changed_by: verified_by.into(),
                reason: notes,
                at: Utc::now(),
            })
            .await?;

        if is_kyc_first_verification {
            self.reputation
                .append_event(
                    did,
                    ReputationEvent::new(
                        did.clone(),
                        None,
                        ReputationEventType::Verification,
                        serde_json::json!({ "boost": 25, "reason": "kyc pending->verified" }),
                    ),
                )
                .await?;
        }

        Ok(())
    }

    pub async fn get(&self, did: &Did) -> Result<Identity> {
        self.store
            .get(did)
            .await?
            .ok_or_else(|| Error::not_found(format!("identity {did}")))
    }

    pub async fn set_status(
        &self,
        did: &Did,
        status: VerificationStatus,
        changed_by: impl Into<String>,
        reason: impl Into<String>,
    ) -> Result<()> {
        let identity = self.get(did).await?;
        self.store.update_status(did, status).await?;
        self.store
            .append_audit(AuditEntry {
                did: did.clone(),
                from_status: Some(identity.verification_status),
                to_status: status,
                changed_by: changed_by.into(),
                reason: Some(reason.into()),
                at: Utc::now(),
            })
            .await?;
        Ok(())
    }

    pub async fn can_transact(&self, did: &Did) -> Result<bool> {
        Ok(self.get(did).await?.verification_status.can_transact())
    }

    pub async fn audit_log(&self, did: &Did) -> Result<Vec<AuditEntry>> {
        self.store.audit_log(did).await
    }
}
