//! Reputation (§4.3): a per-identity score driven by an append-only event
//! log, exportable as a signed, portable proof.

pub mod proof;
pub mod score;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::canonical::{self, sha256_hex};
use crate::error::{Error, Result};
use crate::identity::IdentityType;
use crate::ids::{Did, ReputationEventId};

pub use proof::ReputationProof;

/// §4.3 default base scores, assigned at registration before any activity.
pub const BASE_SCORE_KYC: u32 = 75;
pub const BASE_SCORE_NOSTR: u32 = 35;
pub const BASE_SCORE_ANONYMOUS: u32 = 20;

/// The event log caps at this many entries per identity; older events are
/// dropped from the rolling hash but the aggregate metrics they already
/// contributed to stay (§4.3).
pub const MAX_EVENT_LOG_LEN: usize = 100;

/// Bounded, one-time boost applied the first time a kyc identity clears
/// verification (§4.2, §4.3).
pub const VERIFICATION_BOOST: u32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReputationEventType {
    Transaction,
    Rating,
    ViolationMinor,
    ViolationMajor,
    Verification,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationEvent {
    pub id: ReputationEventId,
    pub did: Did,
    /// The order, rating, or dispute this event was raised from, if any.
    pub source_id: Option<String>,
    pub event_type: ReputationEventType,
    pub data: serde_json::Value,
    pub at: DateTime<Utc>,
}

impl ReputationEvent {
    pub fn new(
        did: Did,
        source_id: Option<String>,
        event_type: ReputationEventType,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: ReputationEventId::new(),
            did,
            source_id,
            event_type,
            data,
            at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub completed_transactions: u32,
    pub rating_sum: f64,
    pub rating_count: u32,
    pub minor_violations: u32,
    pub major_violations: u32,
    pub verification_boost_applied: bool,
}

impl Metrics {
    pub fn avg_rating(&self) -> f64 {
        if self.rating_count == 0 {
            0.0
        } else {
            self.rating_sum / self.rating_count as f64
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationRecord {
    pub did: Did,
    pub identity_type: IdentityType,
    pub score: u32,
    pub metrics: Metrics,
    pub events_hash: String,
}

#[async_trait]
pub trait ReputationStore: Send + Sync {
    async fn init_record(&self, record: ReputationRecord) -> Result<()>;
    async fn get(&self, did: &Did) -> Result<Option<ReputationRecord>>;
    async fn save(&self, record: ReputationRecord) -> Result<()>;
    async fn append_event(&self, event: ReputationEvent) -> Result<()>;
    async fn events(&self, did: &Did) -> Result<Vec<ReputationEvent>>;
}

#[derive(Default)]
pub struct InMemoryReputationStore {
    records: dashmap::DashMap<Did, ReputationRecord>,
    events: dashmap::DashMap<Did, Vec<ReputationEvent>>,
}

#[async_trait]
impl ReputationStore for InMemoryReputationStore {
    async fn init_record(&self, record: ReputationRecord) -> Result<()> {
        self.records.insert(record.did.clone(), record);
        Ok(())
    }

    async fn get(&self, did: &Did) -> Result<Option<ReputationRecord>> {
        Ok(self.records.get(did).map(|r| r.clone()))
    }

    async fn save(&self, record: ReputationRecord) -> Result<()> {
        self.records.insert(record.did.clone(), record);
        Ok(())
    }

    async fn append_event(&self, event: ReputationEvent) -> Result<()> {
        let mut log = self.events.entry(event.did.clone()).or_default();
        log.push(event);
        let overflow = log.len().saturating_sub(MAX_EVENT_LOG_LEN);
        if overflow > 0 {
            log.drain(0..overflow);
        }
        Ok(())
    }

    async fn events(&self, did: &Did) -> Result<Vec<ReputationEvent>> {
        Ok(self.events.get(did).map(|v| v.clone()).unwrap_or_default())
    }
}

/// §4.3 operations.
pub struct Service<S: ReputationStore> {
    store: Arc<S>,
}

impl<S: ReputationStore> Service<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Create a fresh record at the identity type's default base score.
    pub async fn initialize(&self, did: &Did, identity_type: IdentityType, base_score: u32) -> Result<()> {
        let record = ReputationRecord {
            did: did.clone(),
            identity_type,
            score: base_score,
            metrics: Metrics::default(),
            events_hash: rolling_hash(&[])?,
        };
        self.store.init_record(record).await
    }

    pub async fn get(&self, did: &Did) -> Result<ReputationRecord> {
        self.store
            .get(did)
            .await?
            .ok_or_else(|| Error::not_found(format!("reputation record for {did}")))
    }

    /// Apply one event to the metrics, recompute the score from the
    /// formula (§4.3), and extend the rolling event log/hash.
    pub async fn append_event(&self, did: &Did, event: ReputationEvent) -> Result<()> {
        let mut record = self.get(did).await?;

        match event.event_type {
            ReputationEventType::Transaction => {
                record.metrics.completed_transactions += 1;
            }
            ReputationEventType::Rating => {
                if let Some(value) = event.data.get("rating").and_then(|v| v.as_f64()) {
                    record.metrics.rating_sum += value;
                    record.metrics.rating_count += 1;
                }
            }
            ReputationEventType::ViolationMinor => {
                record.metrics.minor_violations += 1;
            }
            ReputationEventType::ViolationMajor => {
                record.metrics.major_violations += 1;
            }
            ReputationEventType::Verification => {
                record.metrics.verification_boost_applied = true;
            }
        }

        let formula_score = score::compute_score(
            record.metrics.completed_transactions,
            record.metrics.avg_rating(),
            record.metrics.minor_violations,
            record.metrics.major_violations,
            record.identity_type.score_multiplier(),
        );
        let boost = if record.metrics.verification_boost_applied {
            VERIFICATION_BOOST
        } else {
            0
        };
        record.score = (formula_score + boost).min(500);

        self.store.append_event(event).await?;
        let log = self.store.events(did).await?;
        record.events_hash = rolling_hash(&log)?;

        self.store.save(record).await
    }

    /// Sign a portable proof of the subject's current score (§4.3, §9).
    pub async fn generate_proof(
        &self,
        did: &Did,
        validity_days: i64,
        signer: &dyn canonical::Signer,
    ) -> Result<ReputationProof> {
        let record = self.get(did).await?;
        proof::generate(did, &proof_subject(&record), validity_days, signer)
    }

    /// `History` (§4.3): the identity's raw event log, oldest first.
    pub async fn history(&self, did: &Did) -> Result<Vec<ReputationEvent>> {
        self.store.events(did).await
    }

    /// `GetBreakdown` (§4.3): the metrics that feed the score formula,
    /// alongside the score itself, so a caller can see why a score is what
    /// it is without re-deriving it from raw events.
    pub async fn get_breakdown(&self, did: &Did) -> Result<ScoreBreakdown> {
        let record = self.get(did).await?;
        Ok(ScoreBreakdown {
            score: record.score,
            metrics: record.metrics,
            identity_type: record.identity_type,
        })
    }

    /// `BatchGenerate` (§4.3): sign proofs for several identities in one
    /// call. A missing record for any one `did` fails that entry only; the
    /// rest still generate.
    pub async fn batch_generate(
        &self,
        dids: &[Did],
        validity_days: i64,
        signer: &dyn canonical::Signer,
    ) -> Vec<Result<ReputationProof>> {
        let mut out = Vec::with_capacity(dids.len());
        for did in dids {
            out.push(self.generate_proof(did, validity_days, signer).await);
        }
        out
    }
}

fn proof_subject(record: &ReputationRecord) -> proof::ProofSubject {
    proof::ProofSubject {
        score: record.score,
        transactions_completed: record.metrics.completed_transactions,
        average_rating: record.metrics.avg_rating(),
        events_hash: record.events_hash.clone(),
    }
}

/// The components behind a live score, for `GetBreakdown` (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub score: u32,
    pub metrics: Metrics,
    pub identity_type: IdentityType,
}

fn rolling_hash(events: &[ReputationEvent]) -> Result<String> {
    let bytes = canonical::canonicalize(&events)
        .map_err(|e| Error::Internal(format!("canonicalize reputation events: {e}")))?;
    Ok(sha256_hex(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::P256Signer;

    async fn service() -> Service<InMemoryReputationStore> {
        Service::new(Arc::new(InMemoryReputationStore::default()))
    }

    #[tokio::test]
    async fn initialize_sets_base_score_by_type() {
        let svc = service().await;
        let did = Did::generate();
        svc.initialize(&did, IdentityType::Nostr, BASE_SCORE_NOSTR)
            .await
            .unwrap();
        assert_eq!(svc.get(&did).await.unwrap().score, BASE_SCORE_NOSTR);
    }

    #[tokio::test]
    async fn transaction_events_raise_score() {
        let svc = service().await;
        let did = Did::generate();
        svc.initialize(&did, IdentityType::Nostr, BASE_SCORE_NOSTR)
            .await
            .unwrap();

        for _ in 0..5 {
            svc.append_event(
                &did,
                ReputationEvent::new(did.clone(), None, ReputationEventType::Transaction, serde_json::json!({})),
            )
            .await
            .unwrap();
        }

        let record = svc.get(&did).await.unwrap();
        assert_eq!(record.metrics.completed_transactions, 5);
        assert!(record.score > BASE_SCORE_NOSTR);
    }

    #[tokio::test]
    async fn major_violation_reduces_score_more_than_minor() {
        let svc = service().await;
        let did_a = Did::generate();
        let did_b = Did::generate();
        svc.initialize(&did_a, IdentityType::Kyc, BASE_SCORE_KYC).await.unwrap();
        svc.initialize(&did_b, IdentityType::Kyc, BASE_SCORE_KYC).await.unwrap();

        svc.append_event(
            &did_a,
            ReputationEvent::new(did_a.clone(), None, ReputationEventType::ViolationMinor, serde_json::json!({})),
        )
        .await
        .unwrap();
        svc.append_event(
            &did_b,
            ReputationEvent::new(did_b.clone(), None, ReputationEventType::ViolationMajor, serde_json::json!({})),
        )
        .await
        .unwrap();

        let a = svc.get(&did_a).await.unwrap();
        let b = svc.get(&did_b).await.unwrap();
        assert!(b.score < a.score);
    }

    #[tokio::test]
    async fn event_log_caps_at_100_entries() {
        let svc = service().await;
        let did = Did::generate();
        svc.initialize(&did, IdentityType::Nostr, BASE_SCORE_NOSTR)
            .await
            .unwrap();

        for _ in 0..120 {
            svc.append_event(
                &did,
                ReputationEvent::new(did.clone(), None, ReputationEventType::Transaction, serde_json::json!({})),
            )
            .await
            .unwrap();
        }

        let record = svc.get(&did).await.unwrap();
        assert_eq!(record.metrics.completed_transactions, 120);
    }

    #[tokio::test]
    async fn generated_proof_verifies_against_live_score() {
        let svc = service().await;
        let did = Did::generate();
        svc.initialize(&did, IdentityType::Kyc, BASE_SCORE_KYC).await.unwrap();
        let signer = P256Signer::generate();

        let proof = svc.generate_proof(&did, 30, &signer).await.unwrap();
        let live = svc.get(&did).await.unwrap();
        assert!(proof::verify(&proof, &signer.verifying_key(), live.score, Utc::now()).is_ok());
        assert_eq!(proof.payload.transactions_completed, 0);
    }

    #[tokio::test]
    async fn history_returns_events_in_order() {
        let svc = service().await;
        let did = Did::generate();
        svc.initialize(&did, IdentityType::Nostr, BASE_SCORE_NOSTR).await.unwrap();
        svc.append_event(
            &did,
            ReputationEvent::new(did.clone(), None, ReputationEventType::Transaction, serde_json::json!({})),
        )
        .await
        .unwrap();
        svc.append_event(
            &did,
            ReputationEvent::new(did.clone(), None, ReputationEventType::ViolationMinor, serde_json::json!({})),
        )
        .await
        .unwrap();

        let history = svc.history(&did).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].event_type, ReputationEventType::Transaction);
        assert_eq!(history[1].event_type, ReputationEventType::ViolationMinor);
    }

    #[tokio::test]
    async fn breakdown_reflects_accumulated_metrics() {
        let svc = service().await;
        let did = Did::generate();
        svc.initialize(&did, IdentityType::Kyc, BASE_SCORE_KYC).await.unwrap();
        svc.append_event(
            &did,
            ReputationEvent::new(did.clone(), None, ReputationEventType::Transaction, serde_json::json!({})),
        )
        .await
        .unwrap();

        let breakdown = svc.get_breakdown(&did).await.unwrap();
        assert_eq!(breakdown.metrics.completed_transactions, 1);
        assert_eq!(breakdown.identity_type, IdentityType::Kyc);
        assert_eq!(breakdown.score, svc.get(&did).await.unwrap().score);
    }

    #[tokio::test]
    async fn batch_generate_produces_one_proof_per_did_and_reports_missing() {
        let svc = service().await;
        let known = Did::generate();
        let unknown = Did::generate();
        svc.initialize(&known, IdentityType::Kyc, BASE_SCORE_KYC).await.unwrap();
        let signer = P256Signer::generate();

        let results = svc.batch_generate(&[known.clone(), unknown], 30, &signer).await;
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }
}
