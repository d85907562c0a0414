//! Signed, portable reputation proofs (§4.3, §9).
//!
//! A proof lets a counterparty or another marketplace verify a score
//! without querying this process directly. It is a canonical-JSON payload
//! signed with ECDSA P-256 over the [`crate::canonical`] port.

use chrono::{DateTime, Utc};
use p256::ecdsa::VerifyingKey;
use serde::{Deserialize, Serialize};

use crate::canonical::{self, Signer};
use crate::error::{Error, Result};
use crate::ids::Did;

/// A proof goes stale if the subject's live score has since moved by more
/// than this from the proof's recorded score (§4.3).
pub const MAX_SCORE_DRIFT: i64 = 50;

/// Bumped whenever the payload shape changes in a way a verifier must know
/// about (§4.3, §9).
pub const PROOF_VERSION: u32 = 1;

/// The protocol version this proof was generated under, carried alongside
/// `proof_version` so a verifier can tell a payload-shape change from a
/// scoring-rule change.
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationProofPayload {
    pub did: Did,
    pub score: u32,
    pub transactions_completed: u32,
    pub average_rating: f64,
    pub events_hash: String,
    pub generated_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub proof_version: u32,
    pub protocol_version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationProof {
    pub payload: ReputationProofPayload,
    #[serde(with = "canonical::b64_signature")]
    pub signature: Vec<u8>,
}

/// Inputs to [`generate`] beyond the bare score, sourced from a live
/// [`crate::reputation::ReputationRecord`] (§4.3).
#[derive(Debug, Clone)]
pub struct ProofSubject {
    pub score: u32,
    pub transactions_completed: u32,
    pub average_rating: f64,
    pub events_hash: String,
}

/// Sign a proof of `subject` for `did`, valid for `validity_days` (§4.1
/// default: `proof_validity_days_default`).
pub fn generate(did: &Did, subject: &ProofSubject, validity_days: i64, signer: &dyn Signer) -> Result<ReputationProof> {
    let generated_at = Utc::now();
    let valid_until = generated_at + chrono::Duration::days(validity_days);
    let payload = ReputationProofPayload {
        did: did.clone(),
        score: subject.score,
        transactions_completed: subject.transactions_completed,
        average_rating: subject.average_rating,
        events_hash: subject.events_hash.clone(),
        generated_at,
        valid_until,
        proof_version: PROOF_VERSION,
        protocol_version: PROTOCOL_VERSION,
    };
    let bytes = canonical::canonicalize(&payload)
        .map_err(|e| Error::Internal(format!("canonicalize reputation proof: {e}")))?;
    let signature = signer.sign(&bytes);
    Ok(ReputationProof { payload, signature })
}

/// Verify a proof against the issuer's public key and the subject's
/// current live score. Rejects an expired proof, a bad signature, or a
/// proof whose recorded score has since drifted by more than
/// [`MAX_SCORE_DRIFT`] from the live score.
pub fn verify(proof: &ReputationProof, key: &VerifyingKey, current_score: u32, now: DateTime<Utc>) -> Result<()> {
    if now > proof.payload.valid_until {
        return Err(Error::Expired("reputation proof".into()));
    }
    let bytes = canonical::canonicalize(&proof.payload)
        .map_err(|e| Error::Internal(format!("canonicalize reputation proof: {e}")))?;
    if !canonical::verify_with_key(key, &bytes, &proof.signature) {
        return Err(Error::Unauthorized("reputation proof signature invalid".into()));
    }
    let drift = (proof.payload.score as i64 - current_score as i64).abs();
    if drift > MAX_SCORE_DRIFT {
        return Err(Error::Expired(format!(
            "reputation proof stale: recorded {} vs live {} (drift {})",
            proof.payload.score, current_score, drift
        )));
    }
    Ok(())
}
