//! Dispute resolution (§4.6): a 7-state lifecycle with an ordered
//! auto-evaluation cascade that resolves the easy cases without an
//! arbitrator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ids::{Did, DisputeId, OrderId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
pub enum DisputeState {
    Open = 1,
    AwaitingVendor = 2,
    AwaitingEvidence = 3,
    UnderReview = 4,
    Arbitration = 5,
    Resolved = 6,
    Closed = 7,
}

impl DisputeState {
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(DisputeState::Open),
            2 => Some(DisputeState::AwaitingVendor),
            3 => Some(DisputeState::AwaitingEvidence),
            4 => Some(DisputeState::UnderReview),
            5 => Some(DisputeState::Arbitration),
            6 => Some(DisputeState::Resolved),
            7 => Some(DisputeState::Closed),
            _ => None,
        }
    }
}

impl TryFrom<i16> for DisputeState {
    type Error = ();
    fn try_from(value: i16) -> std::result::Result<Self, Self::Error> {
        DisputeState::from_id(value).ok_or(())
    }
}

/// §3: the dispute reason, each handled by its own branch of the
/// auto-evaluation cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeType {
    Quality,
    NonReceipt,
    Logistics,
    ChangeOfMind,
    Other,
}

/// The outcome of a resolved or escalated dispute (§3, §4.6). Execution on
/// the bound order/escrow is driven by [`crate::order::Service`]:
/// `FullRefund`/`PartialRefund` release the escrow back to the buyer and
/// move the order to `Refunded`; `NoRefund`/`VendorWins` release it to the
/// vendor and move the order to `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeResolution {
    FullRefund,
    PartialRefund,
    NoRefund,
    VendorWins,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub submitted_by: Did,
    pub description: String,
    pub has_photos: bool,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispute {
    pub id: DisputeId,
    pub order_id: OrderId,
    pub opened_by: Did,
    pub dispute_type: DisputeType,
    pub description: String,
    pub state: DisputeState,
    pub buyer_evidence: Vec<Evidence>,
    pub vendor_evidence: Vec<Evidence>,
    pub vendor_response: Option<String>,
    pub vendor_response_due_at: DateTime<Utc>,
    pub resolution: Option<DisputeResolution>,
    pub resolution_confidence: Option<f64>,
    pub opened_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// The facts the auto-evaluation cascade reasons over (§4.6). Populated by
/// the caller from the dispute itself, the shipment's tracking log, and the
/// order's `tracking_number`.
#[derive(Debug, Clone, Default)]
pub struct EvaluationInput {
    pub dispute_type: Option<DisputeType>,
    pub tracking_log_has_delivered_event: bool,
    pub order_has_tracking_number: bool,
    pub buyer_has_photos: bool,
    pub vendor_has_counter_photos: bool,
}

impl EvaluationInput {
    pub fn for_dispute(dispute: &Dispute) -> Self {
        Self {
            dispute_type: Some(dispute.dispute_type),
            tracking_log_has_delivered_event: false,
            order_has_tracking_number: false,
            buyer_has_photos: dispute.buyer_evidence.iter().any(|e| e.has_photos),
            vendor_has_counter_photos: dispute.vendor_evidence.iter().any(|e| e.has_photos),
        }
    }
}

/// Ordered auto-evaluation cascade (§4.6): the first rule that matches
/// decides the dispute, with a confidence score carried for audit; if none
/// match it escalates to arbitration.
pub fn evaluate(input: &EvaluationInput) -> Option<(DisputeResolution, f64)> {
    match input.dispute_type {
        // 1. Non-receipt, but the tracking log actually shows delivery: vendor wins.
        Some(DisputeType::NonReceipt) if input.tracking_log_has_delivered_event => {
            Some((DisputeResolution::VendorWins, 0.95))
        }
        // 2. Non-receipt with no tracking number at all: full refund.
        Some(DisputeType::NonReceipt) if !input.order_has_tracking_number => {
            Some((DisputeResolution::FullRefund, 0.90))
        }
        // 3. Quality complaint, buyer has photos, vendor has no counter-photos: full refund.
        Some(DisputeType::Quality) if input.buyer_has_photos && !input.vendor_has_counter_photos => {
            Some((DisputeResolution::FullRefund, 0.85))
        }
        // 4. Quality complaint, both sides have photos: needs a human.
        Some(DisputeType::Quality) if input.buyer_has_photos && input.vendor_has_counter_photos => None,
        // 5. Logistics failure: full refund.
        Some(DisputeType::Logistics) => Some((DisputeResolution::FullRefund, 0.80)),
        // 6. Change of mind after delivery: no refund.
        Some(DisputeType::ChangeOfMind) => Some((DisputeResolution::NoRefund, 1.00)),
        // 7. Anything else: arbitration.
        _ => None,
    }
}

#[async_trait]
pub trait DisputeStore: Send + Sync {
    async fn insert(&self, dispute: Dispute) -> Result<()>;
    async fn get(&self, id: &DisputeId) -> Result<Option<Dispute>>;
    async fn get_by_order(&self, order_id: &OrderId) -> Result<Option<Dispute>>;
    async fn update(&self, dispute: Dispute) -> Result<()>;
    async fn past_vendor_deadline(&self, now: DateTime<Utc>) -> Result<Vec<Dispute>>;
}

#[derive(Default)]
pub struct InMemoryDisputeStore {
    inner: dashmap::DashMap<DisputeId, Dispute>,
}

#[async_trait]
impl DisputeStore for InMemoryDisputeStore {
    async fn insert(&self, dispute: Dispute) -> Result<()> {
        self.inner.insert(dispute.id, dispute);
        Ok(())
    }

    async fn get(&self, id: &DisputeId) -> Result<Option<Dispute>> {
        Ok(self.inner.get(id).map(|d| d.clone()))
    }

    async fn get_by_order(&self, order_id: &OrderId) -> Result<Option<Dispute>> {
        Ok(self.inner.iter().find(|d| &d.order_id == order_id).map(|d| d.clone()))
    }

    async fn update(&self, dispute: Dispute) -> Result<()> {
        if !self.inner.contains_key(&dispute.id) {
            return Err(crate::error::Error::not_found(format!("dispute {}", dispute.id)));
        }
        self.inner.insert(dispute.id, dispute);
        Ok(())
    }

    async fn past_vendor_deadline(&self, now: DateTime<Utc>) -> Result<Vec<Dispute>> {
        Ok(self
            .inner
            .iter()
            .filter(|d| d.state == DisputeState::AwaitingVendor && d.vendor_response_due_at <= now)
            .map(|d| d.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(dispute_type: DisputeType) -> EvaluationInput {
        EvaluationInput {
            dispute_type: Some(dispute_type),
            ..Default::default()
        }
    }

    #[test]
    fn non_receipt_with_delivered_tracking_favors_vendor() {
        let mut i = input(DisputeType::NonReceipt);
        i.tracking_log_has_delivered_event = true;
        assert_eq!(evaluate(&i), Some((DisputeResolution::VendorWins, 0.95)));
    }

    #[test]
    fn non_receipt_with_no_tracking_number_refunds_buyer() {
        let i = input(DisputeType::NonReceipt);
        assert_eq!(evaluate(&i), Some((DisputeResolution::FullRefund, 0.90)));
    }

    #[test]
    fn quality_with_only_buyer_photos_refunds_buyer() {
        let mut i = input(DisputeType::Quality);
        i.buyer_has_photos = true;
        assert_eq!(evaluate(&i), Some((DisputeResolution::FullRefund, 0.85)));
    }

    #[test]
    fn quality_with_photos_on_both_sides_escalates() {
        let mut i = input(DisputeType::Quality);
        i.buyer_has_photos = true;
        i.vendor_has_counter_photos = true;
        assert_eq!(evaluate(&i), None);
    }

    #[test]
    fn logistics_always_refunds() {
        assert_eq!(evaluate(&input(DisputeType::Logistics)), Some((DisputeResolution::FullRefund, 0.80)));
    }

    #[test]
    fn change_of_mind_never_refunds() {
        assert_eq!(evaluate(&input(DisputeType::ChangeOfMind)), Some((DisputeResolution::NoRefund, 1.00)));
    }

    #[test]
    fn unmatched_case_escalates() {
        assert_eq!(evaluate(&input(DisputeType::Other)), None);
    }
}
