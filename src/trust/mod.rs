//! Trust (§4.6): dispute resolution and sealed-reveal ratings.

pub mod dispute;
pub mod rating;
pub mod rating_service;

use std::sync::Arc;

use chrono::Utc;

pub use dispute::{Dispute, DisputeResolution, DisputeState, DisputeStore, DisputeType, Evidence, InMemoryDisputeStore};
pub use rating::{InMemoryRatingStore, Rating, RatingPair, RatingStore};
pub use rating_service::Service as RatingService;

use crate::error::{Error, Result};
use crate::ids::{Did, DisputeId, OrderId};
use crate::logistics::shipment::{ShipmentState, ShipmentStore};
use crate::order::{DisputeOutcome, EscrowStore, OrderStore};
use crate::params::{Params, ParamsStore, PARAM_DISPUTE_WINDOW_DAYS, PARAM_VENDOR_RESPONSE_WINDOW_HOURS};
use crate::ports::PaymentGateway;

fn to_order_outcome(resolution: DisputeResolution) -> DisputeOutcome {
    match resolution {
        DisputeResolution::FullRefund | DisputeResolution::PartialRefund => DisputeOutcome::BuyerFavor,
        DisputeResolution::NoRefund | DisputeResolution::VendorWins => DisputeOutcome::VendorFavor,
    }
}

/// §4.6 operations, coordinating Dispute state with the bound Order/Escrow
/// and consulting the Shipment tracking log for auto-eval rule 1.
pub struct Service<DS: DisputeStore, OS: OrderStore, ES: EscrowStore, PS: ParamsStore, PG: PaymentGateway, SS: ShipmentStore> {
    disputes: Arc<DS>,
    orders: Arc<crate::order::Service<OS, ES, PS, PG>>,
    shipments: Arc<SS>,
    params: Arc<Params<PS>>,
}

impl<DS: DisputeStore, OS: OrderStore, ES: EscrowStore, PS: ParamsStore, PG: PaymentGateway, SS: ShipmentStore>
    Service<DS, OS, ES, PS, PG, SS>
{
    pub fn new(
        disputes: Arc<DS>,
        orders: Arc<crate::order::Service<OS, ES, PS, PG>>,
        shipments: Arc<SS>,
        params: Arc<Params<PS>>,
    ) -> Self {
        Self {
            disputes,
            orders,
            shipments,
            params,
        }
    }

    /// `Open` (§4.6): buyer-only, within `dispute_window_days` of delivery,
    /// at most one dispute per order. `evidence` seeds the buyer's side of
    /// the record so auto-eval rules 3/4 (photo-backed quality disputes)
    /// can fire on the first pass rather than only after a later amendment.
    pub async fn open(
        &self,
        order_id: OrderId,
        buyer_did: Did,
        dispute_type: DisputeType,
        description: impl Into<String>,
        evidence: Vec<Evidence>,
    ) -> Result<Dispute> {
        self.params.require_not_paused().await?;

        if self.disputes.get_by_order(&order_id).await?.is_some() {
            return Err(Error::conflict("a dispute already exists for this order"));
        }

        let order = self.orders.get(&order_id).await?;
        if order.buyer_did != buyer_did {
            return Err(Error::forbidden("only the buyer may open a dispute"));
        }
        let delivered_at = order
            .delivered_at
            .ok_or_else(|| Error::invalid_transition("non-delivered", "disputed"))?;
        let window_days = self
            .params
            .get(PARAM_DISPUTE_WINDOW_DAYS)
            .await?
            .as_i64()
            .unwrap_or(7);
        if Utc::now() - delivered_at > chrono::Duration::days(window_days) {
            return Err(Error::Expired("dispute window".into()));
        }

        let response_hours = self
            .params
            .get(PARAM_VENDOR_RESPONSE_WINDOW_HOURS)
            .await?
            .as_i64()
            .unwrap_or(48);
        let now = Utc::now();
        let dispute = Dispute {
            id: DisputeId::new(),
            order_id,
            opened_by: buyer_did,
            dispute_type,
            description: description.into(),
            state: DisputeState::AwaitingVendor,
            buyer_evidence: evidence,
            vendor_evidence: Vec::new(),
            vendor_response: None,
            vendor_response_due_at: now + chrono::Duration::hours(response_hours),
            resolution: None,
            resolution_confidence: None,
            opened_at: now,
            resolved_at: None,
        };
        self.disputes.insert(dispute.clone()).await?;
        self.orders.open_dispute(&order_id).await?;
        Ok(dispute)
    }

    /// `SubmitVendorResponse` (§4.6): moves to `under_review` and runs the
    /// auto-evaluation cascade immediately.
    pub async fn submit_vendor_response(
        &self,
        dispute_id: &DisputeId,
        vendor_did: &Did,
        response: impl Into<String>,
        counter_evidence: Vec<Evidence>,
    ) -> Result<Dispute> {
        self.params.require_not_paused().await?;
        let mut dispute = self
            .disputes
            .get(dispute_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("dispute {dispute_id}")))?;

        let order = self.orders.get(&dispute.order_id).await?;
        if &order.vendor_did != vendor_did {
            return Err(Error::forbidden("only the vendor may respond to this dispute"));
        }
        if dispute.state != DisputeState::AwaitingVendor {
            return Err(Error::invalid_transition(format!("{:?}", dispute.state), "UnderReview"));
        }

        dispute.vendor_response = Some(response.into());
        dispute.vendor_evidence = counter_evidence;
        dispute.state = DisputeState::UnderReview;
        self.disputes.update(dispute.clone()).await?;
        self.evaluate_and_resolve(dispute).await
    }

    /// Background-sweep path (§5): no response by `vendor_response_due_at`
    /// escalates straight to evaluation, as if counter-evidence were absent.
    pub async fn escalate_unanswered(&self, dispute_id: &DisputeId) -> Result<Dispute> {
        let mut dispute = self
            .disputes
            .get(dispute_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("dispute {dispute_id}")))?;
        dispute.state = DisputeState::UnderReview;
        self.disputes.update(dispute.clone()).await?;
        self.evaluate_and_resolve(dispute).await
    }

    async fn evaluate_and_resolve(&self, mut dispute: Dispute) -> Result<Dispute> {
        let mut input = dispute::EvaluationInput::for_dispute(&dispute);
        let order = self.orders.get(&dispute.order_id).await?;
        input.order_has_tracking_number = order.tracking_number.is_some();
        input.tracking_log_has_delivered_event = self
            .shipments
            .get_by_order(&dispute.order_id)
            .await?
            .is_some_and(|shipment| {
                shipment.state == ShipmentState::Delivered
                    || shipment.tracking_events.iter().any(|e| e.state == ShipmentState::Delivered)
            });

        match dispute::evaluate(&input) {
            Some((resolution, confidence)) => {
                self.orders.resolve_dispute(&dispute.order_id, to_order_outcome(resolution)).await?;
                dispute.resolution = Some(resolution);
                dispute.resolution_confidence = Some(confidence);
                dispute.state = DisputeState::Resolved;
                dispute.resolved_at = Some(Utc::now());
            }
            None => {
                dispute.state = DisputeState::Arbitration;
            }
        }
        self.disputes.update(dispute.clone()).await?;
        Ok(dispute)
    }

    /// Manual arbitration verdict (§4.6: "escalate to arbitration" has no
    /// automatic resolver; an operator decides).
    pub async fn resolve_by_arbitration(&self, dispute_id: &DisputeId, resolution: DisputeResolution) -> Result<Dispute> {
        let mut dispute = self
            .disputes
            .get(dispute_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("dispute {dispute_id}")))?;
        if dispute.state != DisputeState::Arbitration {
            return Err(Error::invalid_transition(format!("{:?}", dispute.state), "Resolved"));
        }
        self.orders.resolve_dispute(&dispute.order_id, to_order_outcome(resolution)).await?;
        dispute.resolution = Some(resolution);
        dispute.state = DisputeState::Resolved;
        dispute.resolved_at = Some(Utc::now());
        self.disputes.update(dispute.clone()).await?;
        Ok(dispute)
    }
}
