//! Rating (§4.6 `Submit`): sealed-reveal ratings that feed a reputation
//! event on the counterparty once accepted.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::ids::{Did, OrderId, RatingId};
use crate::order::{EscrowStore, OrderState, OrderStore};
use crate::params::ParamsStore;
use crate::ports::PaymentGateway;
use crate::reputation::{ReputationEvent, ReputationEventType, ReputationStore};
use crate::trust::rating::{Rating, RatingPair, RatingStore};

/// Wires rating submission to the order it rates and the reputation record
/// of the party being rated.
pub struct Service<RS: RatingStore, OS: OrderStore, ES: EscrowStore, PS: ParamsStore, PG: PaymentGateway, RepS: ReputationStore> {
    ratings: Arc<RS>,
    orders: Arc<crate::order::Service<OS, ES, PS, PG>>,
    reputation: Arc<crate::reputation::Service<RepS>>,
}

impl<RS: RatingStore, OS: OrderStore, ES: EscrowStore, PS: ParamsStore, PG: PaymentGateway, RepS: ReputationStore>
    Service<RS, OS, ES, PS, PG, RepS>
{
    pub fn new(
        ratings: Arc<RS>,
        orders: Arc<crate::order::Service<OS, ES, PS, PG>>,
        reputation: Arc<crate::reputation::Service<RepS>>,
    ) -> Self {
        Self {
            ratings,
            orders,
            reputation,
        }
    }

    /// §4.6 `Submit`: the order must have reached a rateable terminal
    /// state, `rater_did` must be one of the two parties, `score` must be
    /// in `[1,5]`, and the rating appends a `ReputationEvent{type=rating}`
    /// on the counterparty.
    pub async fn submit(
        &self,
        order_id: OrderId,
        rater_did: Did,
        score: u8,
        comment: Option<String>,
    ) -> Result<RatingPair> {
        if !(1..=5).contains(&score) {
            return Err(Error::invalid_input("score", "rating must be between 1 and 5"));
        }

        let order = self.orders.get(&order_id).await?;
        if !matches!(order.state, OrderState::Completed | OrderState::Refunded) {
            return Err(Error::invalid_transition(format!("{:?}", order.state), "rating_submitted"));
        }

        let (is_buyer, ratee_did) = if rater_did == order.buyer_did {
            (true, order.vendor_did.clone())
        } else if rater_did == order.vendor_did {
            (false, order.buyer_did.clone())
        } else {
            return Err(Error::forbidden("rater must be the buyer or the vendor on this order"));
        };

        let rating = Rating {
            id: RatingId::new(),
            order_id,
            rater_did,
            ratee_did: ratee_did.clone(),
            score,
            comment,
            submitted_at: chrono::Utc::now(),
        };
        let pair = self.ratings.submit(&order_id, rating, is_buyer).await?;

        self.reputation
            .append_event(
                &ratee_did,
                ReputationEvent::new(
                    ratee_did.clone(),
                    Some(order_id.to_string()),
                    ReputationEventType::Rating,
                    serde_json::json!({ "rating": score, "order_id": order_id.to_string() }),
                ),
            )
            .await?;

        Ok(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::{Money, USD};
    use crate::order::escrow::InMemoryEscrowStore;
    use crate::order::{InMemoryOrderStore, OrderItem};
    use crate::params::{InMemoryParamsStore, Params};
    use crate::ports::{MockPaymentGateway, PaymentProof};
    use crate::reputation::{InMemoryReputationStore, BASE_SCORE_KYC};
    use crate::trust::rating::InMemoryRatingStore;
    use chrono::Utc;

    async fn harness() -> (
        Service<InMemoryRatingStore, InMemoryOrderStore, InMemoryEscrowStore, InMemoryParamsStore, MockPaymentGateway, InMemoryReputationStore>,
        OrderId,
        Did,
        Did,
    ) {
        let params = Arc::new(Params::new(Arc::new(InMemoryParamsStore::default())));
        params.bootstrap_defaults().await.unwrap();
        let orders = Arc::new(crate::order::Service::new(
            Arc::new(InMemoryOrderStore::default()),
            Arc::new(InMemoryEscrowStore::default()),
            params,
            Arc::new(MockPaymentGateway::default()),
        ));
        let reputation = Arc::new(crate::reputation::Service::new(Arc::new(InMemoryReputationStore::default())));

        let buyer = Did::generate();
        let vendor = Did::generate();
        reputation
            .initialize(&buyer, crate::identity::IdentityType::Kyc, BASE_SCORE_KYC)
            .await
            .unwrap();
        reputation
            .initialize(&vendor, crate::identity::IdentityType::Kyc, BASE_SCORE_KYC)
            .await
            .unwrap();

        let order = orders
            .create(
                buyer.clone(),
                vendor.clone(),
                vec![OrderItem::new("sku-1", 1, Money::new(1_000, USD)).unwrap()],
                "mock",
            )
            .await
            .unwrap();
        orders.submit_payment(&order.id).await.unwrap();
        orders
            .confirm_payment(
                &order.id,
                PaymentProof {
                    method: "mock".into(),
                    source_system_id: "tx".into(),
                    observed_at: Utc::now(),
                    raw: serde_json::json!({}),
                },
                "evt-pay",
            )
            .await
            .unwrap();
        orders.vendor_confirm(&order.id, &vendor).await.unwrap();
        orders.start_processing(&order.id, &vendor).await.unwrap();
        orders.mark_shipped(&order.id, &vendor, "T1", "prov-1").await.unwrap();
        orders.mark_delivered(&order.id, "evt-deliver").await.unwrap();
        orders.complete(&order.id).await.unwrap();

        let ratings = Arc::new(InMemoryRatingStore::default());
        let svc = Service::new(ratings, orders, reputation);
        (svc, order.id, buyer, vendor)
    }

    #[tokio::test]
    async fn rating_on_completed_order_updates_counterparty_reputation() {
        let (svc, order_id, buyer, vendor) = harness().await;
        svc.submit(order_id, buyer, 5, Some("great vendor".into())).await.unwrap();

        let record = svc.reputation.get(&vendor).await.unwrap();
        assert_eq!(record.metrics.rating_count, 1);
        assert_eq!(record.metrics.rating_sum, 5.0);
    }

    #[tokio::test]
    async fn stranger_cannot_rate() {
        let (svc, order_id, _buyer, _vendor) = harness().await;
        let stranger = Did::generate();
        assert!(svc.submit(order_id, stranger, 5, None).await.is_err());
    }

    #[tokio::test]
    async fn out_of_range_score_is_rejected() {
        let (svc, order_id, buyer, _vendor) = harness().await;
        assert!(svc.submit(order_id, buyer, 6, None).await.is_err());
    }
}
