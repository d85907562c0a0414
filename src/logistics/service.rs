//! Logistics service (§4.5): wires the provider/quote/shipment primitives
//! together and drives the one upward edge into Order — a delivered
//! shipment marks its order delivered (§2 path (a)).

use std::sync::Arc;

use chrono::Utc;

use crate::canonical::sha256_hex;
use crate::error::{Error, Result};
use crate::idempotency::EventDedupe;
use crate::ids::{OrderId, ProviderId, QuoteId, ShipmentId};
use crate::logistics::provider::ProviderStore;
use crate::logistics::quote::{Quote, QuoteState, QuoteStore};
use crate::logistics::shipment::{Shipment, ShipmentState, ShipmentStore, TrackingEvent};
use crate::order;
use crate::order::{OrderState, OrderStore};
use crate::params::{Params, ParamsStore};
use crate::ports::PaymentGateway;

pub struct Service<ProvS, QS, SS, OS, ES, PS, PG>
where
    ProvS: ProviderStore,
    QS: QuoteStore,
    SS: ShipmentStore,
    OS: OrderStore,
    ES: order::EscrowStore,
    PS: ParamsStore,
    PG: PaymentGateway,
{
    providers: Arc<ProvS>,
    quotes: Arc<QS>,
    shipments: Arc<SS>,
    orders: Arc<order::Service<OS, ES, PS, PG>>,
    params: Arc<Params<PS>>,
    dedupe: Arc<EventDedupe>,
}

impl<ProvS, QS, SS, OS, ES, PS, PG> Service<ProvS, QS, SS, OS, ES, PS, PG>
where
    ProvS: ProviderStore,
    QS: QuoteStore,
    SS: ShipmentStore,
    OS: OrderStore,
    ES: order::EscrowStore,
    PS: ParamsStore,
    PG: PaymentGateway,
{
    pub fn new(
        providers: Arc<ProvS>,
        quotes: Arc<QS>,
        shipments: Arc<SS>,
        orders: Arc<order::Service<OS, ES, PS, PG>>,
        params: Arc<Params<PS>>,
    ) -> Self {
        Self {
            providers,
            quotes,
            shipments,
            orders,
            params,
            dedupe: Arc::new(EventDedupe::new()),
        }
    }

    /// §4.5: a provider may only submit a quote once the order has been
    /// paid (escrow held) — bidding on an unpaid order is meaningless.
    pub async fn submit_quote(
        &self,
        order_id: OrderId,
        provider_id: ProviderId,
        method: crate::logistics::provider::ShippingMethod,
        amount: crate::money::Money,
        eta_days: u32,
        insurance_included: bool,
        expires_in: chrono::Duration,
    ) -> Result<Quote> {
        self.params.require_not_paused().await?;
        let order = self.orders.get(&order_id).await?;
        if order.state != OrderState::Paid && order.state != OrderState::Confirmed {
            return Err(Error::invalid_transition(format!("{:?}", order.state), "quote_submitted"));
        }
        let provider = self
            .providers
            .get(&provider_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("provider {provider_id}")))?;
        if provider.status != crate::logistics::provider::ProviderStatus::Active {
            return Err(Error::forbidden("provider is not active"));
        }

        let now = Utc::now();
        let quote = Quote {
            id: QuoteId::new(),
            order_id,
            provider_id,
            method,
            amount,
            eta_days,
            insurance_included,
            state: QuoteState::Pending,
            created_at: now,
            expires_at: now + expires_in,
        };
        self.quotes.insert(quote.clone()).await?;
        Ok(quote)
    }

    /// §4.5: accepting a quote rejects its siblings and creates the
    /// shipment, dedup'd on `event_id`. Fails if a shipment already exists
    /// for the order.
    pub async fn accept_quote(&self, quote_id: &QuoteId, event_id: &str) -> Result<Shipment> {
        self.params.require_not_paused().await?;
        if !self.dedupe.try_claim(&format!("accept_quote:{event_id}")) {
            return Err(Error::conflict(format!("event {event_id} already applied")));
        }

        let quote = self
            .quotes
            .get(quote_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("quote {quote_id}")))?;
        if self.shipments.get_by_order(&quote.order_id).await?.is_some() {
            return Err(Error::conflict(format!("order {} already has a shipment", quote.order_id)));
        }

        let accepted = self.quotes.accept_and_reject_siblings(quote_id).await?;

        let now = Utc::now();
        let shipment = Shipment {
            id: ShipmentId::new(),
            order_id: accepted.order_id,
            provider_id: accepted.provider_id,
            quote_id: accepted.id,
            state: ShipmentState::PendingPickup,
            tracking_events: vec![],
            proof_of_delivery_hash: None,
            created_at: now,
            updated_at: now,
        };
        self.shipments.insert(shipment.clone()).await?;
        Ok(shipment)
    }

    /// Appends a carrier tracking update, validated against the shipment
    /// state DAG (§4.5).
    pub async fn advance(&self, shipment_id: &ShipmentId, event: TrackingEvent) -> Result<Shipment> {
        self.params.require_not_paused().await?;
        self.shipments.advance(shipment_id, event).await
    }

    /// §4.5, §2 path (a): hashes the proof payload, marks the shipment
    /// delivered, appends a `delivered` tracking event, and cascades into
    /// `Order.mark_delivered`. Dedup'd on `event_id` (§5, §8).
    pub async fn add_proof_of_delivery(&self, shipment_id: &ShipmentId, payload: &[u8], event_id: &str) -> Result<Shipment> {
        self.params.require_not_paused().await?;
        if !self.dedupe.try_claim(&format!("pod:{event_id}")) {
            return Err(Error::conflict(format!("event {event_id} already applied")));
        }

        let hash = sha256_hex(payload);
        self.shipments.set_proof_of_delivery(shipment_id, hash).await?;

        let shipment = self
            .shipments
            .advance(
                shipment_id,
                TrackingEvent {
                    state: ShipmentState::Delivered,
                    location: None,
                    note: Some("proof of delivery received".into()),
                    at: Utc::now(),
                },
            )
            .await?;

        self.orders.mark_delivered(&shipment.order_id, event_id).await?;
        Ok(shipment)
    }

    pub async fn get(&self, shipment_id: &ShipmentId) -> Result<Shipment> {
        self.shipments
            .get(shipment_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("shipment {shipment_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::Did;
    use crate::logistics::provider::{register, InMemoryProviderStore, ShippingMethod};
    use crate::logistics::quote::InMemoryQuoteStore;
    use crate::logistics::shipment::InMemoryShipmentStore;
    use crate::money::{Money, USD};
    use crate::order::escrow::InMemoryEscrowStore;
    use crate::order::{InMemoryOrderStore, OrderItem};
    use crate::params::InMemoryParamsStore;
    use crate::ports::{MockPaymentGateway, PaymentProof};

    async fn harness() -> (
        Service<InMemoryProviderStore, InMemoryQuoteStore, InMemoryShipmentStore, InMemoryOrderStore, InMemoryEscrowStore, InMemoryParamsStore, MockPaymentGateway>,
        Arc<order::Service<InMemoryOrderStore, InMemoryEscrowStore, InMemoryParamsStore, MockPaymentGateway>>,
    ) {
        let params = Arc::new(Params::new(Arc::new(InMemoryParamsStore::default())));
        params.bootstrap_defaults().await.unwrap();
        let orders = Arc::new(order::Service::new(
            Arc::new(InMemoryOrderStore::default()),
            Arc::new(InMemoryEscrowStore::default()),
            params.clone(),
            Arc::new(MockPaymentGateway::default()),
        ));
        let providers = Arc::new(InMemoryProviderStore::default());
        let quotes = Arc::new(InMemoryQuoteStore::default());
        let shipments = Arc::new(InMemoryShipmentStore::default());
        let svc = Service::new(providers, quotes, shipments, orders.clone(), params);
        (svc, orders)
    }

    async fn paid_order(
        orders: &order::Service<InMemoryOrderStore, InMemoryEscrowStore, InMemoryParamsStore, MockPaymentGateway>,
    ) -> OrderId {
        let order = orders
            .create(
                Did::generate(),
                Did::generate(),
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
        order.id
    }

    #[tokio::test]
    async fn quote_submission_requires_a_paid_order() {
        let (svc, orders) = harness().await;
        let order = orders
            .create(
                Did::generate(),
                Did::generate(),
                vec![OrderItem::new("sku-1", 1, Money::new(1_000, USD)).unwrap()],
                "mock",
            )
            .await
            .unwrap();
        let provider_id = register(
            svc.providers.as_ref(),
            Did::generate(),
            true,
            "acme",
            vec!["us-east".into()],
            vec![ShippingMethod::Standard],
            false,
        )
        .await
        .unwrap();

        let result = svc
            .submit_quote(
                order.id,
                provider_id,
                ShippingMethod::Standard,
                Money::new(500, USD),
                3,
                false,
                chrono::Duration::hours(24),
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn accepting_a_quote_creates_exactly_one_shipment() {
        let (svc, orders) = harness().await;
        let order_id = paid_order(&orders).await;
        let provider_id = register(
            svc.providers.as_ref(),
            Did::generate(),
            true,
            "acme",
            vec!["us-east".into()],
            vec![ShippingMethod::Standard],
            false,
        )
        .await
        .unwrap();

        let quote = svc
            .submit_quote(
                order_id,
                provider_id,
                ShippingMethod::Standard,
                Money::new(500, USD),
                3,
                false,
                chrono::Duration::hours(24),
            )
            .await
            .unwrap();

        let shipment = svc.accept_quote(&quote.id, "evt-accept").await.unwrap();
        assert_eq!(shipment.order_id, order_id);

        let replay = svc.accept_quote(&quote.id, "evt-accept").await;
        assert!(replay.unwrap_err().is_duplicate_event());
    }

    #[tokio::test]
    async fn proof_of_delivery_cascades_to_order_delivered() {
        let (svc, orders) = harness().await;
        let order_id = paid_order(&orders).await;
        orders.vendor_confirm(&order_id, &orders.get(&order_id).await.unwrap().vendor_did).await.unwrap();
        let order = orders.get(&order_id).await.unwrap();
        orders.start_processing(&order_id, &order.vendor_did).await.unwrap();
        orders.mark_shipped(&order_id, &order.vendor_did, "T1", "prov-1").await.unwrap();

        let provider_id = register(
            svc.providers.as_ref(),
            Did::generate(),
            true,
            "acme",
            vec!["us-east".into()],
            vec![ShippingMethod::Standard],
            false,
        )
        .await
        .unwrap();
        let quote = svc
            .submit_quote(
                order_id,
                provider_id,
                ShippingMethod::Standard,
                Money::new(500, USD),
                3,
                false,
                chrono::Duration::hours(24),
            )
            .await
            .unwrap();
        let shipment = svc.accept_quote(&quote.id, "evt-accept").await.unwrap();
        svc.advance(
            &shipment.id,
            TrackingEvent {
                state: ShipmentState::PickedUp,
                location: None,
                note: None,
                at: Utc::now(),
            },
        )
        .await
        .unwrap();
        svc.advance(
            &shipment.id,
            TrackingEvent {
                state: ShipmentState::InTransit,
                location: None,
                note: None,
                at: Utc::now(),
            },
        )
        .await
        .unwrap();
        svc.advance(
            &shipment.id,
            TrackingEvent {
                state: ShipmentState::OutForDelivery,
                location: None,
                note: None,
                at: Utc::now(),
            },
        )
        .await
        .unwrap();

        let delivered_shipment = svc.add_proof_of_delivery(&shipment.id, b"signature-bytes", "evt-pod").await.unwrap();
        assert_eq!(delivered_shipment.state, ShipmentState::Delivered);
        assert!(delivered_shipment.proof_of_delivery_hash.is_some());

        let order = orders.get(&order_id).await.unwrap();
        assert_eq!(order.state, OrderState::Delivered);
    }
}
