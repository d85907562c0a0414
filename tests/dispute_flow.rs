//! End-to-end dispute resolution: order delivery through escrow refund,
//! exercising `trust::Service` against a live `order::Service` rather than
//! the bare `evaluate()` cascade in isolation.

use std::sync::Arc;

use marketplace_core::ids::{Did, ProviderId, QuoteId};
use marketplace_core::logistics::shipment::{InMemoryShipmentStore, Shipment, ShipmentState, ShipmentStore, TrackingEvent};
use marketplace_core::money::{Money, USD};
use marketplace_core::order::escrow::InMemoryEscrowStore;
use marketplace_core::order::{InMemoryOrderStore, OrderItem, OrderState};
use marketplace_core::params::{InMemoryParamsStore, Params};
use marketplace_core::ports::{MockPaymentGateway, PaymentProof};
use marketplace_core::trust::dispute::{DisputeState, DisputeType, Evidence, InMemoryDisputeStore};

async fn deliver_an_order() -> (
    Arc<marketplace_core::order::Service<InMemoryOrderStore, InMemoryEscrowStore, InMemoryParamsStore, MockPaymentGateway>>,
    marketplace_core::order::Order,
    Did,
    Did,
) {
    let params = Arc::new(Params::new(Arc::new(InMemoryParamsStore::default())));
    params.bootstrap_defaults().await.unwrap();
    let orders = Arc::new(marketplace_core::order::Service::new(
        Arc::new(InMemoryOrderStore::default()),
        Arc::new(InMemoryEscrowStore::default()),
        params,
        Arc::new(MockPaymentGateway::default()),
    ));

    let buyer = Did::generate();
    let vendor = Did::generate();
    let order = orders
        .create(
            buyer.clone(),
            vendor.clone(),
            vec![OrderItem::new("sku-1", 5, Money::new(20_000, USD)).unwrap()],
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
                source_system_id: "tx-1".into(),
                observed_at: chrono::Utc::now(),
                raw: serde_json::json!({}),
            },
            "evt-pay-1",
        )
        .await
        .unwrap();
    orders.vendor_confirm(&order.id, &vendor).await.unwrap();
    orders.start_processing(&order.id, &vendor).await.unwrap();
    orders.mark_shipped(&order.id, &vendor, "T1", "prov-1").await.unwrap();
    let order = orders.mark_delivered(&order.id, "evt-deliver-1").await.unwrap();

    (orders, order, buyer, vendor)
}

fn no_shipment_store() -> Arc<InMemoryShipmentStore> {
    Arc::new(InMemoryShipmentStore::default())
}

#[tokio::test]
async fn non_receipt_with_a_tracking_number_escalates_to_arbitration() {
    let (orders, order, buyer, vendor) = deliver_an_order().await;
    let params = Arc::new(Params::new(Arc::new(InMemoryParamsStore::default())));
    params.bootstrap_defaults().await.unwrap();
    let disputes = Arc::new(InMemoryDisputeStore::default());
    let trust = marketplace_core::trust::Service::new(disputes, orders.clone(), no_shipment_store(), params);

    // deliver_an_order() ships with a tracking number, so rule 2 (no
    // tracking_number -> full_refund) does not apply here.
    assert!(order.tracking_number.is_some());

    let dispute = trust
        .open(order.id, buyer.clone(), DisputeType::NonReceipt, "never arrived", vec![])
        .await
        .unwrap();
    assert_eq!(dispute.state, DisputeState::AwaitingVendor);

    let resolved = trust
        .submit_vendor_response(&dispute.id, &vendor, "we shipped it", vec![])
        .await
        .unwrap();

    // No shipment record exists for this order, so rule 1 (delivered
    // tracking event -> vendor_wins) cannot fire either; evaluation falls
    // through to arbitration.
    assert_eq!(resolved.state, DisputeState::Arbitration);

    let order_after = orders.get(&dispute.order_id).await.unwrap();
    assert_eq!(order_after.state, OrderState::Disputed);
}

#[tokio::test]
async fn non_receipt_with_a_delivered_tracking_event_resolves_vendor_wins() {
    let (orders, order, buyer, vendor) = deliver_an_order().await;
    let params = Arc::new(Params::new(Arc::new(InMemoryParamsStore::default())));
    params.bootstrap_defaults().await.unwrap();
    let disputes = Arc::new(InMemoryDisputeStore::default());
    let shipments = Arc::new(InMemoryShipmentStore::default());

    let now = chrono::Utc::now();
    let shipment = Shipment {
        id: marketplace_core::ids::ShipmentId::new(),
        order_id: order.id,
        provider_id: ProviderId::new(),
        quote_id: QuoteId::new(),
        state: ShipmentState::Delivered,
        tracking_events: vec![TrackingEvent {
            state: ShipmentState::Delivered,
            location: None,
            note: Some("delivered".into()),
            at: now,
        }],
        proof_of_delivery_hash: None,
        created_at: now,
        updated_at: now,
    };
    shipments.insert(shipment).await.unwrap();

    let trust = marketplace_core::trust::Service::new(disputes, orders.clone(), shipments, params);

    let dispute = trust
        .open(order.id, buyer.clone(), DisputeType::NonReceipt, "never arrived", vec![])
        .await
        .unwrap();
    let resolved = trust
        .submit_vendor_response(&dispute.id, &vendor, "tracking shows delivered", vec![])
        .await
        .unwrap();

    assert_eq!(resolved.state, DisputeState::Resolved);
    assert_eq!(
        resolved.resolution,
        Some(marketplace_core::trust::DisputeResolution::VendorWins)
    );
    assert_eq!(resolved.resolution_confidence, Some(0.95));

    let order_after = orders.get(&dispute.order_id).await.unwrap();
    assert_eq!(order_after.state, OrderState::Completed);
}

#[tokio::test]
async fn change_of_mind_dispute_resolves_no_refund_and_releases_escrow() {
    let (orders, order, buyer, vendor) = deliver_an_order().await;
    let params = Arc::new(Params::new(Arc::new(InMemoryParamsStore::default())));
    params.bootstrap_defaults().await.unwrap();
    let disputes = Arc::new(InMemoryDisputeStore::default());
    let trust = marketplace_core::trust::Service::new(disputes, orders.clone(), no_shipment_store(), params);

    let dispute = trust
        .open(order.id, buyer, DisputeType::ChangeOfMind, "changed my mind", vec![])
        .await
        .unwrap();

    let resolved = trust
        .submit_vendor_response(&dispute.id, &vendor, "too late to cancel", vec![])
        .await
        .unwrap();

    assert_eq!(resolved.state, DisputeState::Resolved);
    let order_after = orders.get(&dispute.order_id).await.unwrap();
    assert_eq!(order_after.state, OrderState::Completed);
}

#[tokio::test]
async fn quality_dispute_with_buyer_photos_and_no_counter_resolves_full_refund() {
    let (orders, order, buyer, vendor) = deliver_an_order().await;
    let params = Arc::new(Params::new(Arc::new(InMemoryParamsStore::default())));
    params.bootstrap_defaults().await.unwrap();
    let disputes = Arc::new(InMemoryDisputeStore::default());
    let trust = marketplace_core::trust::Service::new(disputes, orders.clone(), no_shipment_store(), params);

    let photo_evidence = vec![Evidence {
        submitted_by: buyer.clone(),
        description: "cracked on arrival".into(),
        has_photos: true,
        submitted_at: chrono::Utc::now(),
    }];

    let dispute = trust
        .open(order.id, buyer, DisputeType::Quality, "damaged", photo_evidence)
        .await
        .unwrap();

    let resolved = trust
        .submit_vendor_response(&dispute.id, &vendor, "no comment", vec![])
        .await
        .unwrap();

    assert_eq!(resolved.state, DisputeState::Resolved);
}

#[tokio::test]
async fn buyer_cannot_open_a_second_dispute_on_the_same_order() {
    let (orders, order, buyer, _vendor) = deliver_an_order().await;
    let params = Arc::new(Params::new(Arc::new(InMemoryParamsStore::default())));
    params.bootstrap_defaults().await.unwrap();
    let disputes = Arc::new(InMemoryDisputeStore::default());
    let trust = marketplace_core::trust::Service::new(disputes, orders.clone(), no_shipment_store(), params);

    trust
        .open(order.id, buyer.clone(), DisputeType::Quality, "damaged", vec![])
        .await
        .unwrap();

    let second = trust
        .open(order.id, buyer, DisputeType::Quality, "still damaged", vec![])
        .await;
    assert!(second.is_err());
}
