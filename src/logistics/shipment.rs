//! Shipment tracking (§4.5): the 10-state carrier lifecycle from pending
//! pickup through proof of delivery.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::canonical::sha256_hex;
use crate::error::{Error, Result};
use crate::ids::{OrderId, ProviderId, QuoteId, ShipmentId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
pub enum ShipmentState {
    PendingPickup = 1,
    PickedUp = 2,
    InTransit = 3,
    OutForDelivery = 4,
    Delivered = 5,
    FailedDelivery = 6,
    Returning = 7,
    Returned = 8,
    Lost = 9,
    Cancelled = 10,
}

impl ShipmentState {
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(ShipmentState::PendingPickup),
            2 => Some(ShipmentState::PickedUp),
            3 => Some(ShipmentState::InTransit),
            4 => Some(ShipmentState::OutForDelivery),
            5 => Some(ShipmentState::Delivered),
            6 => Some(ShipmentState::FailedDelivery),
            7 => Some(ShipmentState::Returning),
            8 => Some(ShipmentState::Returned),
            9 => Some(ShipmentState::Lost),
            10 => Some(ShipmentState::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ShipmentState::Delivered | ShipmentState::Returned | ShipmentState::Lost | ShipmentState::Cancelled
        )
    }

    /// The DAG of allowed next states (§4.5): a shipment may stall into
    /// `FailedDelivery`, be retried back out for another delivery attempt,
    /// or be routed to `Returning` for a carrier-initiated return. `Lost`
    /// and `Cancelled` are reachable from any non-terminal state.
    pub fn allowed_next(&self) -> &'static [ShipmentState] {
        use ShipmentState::*;
        match self {
            PendingPickup => &[PickedUp, Lost, Cancelled],
            PickedUp => &[InTransit, Lost, Cancelled],
            InTransit => &[OutForDelivery, FailedDelivery, Lost, Cancelled],
            OutForDelivery => &[Delivered, FailedDelivery, Lost, Cancelled],
            FailedDelivery => &[OutForDelivery, Returning, Lost, Cancelled],
            Returning => &[Returned, Lost],
            Delivered | Returned | Lost | Cancelled => &[],
        }
    }

    pub fn can_advance_to(&self, next: ShipmentState) -> bool {
        self.allowed_next().contains(&next)
    }
}

impl TryFrom<i16> for ShipmentState {
    type Error = ();
    fn try_from(value: i16) -> std::result::Result<Self, Self::Error> {
        ShipmentState::from_id(value).ok_or(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub state: ShipmentState,
    pub location: Option<String>,
    pub note: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    pub id: ShipmentId,
    pub order_id: OrderId,
    pub provider_id: ProviderId,
    pub quote_id: QuoteId,
    pub state: ShipmentState,
    pub tracking_events: Vec<TrackingEvent>,
    pub proof_of_delivery_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait ShipmentStore: Send + Sync {
    async fn insert(&self, shipment: Shipment) -> Result<()>;
    async fn get(&self, id: &ShipmentId) -> Result<Option<Shipment>>;
    async fn get_by_order(&self, order_id: &OrderId) -> Result<Option<Shipment>>;
    /// Validates the transition against [`ShipmentState::can_advance_to`]
    /// before appending the tracking event.
    async fn advance(&self, id: &ShipmentId, event: TrackingEvent) -> Result<Shipment>;
    /// Stores the proof-of-delivery hash only; does not itself transition
    /// state or cascade to the order (§4.5 — that cascade lives in
    /// [`crate::logistics::service::Service::add_proof_of_delivery`]).
    async fn set_proof_of_delivery(&self, id: &ShipmentId, hash: String) -> Result<Shipment>;
}

#[derive(Default)]
pub struct InMemoryShipmentStore {
    by_id: dashmap::DashMap<ShipmentId, Shipment>,
    by_order: dashmap::DashMap<OrderId, ShipmentId>,
}

#[async_trait]
impl ShipmentStore for InMemoryShipmentStore {
    async fn insert(&self, shipment: Shipment) -> Result<()> {
        self.by_order.insert(shipment.order_id, shipment.id);
        self.by_id.insert(shipment.id, shipment);
        Ok(())
    }

    async fn get(&self, id: &ShipmentId) -> Result<Option<Shipment>> {
        Ok(self.by_id.get(id).map(|s| s.clone()))
    }

    async fn get_by_order(&self, order_id: &OrderId) -> Result<Option<Shipment>> {
        let Some(id) = self.by_order.get(order_id).map(|v| *v) else {
            return Ok(None);
        };
        self.get(&id).await
    }

    async fn advance(&self, id: &ShipmentId, event: TrackingEvent) -> Result<Shipment> {
        let mut entry = self
            .by_id
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("shipment {id}")))?;
        if !entry.state.can_advance_to(event.state) {
            return Err(Error::invalid_transition(
                format!("{:?}", entry.state),
                format!("{:?}", event.state),
            ));
        }
        entry.state = event.state;
        entry.updated_at = event.at;
        entry.tracking_events.push(event);
        Ok(entry.clone())
    }

    async fn set_proof_of_delivery(&self, id: &ShipmentId, hash: String) -> Result<Shipment> {
        let mut entry = self
            .by_id
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("shipment {id}")))?;
        entry.proof_of_delivery_hash = Some(hash);
        Ok(entry.clone())
    }
}

/// Hashes the raw proof-of-delivery payload (signature scan, photo digest,
/// GPS ping, …) and compares it against the stored hash (§4.5, §6).
pub fn verify_proof_of_delivery(stored_hash: &str, payload: &[u8]) -> bool {
    sha256_hex(payload) == stored_hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shipment(order_id: OrderId) -> Shipment {
        let now = Utc::now();
        Shipment {
            id: ShipmentId::new(),
            order_id,
            provider_id: ProviderId::new(),
            quote_id: QuoteId::new(),
            state: ShipmentState::PendingPickup,
            tracking_events: vec![],
            proof_of_delivery_hash: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn event(state: ShipmentState) -> TrackingEvent {
        TrackingEvent {
            state,
            location: None,
            note: None,
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn advance_through_terminal_state_is_rejected() {
        let store = InMemoryShipmentStore::default();
        let s = shipment(OrderId::new());
        let id = s.id;
        store.insert(s).await.unwrap();

        store.advance(&id, event(ShipmentState::PickedUp)).await.unwrap();
        store.advance(&id, event(ShipmentState::InTransit)).await.unwrap();
        store.advance(&id, event(ShipmentState::OutForDelivery)).await.unwrap();
        store.advance(&id, event(ShipmentState::Delivered)).await.unwrap();

        let result = store.advance(&id, event(ShipmentState::InTransit)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn skipping_states_in_the_dag_is_rejected() {
        let store = InMemoryShipmentStore::default();
        let s = shipment(OrderId::new());
        let id = s.id;
        store.insert(s).await.unwrap();

        let result = store.advance(&id, event(ShipmentState::Delivered)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn failed_delivery_can_retry_to_out_for_delivery() {
        let store = InMemoryShipmentStore::default();
        let s = shipment(OrderId::new());
        let id = s.id;
        store.insert(s).await.unwrap();

        store.advance(&id, event(ShipmentState::PickedUp)).await.unwrap();
        store.advance(&id, event(ShipmentState::InTransit)).await.unwrap();
        store.advance(&id, event(ShipmentState::OutForDelivery)).await.unwrap();
        store.advance(&id, event(ShipmentState::FailedDelivery)).await.unwrap();
        let retried = store.advance(&id, event(ShipmentState::OutForDelivery)).await.unwrap();
        assert_eq!(retried.state, ShipmentState::OutForDelivery);
    }

    #[test]
    fn proof_of_delivery_hash_matches_payload() {
        let hash = sha256_hex(b"signed-by: jane");
        assert!(verify_proof_of_delivery(&hash, b"signed-by: jane"));
        assert!(!verify_proof_of_delivery(&hash, b"tampered"));
    }
}
