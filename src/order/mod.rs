//! Order (§4.4): the 12-state order lifecycle and its escrow.
//!
//! A `#[repr(i16)]` state enum with compare-and-swap-only transitions: each
//! operation loads the order, checks its current state, and applies the
//! next state plus any field mutation in one atomic store update rather
//! than through a single monolithic state-machine function. Every
//! transition also appends a `StatusChange` to an append-only log.

pub mod escrow;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::idempotency::EventDedupe;
use crate::ids::{Did, EscrowId, OrderId};
use crate::money::Money;
use crate::params::{Params, ParamsStore, PARAM_CLIENT_FEE_PERCENTAGE, PARAM_ESCROW_HOLD_DURATION_DAYS, PARAM_PROTOCOL_FEE_PERCENTAGE};
use crate::ports::{PaymentGateway, PaymentProof};

pub use escrow::{Escrow, EscrowState, EscrowStore, InMemoryEscrowStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
pub enum OrderState {
    Draft = 1,
    PaymentPending = 2,
    Paid = 3,
    Confirmed = 4,
    Processing = 5,
    Shipped = 6,
    Delivered = 7,
    Completed = 8,
    PaymentFailed = 9,
    Cancelled = 10,
    Disputed = 11,
    Refunded = 12,
}

impl OrderState {
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(OrderState::Draft),
            2 => Some(OrderState::PaymentPending),
            3 => Some(OrderState::Paid),
            4 => Some(OrderState::Confirmed),
            5 => Some(OrderState::Processing),
            6 => Some(OrderState::Shipped),
            7 => Some(OrderState::Delivered),
            8 => Some(OrderState::Completed),
            9 => Some(OrderState::PaymentFailed),
            10 => Some(OrderState::Cancelled),
            11 => Some(OrderState::Disputed),
            12 => Some(OrderState::Refunded),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderState::Completed | OrderState::Cancelled | OrderState::Refunded
        )
    }

    /// Buyer or vendor may cancel up to, but not including, `Shipped` (§8
    /// resolves the ambiguous source behavior: either party, never after
    /// pickup).
    pub fn cancellable(&self) -> bool {
        matches!(
            self,
            OrderState::PaymentPending | OrderState::Paid | OrderState::Confirmed | OrderState::Processing
        )
    }

    /// States in which a dispute may be opened (§4.6): escrow must already
    /// be held.
    pub fn disputable(&self) -> bool {
        matches!(
            self,
            OrderState::Paid
                | OrderState::Confirmed
                | OrderState::Processing
                | OrderState::Shipped
                | OrderState::Delivered
        )
    }
}

impl TryFrom<i16> for OrderState {
    type Error = ();
    fn try_from(value: i16) -> std::result::Result<Self, Self::Error> {
        OrderState::from_id(value).ok_or(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisputeOutcome {
    BuyerFavor,
    VendorFavor,
}

/// §3 item invariant: `total_price = quantity * price_per_unit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    pub quantity: u32,
    pub price_per_unit: Money,
    pub total_price: Money,
}

impl OrderItem {
    /// Computes `total_price` from `quantity * price_per_unit` rather than
    /// trusting a caller-supplied value, so the invariant holds by
    /// construction.
    pub fn new(product_id: impl Into<String>, quantity: u32, price_per_unit: Money) -> Result<Self> {
        let total_price = price_per_unit
            .checked_mul_ratio(quantity as i64, 1)
            .map_err(|e| Error::invalid_input("quantity", format!("line item total overflowed: {e}")))?;
        Ok(Self {
            product_id: product_id.into(),
            quantity,
            price_per_unit,
            total_price,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub buyer_did: Did,
    pub vendor_did: Did,
    pub items: Vec<OrderItem>,
    pub subtotal: Money,
    pub protocol_fee: Money,
    pub client_fee: Money,
    pub payment_fee: Money,
    pub total: Money,
    pub payment_method: String,
    pub state: OrderState,
    pub escrow_id: Option<EscrowId>,
    pub tracking_number: Option<String>,
    pub logistics_provider_id: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// §4.4, §6: one entry per transition, append-only, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub order_id: OrderId,
    pub from: OrderState,
    pub to: OrderState,
    pub changed_by: String,
    pub reason: String,
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: Order) -> Result<()>;
    async fn get(&self, id: &OrderId) -> Result<Option<Order>>;
    /// CAS transition plus a mutator applied only once the state check
    /// passes, so the order_number/escrow wiring happens atomically with
    /// the state change from the caller's point of view. Appends a
    /// `StatusChange` to the order's log in the same critical section.
    #[allow(clippy::too_many_arguments)]
    async fn update_state_if(
        &self,
        id: &OrderId,
        expected: OrderState,
        new: OrderState,
        changed_by: &str,
        reason: &str,
        metadata: serde_json::Value,
        mutate: Box<dyn FnOnce(&mut Order) + Send>,
    ) -> Result<Order>;
    /// Orders past their dispute window still sitting in `Delivered` (§5).
    async fn due_for_auto_complete(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>>;
    /// The append-only transition log for one order, oldest first (§6).
    async fn status_log(&self, id: &OrderId) -> Result<Vec<StatusChange>>;
}

#[derive(Default)]
pub struct InMemoryOrderStore {
    inner: dashmap::DashMap<OrderId, Order>,
    order_numbers: dashmap::DashSet<String>,
    status_log: dashmap::DashMap<OrderId, Vec<StatusChange>>,
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> Result<()> {
        if !self.order_numbers.insert(order.order_number.clone()) {
            return Err(Error::conflict(format!("order_number {} already exists", order.order_number)));
        }
        self.inner.insert(order.id, order);
        Ok(())
    }

    async fn get(&self, id: &OrderId) -> Result<Option<Order>> {
        Ok(self.inner.get(id).map(|o| o.clone()))
    }

    async fn update_state_if(
        &self,
        id: &OrderId,
        expected: OrderState,
        new: OrderState,
        changed_by: &str,
        reason: &str,
        metadata: serde_json::Value,
        mutate: Box<dyn FnOnce(&mut Order) + Send>,
    ) -> Result<Order> {
        let mut entry = self
            .inner
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("order {id}")))?;
        if entry.state != expected {
            return Err(Error::invalid_transition(
                format!("{:?}", entry.state),
                format!("{:?}", new),
            ));
        }
        let from = entry.state;
        entry.state = new;
        entry.updated_at = Utc::now();
        mutate(&mut entry);
        let snapshot = entry.clone();
        drop(entry);

        self.status_log.entry(*id).or_default().push(StatusChange {
            order_id: *id,
            from,
            to: new,
            changed_by: changed_by.to_string(),
            reason: reason.to_string(),
            metadata,
            timestamp: snapshot.updated_at,
        });

        Ok(snapshot)
    }

    async fn due_for_auto_complete(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>> {
        Ok(self
            .inner
            .iter()
            .filter(|o| o.state == OrderState::Delivered && o.updated_at <= cutoff)
            .map(|o| o.clone())
            .collect())
    }

    async fn status_log(&self, id: &OrderId) -> Result<Vec<StatusChange>> {
        Ok(self.status_log.get(id).map(|v| v.clone()).unwrap_or_default())
    }
}

/// `"ORD-<YYYY>-<last6 of wall-clock-ms>-<3 base36 random>"` (§4.4).
fn generate_order_number() -> String {
    let millis = Utc::now().timestamp_millis().rem_euclid(1_000_000);
    format!("ORD-{}-{:06}-{}", Utc::now().format("%Y"), millis, random_base36(3))
}

fn random_base36(len: usize) -> String {
    use rand_core::RngCore;
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand_core::OsRng;
    (0..len)
        .map(|_| ALPHABET[(rng.next_u32() as usize) % ALPHABET.len()] as char)
        .collect()
}

fn require_party(order: &Order, actor: &Did) -> Result<()> {
    if actor != &order.buyer_did && actor != &order.vendor_did {
        return Err(Error::forbidden("actor is neither buyer nor vendor on this order"));
    }
    Ok(())
}

/// §4.4 operations, coordinating Order state with its Escrow and the
/// payment gateway port.
pub struct Service<OS: OrderStore, ES: EscrowStore, PS: ParamsStore, PG: PaymentGateway> {
    orders: Arc<OS>,
    escrows: Arc<ES>,
    params: Arc<Params<PS>>,
    gateway: Arc<PG>,
    dedupe: Arc<EventDedupe>,
}

impl<OS: OrderStore, ES: EscrowStore, PS: ParamsStore, PG: PaymentGateway> Service<OS, ES, PS, PG> {
    pub fn new(orders: Arc<OS>, escrows: Arc<ES>, params: Arc<Params<PS>>, gateway: Arc<PG>) -> Self {
        Self {
            orders,
            escrows,
            params,
            gateway,
            dedupe: Arc::new(EventDedupe::new()),
        }
    }

    /// Creates a draft order with fees computed from current protocol
    /// parameters (§4.1, §4.4). `items` must be non-empty and each item's
    /// `total_price` must already equal `quantity * price_per_unit`
    /// ([`OrderItem::new`] guarantees this).
    pub async fn create(
        &self,
        buyer_did: Did,
        vendor_did: Did,
        items: Vec<OrderItem>,
        payment_method: impl Into<String>,
    ) -> Result<Order> {
        self.params.require_not_paused().await?;

        if items.is_empty() {
            return Err(Error::invalid_input("items", "order must contain at least one line item"));
        }
        let currency = items[0].price_per_unit.currency;
        let mut subtotal = Money::zero(currency);
        for item in &items {
            let expected = item
                .price_per_unit
                .checked_mul_ratio(item.quantity as i64, 1)
                .map_err(|e| Error::invalid_input("items", format!("line item total overflowed: {e}")))?;
            if expected != item.total_price {
                return Err(Error::invalid_input(
                    "items",
                    format!("{}: total_price must equal quantity * price_per_unit", item.product_id),
                ));
            }
            subtotal = subtotal
                .checked_add(item.total_price)
                .map_err(|e| Error::invalid_input("items", e.to_string()))?;
        }

        let protocol_pct = self
            .params
            .get(PARAM_PROTOCOL_FEE_PERCENTAGE)
            .await?
            .as_f64()
            .unwrap_or(0.0);
        let client_pct = self
            .params
            .get(PARAM_CLIENT_FEE_PERCENTAGE)
            .await?
            .as_f64()
            .unwrap_or(0.0);

        let protocol_fee = percentage_of(subtotal, protocol_pct)?;
        let client_fee = percentage_of(subtotal, client_pct)?;
        let payment_method = payment_method.into();
        let payment_fee = payment_fee_for(&payment_method, subtotal)?;

        let total = subtotal
            .checked_add(protocol_fee)
            .and_then(|v| v.checked_add(client_fee))
            .and_then(|v| v.checked_add(payment_fee))
            .map_err(|e| Error::invalid_input("total", e.to_string()))?;

        let now = Utc::now();

        // order_number carries a unique index (§4.4); retry a handful of
        // times on the rare collision between the millisecond timestamp and
        // random suffix rather than failing the whole create.
        const MAX_ORDER_NUMBER_ATTEMPTS: usize = 5;
        let mut last_err = None;
        for _ in 0..MAX_ORDER_NUMBER_ATTEMPTS {
            let order = Order {
                id: OrderId::new(),
                order_number: generate_order_number(),
                buyer_did: buyer_did.clone(),
                vendor_did: vendor_did.clone(),
                items: items.iter().map(clone_item).collect(),
                subtotal,
                protocol_fee,
                client_fee,
                payment_fee,
                total,
                payment_method: payment_method.clone(),
                state: OrderState::Draft,
                escrow_id: None,
                tracking_number: None,
                logistics_provider_id: None,
                delivered_at: None,
                created_at: now,
                updated_at: now,
            };
            match self.orders.insert(order.clone()).await {
                Ok(()) => return Ok(order),
                Err(e @ Error::Conflict(_)) => last_err = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| Error::conflict("order_number")))
    }

    /// `draft -> payment_pending`, initializing payment instructions
    /// through the [`PaymentGateway`] port.
    pub async fn submit_payment(&self, order_id: &OrderId) -> Result<crate::ports::PaymentInstructions> {
        self.params.require_not_paused().await?;
        let order = self.get(order_id).await?;
        let instructions = self
            .gateway
            .initialize(&order.order_number, order.total, &order.payment_method)
            .await?;
        self.orders
            .update_state_if(
                order_id,
                OrderState::Draft,
                OrderState::PaymentPending,
                order.buyer_did.as_str(),
                "submit_payment",
                serde_json::json!({}),
                Box::new(|_| {}),
            )
            .await?;
        Ok(instructions)
    }

    /// `payment_pending -> paid` on a verified proof, opening escrow; or
    /// `payment_pending -> payment_failed` otherwise. Dedupes on
    /// `event_id` (§5, §8): a replayed callback returns
    /// [`Error::is_duplicate_event`] rather than re-applying.
    pub async fn confirm_payment(&self, order_id: &OrderId, proof: PaymentProof, event_id: &str) -> Result<Order> {
        self.params.require_not_paused().await?;
        if !self.dedupe.try_claim(&format!("confirm_payment:{event_id}")) {
            return Err(Error::conflict(format!("event {event_id} already applied")));
        }

        let order = self.get(order_id).await?;
        let verified = self.gateway.verify(&order.payment_method, &proof).await?;
        let metadata = serde_json::json!({ "event_id": event_id, "source_system_id": proof.source_system_id });

        if !verified {
            return self
                .orders
                .update_state_if(
                    order_id,
                    OrderState::PaymentPending,
                    OrderState::PaymentFailed,
                    "payment_gateway",
                    "payment_verification_failed",
                    metadata,
                    Box::new(|_| {}),
                )
                .await;
        }

        let hold_days = self
            .params
            .get(PARAM_ESCROW_HOLD_DURATION_DAYS)
            .await?
            .as_i64()
            .unwrap_or(7);
        let escrow = Escrow {
            id: EscrowId::new(),
            order_id: *order_id,
            amount: order.total,
            state: EscrowState::Held,
            held_at: Utc::now(),
            release_deadline: Utc::now() + chrono::Duration::days(hold_days),
            resolved_at: None,
        };
        let escrow_id = escrow.id;
        self.escrows.insert(escrow).await?;

        self.orders
            .update_state_if(
                order_id,
                OrderState::PaymentPending,
                OrderState::Paid,
                "payment_gateway",
                "payment_verified",
                metadata,
                Box::new(move |o| o.escrow_id = Some(escrow_id)),
            )
            .await
    }

    pub async fn retry_payment(&self, order_id: &OrderId) -> Result<Order> {
        self.params.require_not_paused().await?;
        let order = self.get(order_id).await?;
        self.orders
            .update_state_if(
                order_id,
                OrderState::PaymentFailed,
                OrderState::PaymentPending,
                order.buyer_did.as_str(),
                "retry_payment",
                serde_json::json!({}),
                Box::new(|_| {}),
            )
            .await
    }

    pub async fn vendor_confirm(&self, order_id: &OrderId, actor: &Did) -> Result<Order> {
        self.params.require_not_paused().await?;
        let order = self.get(order_id).await?;
        if actor != &order.vendor_did {
            return Err(Error::forbidden("only the vendor may confirm an order"));
        }
        self.orders
            .update_state_if(
                order_id,
                OrderState::Paid,
                OrderState::Confirmed,
                actor.as_str(),
                "vendor_confirm",
                serde_json::json!({}),
                Box::new(|_| {}),
            )
            .await
    }

    pub async fn start_processing(&self, order_id: &OrderId, actor: &Did) -> Result<Order> {
        self.params.require_not_paused().await?;
        let order = self.get(order_id).await?;
        if actor != &order.vendor_did {
            return Err(Error::forbidden("only the vendor may start processing"));
        }
        self.orders
            .update_state_if(
                order_id,
                OrderState::Confirmed,
                OrderState::Processing,
                actor.as_str(),
                "start_processing",
                serde_json::json!({}),
                Box::new(|_| {}),
            )
            .await
    }

    /// `processing -> shipped`, recording the carrier tracking number and
    /// bound logistics provider (§4.4).
    pub async fn mark_shipped(
        &self,
        order_id: &OrderId,
        actor: &Did,
        tracking_number: impl Into<String>,
        logistics_provider_id: impl Into<String>,
    ) -> Result<Order> {
        self.params.require_not_paused().await?;
        let order = self.get(order_id).await?;
        if actor != &order.vendor_did {
            return Err(Error::forbidden("only the vendor may mark an order shipped"));
        }
        let tracking_number = tracking_number.into();
        let logistics_provider_id = logistics_provider_id.into();
        self.orders
            .update_state_if(
                order_id,
                OrderState::Processing,
                OrderState::Shipped,
                actor.as_str(),
                "mark_shipped",
                serde_json::json!({ "tracking_number": tracking_number, "logistics_provider_id": logistics_provider_id }),
                Box::new(move |o| {
                    o.tracking_number = Some(tracking_number);
                    o.logistics_provider_id = Some(logistics_provider_id);
                }),
            )
            .await
    }

    /// `shipped -> delivered`: the buyer, the bound logistics provider, or a
    /// shipment `delivered` event (§4.4, §4.5 upward edge) may call this.
    /// Dedupes on `event_id` (§5, §8).
    pub async fn mark_delivered(&self, order_id: &OrderId, event_id: &str) -> Result<Order> {
        self.params.require_not_paused().await?;
        if !self.dedupe.try_claim(&format!("mark_delivered:{event_id}")) {
            return Err(Error::conflict(format!("event {event_id} already applied")));
        }
        self.orders
            .update_state_if(
                order_id,
                OrderState::Shipped,
                OrderState::Delivered,
                "logistics",
                "shipment_delivered",
                serde_json::json!({ "event_id": event_id }),
                Box::new(|o| o.delivered_at = Some(Utc::now())),
            )
            .await
    }

    /// Buyer confirmation, or the dispute-window sweep (§5), releases
    /// escrow and completes the order.
    pub async fn complete(&self, order_id: &OrderId) -> Result<Order> {
        self.params.require_not_paused().await?;
        let order = self.get(order_id).await?;
        if let Some(escrow_id) = order.escrow_id {
            self.escrows
                .update_state_if(&escrow_id, EscrowState::Held, EscrowState::Released)
                .await?;
        }
        self.orders
            .update_state_if(
                order_id,
                OrderState::Delivered,
                OrderState::Completed,
                "buyer_confirmation_or_sweep",
                "order_completed",
                serde_json::json!({}),
                Box::new(|_| {}),
            )
            .await
    }

    /// §8: either the buyer or the vendor may cancel before shipment.
    /// Refunds escrow if payment had already been captured.
    pub async fn cancel(&self, order_id: &OrderId, actor: &Did) -> Result<Order> {
        self.params.require_not_paused().await?;
        let order = self.get(order_id).await?;
        require_party(&order, actor)?;
        if !order.state.cancellable() {
            return Err(Error::invalid_transition(format!("{:?}", order.state), "Cancelled".into()));
        }

        if let Some(escrow_id) = order.escrow_id {
            self.escrows
                .update_state_if(&escrow_id, EscrowState::Held, EscrowState::Refunded)
                .await?;
            self.gateway
                .refund(&order.order_number, order.total)
                .await?;
        }

        self.orders
            .update_state_if(
                order_id,
                order.state,
                OrderState::Cancelled,
                actor.as_str(),
                "cancel",
                serde_json::json!({}),
                Box::new(|_| {}),
            )
            .await
    }

    /// Opens a dispute, moving escrow from `Held` to `Disputed` (§4.6).
    pub async fn open_dispute(&self, order_id: &OrderId) -> Result<Order> {
        self.params.require_not_paused().await?;
        let order = self.get(order_id).await?;
        if !order.state.disputable() {
            return Err(Error::invalid_transition(format!("{:?}", order.state), "Disputed".into()));
        }
        if let Some(escrow_id) = order.escrow_id {
            self.escrows
                .update_state_if(&escrow_id, EscrowState::Held, EscrowState::Disputed)
                .await?;
        }
        self.orders
            .update_state_if(
                order_id,
                order.state,
                OrderState::Disputed,
                order.buyer_did.as_str(),
                "open_dispute",
                serde_json::json!({}),
                Box::new(|_| {}),
            )
            .await
    }

    /// Applies a dispute resolution (§4.6): buyer favor refunds escrow,
    /// vendor favor releases it.
    pub async fn resolve_dispute(&self, order_id: &OrderId, outcome: DisputeOutcome) -> Result<Order> {
        self.params.require_not_paused().await?;
        let order = self.get(order_id).await?;
        let (new_state, new_escrow_state) = match outcome {
            DisputeOutcome::BuyerFavor => (OrderState::Refunded, EscrowState::Refunded),
            DisputeOutcome::VendorFavor => (OrderState::Completed, EscrowState::Released),
        };
        if let Some(escrow_id) = order.escrow_id {
            self.escrows
                .update_state_if(&escrow_id, EscrowState::Disputed, new_escrow_state)
                .await?;
        }
        if matches!(outcome, DisputeOutcome::BuyerFavor) {
            self.gateway.refund(&order.order_number, order.total).await?;
        }
        self.orders
            .update_state_if(
                order_id,
                OrderState::Disputed,
                new_state,
                "dispute_resolution",
                "resolve_dispute",
                serde_json::json!({ "outcome": format!("{outcome:?}") }),
                Box::new(|_| {}),
            )
            .await
    }

    pub async fn get(&self, order_id: &OrderId) -> Result<Order> {
        self.orders
            .get(order_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("order {order_id}")))
    }

    /// The append-only transition history for one order (§6, §8).
    pub async fn status_log(&self, order_id: &OrderId) -> Result<Vec<StatusChange>> {
        self.orders.status_log(order_id).await
    }
}

fn clone_item(item: &OrderItem) -> OrderItem {
    OrderItem {
        product_id: item.product_id.clone(),
        quantity: item.quantity,
        price_per_unit: item.price_per_unit,
        total_price: item.total_price,
    }
}

fn percentage_of(amount: Money, percentage: f64) -> Result<Money> {
    // percentage is expressed as e.g. 3.0 for 3%; scale by 1000 to keep the
    // ratio in integers for checked_mul_ratio.
    let numerator = (percentage * 1000.0).round() as i64;
    amount
        .checked_mul_ratio(numerator, 100_000)
        .map_err(|e| Error::invalid_input("fee", e.to_string()))
}

/// Method-specific payment fee (§4.4): stripe is 2.9% of subtotal plus a
/// flat 30-minor-unit charge, lightning is 0.1% of subtotal, everything
/// else is free.
fn payment_fee_for(method: &str, subtotal: Money) -> Result<Money> {
    match method {
        "stripe" => {
            let percentage = subtotal
                .checked_mul_ratio(29, 1000)
                .map_err(|e| Error::invalid_input("payment_fee", e.to_string()))?;
            percentage
                .checked_add(Money::new(30, subtotal.currency))
                .map_err(|e| Error::invalid_input("payment_fee", e.to_string()))
        }
        "lightning" => subtotal
            .checked_mul_ratio(1, 1000)
            .map_err(|e| Error::invalid_input("payment_fee", e.to_string())),
        _ => Ok(Money::zero(subtotal.currency)),
    }
}
