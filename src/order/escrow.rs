//! Escrow (§4.4): holds the buyer's payment until delivery is confirmed or
//! a dispute resolves it elsewhere.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ids::{EscrowId, OrderId};
use crate::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
pub enum EscrowState {
    Held = 1,
    Released = 2,
    Refunded = 3,
    Disputed = 4,
}

impl EscrowState {
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(EscrowState::Held),
            2 => Some(EscrowState::Released),
            3 => Some(EscrowState::Refunded),
            4 => Some(EscrowState::Disputed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EscrowState::Released | EscrowState::Refunded)
    }
}

impl TryFrom<i16> for EscrowState {
    type Error = ();
    fn try_from(value: i16) -> std::result::Result<Self, Self::Error> {
        EscrowState::from_id(value).ok_or(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escrow {
    pub id: EscrowId,
    pub order_id: OrderId,
    pub amount: Money,
    pub state: EscrowState,
    pub held_at: DateTime<Utc>,
    pub release_deadline: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait EscrowStore: Send + Sync {
    async fn insert(&self, escrow: Escrow) -> Result<()>;
    async fn get(&self, id: &EscrowId) -> Result<Option<Escrow>>;
    async fn get_by_order(&self, order_id: &OrderId) -> Result<Option<Escrow>>;
    /// CAS transition: succeeds only if the stored state equals `expected`.
    async fn update_state_if(&self, id: &EscrowId, expected: EscrowState, new: EscrowState) -> Result<()>;
    /// All escrows still `Held` past their release deadline (§5 sweep).
    async fn due_for_auto_release(&self, now: DateTime<Utc>) -> Result<Vec<Escrow>>;
}

#[derive(Default)]
pub struct InMemoryEscrowStore {
    by_id: dashmap::DashMap<EscrowId, Escrow>,
    by_order: dashmap::DashMap<OrderId, EscrowId>,
}

#[async_trait]
impl EscrowStore for InMemoryEscrowStore {
    async fn insert(&self, escrow: Escrow) -> Result<()> {
        self.by_order.insert(escrow.order_id, escrow.id);
        self.by_id.insert(escrow.id, escrow);
        Ok(())
    }

    async fn get(&self, id: &EscrowId) -> Result<Option<Escrow>> {
        Ok(self.by_id.get(id).map(|e| e.clone()))
    }

    async fn get_by_order(&self, order_id: &OrderId) -> Result<Option<Escrow>> {
        let Some(id) = self.by_order.get(order_id).map(|v| *v) else {
            return Ok(None);
        };
        self.get(&id).await
    }

    async fn update_state_if(&self, id: &EscrowId, expected: EscrowState, new: EscrowState) -> Result<()> {
        let mut entry = self
            .by_id
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("escrow {id}")))?;
        if entry.state != expected {
            return Err(Error::conflict(format!(
                "escrow {id} expected state {:?}, found {:?}",
                expected, entry.state
            )));
        }
        entry.state = new;
        if new.is_terminal() {
            entry.resolved_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn due_for_auto_release(&self, now: DateTime<Utc>) -> Result<Vec<Escrow>> {
        Ok(self
            .by_id
            .iter()
            .filter(|e| e.state == EscrowState::Held && e.release_deadline <= now)
            .map(|e| e.clone())
            .collect())
    }
}
