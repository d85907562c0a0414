//! Quote auction (§4.5): providers bid on an order's shipment; at most one
//! quote may be accepted per order, and accepting one rejects every other
//! pending sibling atomically.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ids::{OrderId, ProviderId, QuoteId};
use crate::logistics::provider::ShippingMethod;
use crate::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
pub enum QuoteState {
    Pending = 1,
    Accepted = 2,
    Rejected = 3,
    Expired = 4,
}

impl QuoteState {
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(QuoteState::Pending),
            2 => Some(QuoteState::Accepted),
            3 => Some(QuoteState::Rejected),
            4 => Some(QuoteState::Expired),
            _ => None,
        }
    }
}

impl TryFrom<i16> for QuoteState {
    type Error = ();
    fn try_from(value: i16) -> std::result::Result<Self, Self::Error> {
        QuoteState::from_id(value).ok_or(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub order_id: OrderId,
    pub provider_id: ProviderId,
    pub method: ShippingMethod,
    pub amount: Money,
    pub eta_days: u32,
    pub insurance_included: bool,
    pub state: QuoteState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait QuoteStore: Send + Sync {
    async fn insert(&self, quote: Quote) -> Result<()>;
    async fn get(&self, id: &QuoteId) -> Result<Option<Quote>>;
    async fn for_order(&self, order_id: &OrderId) -> Result<Vec<Quote>>;
    /// Accepts `id` and rejects every other `Pending` quote for the same
    /// order in one pass, enforcing the at-most-one-accepted invariant.
    async fn accept_and_reject_siblings(&self, id: &QuoteId) -> Result<Quote>;
    async fn due_for_expiry(&self, now: DateTime<Utc>) -> Result<Vec<Quote>>;
    async fn mark_expired(&self, id: &QuoteId) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryQuoteStore {
    inner: dashmap::DashMap<QuoteId, Quote>,
}

#[async_trait]
impl QuoteStore for InMemoryQuoteStore {
    async fn insert(&self, quote: Quote) -> Result<()> {
        let already_accepted = self
            .inner
            .iter()
            .any(|q| q.order_id == quote.order_id && q.state == QuoteState::Accepted);
        if already_accepted {
            return Err(Error::conflict(format!(
                "order {} already has an accepted quote",
                quote.order_id
            )));
        }
        let duplicate_pending = self.inner.iter().any(|q| {
            q.order_id == quote.order_id && q.provider_id == quote.provider_id && q.state == QuoteState::Pending
        });
        if duplicate_pending {
            return Err(Error::conflict(format!(
                "provider {} already has a pending quote for order {}",
                quote.provider_id, quote.order_id
            )));
        }
        self.inner.insert(quote.id, quote);
        Ok(())
    }

    async fn get(&self, id: &QuoteId) -> Result<Option<Quote>> {
        Ok(self.inner.get(id).map(|q| q.clone()))
    }

    async fn for_order(&self, order_id: &OrderId) -> Result<Vec<Quote>> {
        Ok(self
            .inner
            .iter()
            .filter(|q| &q.order_id == order_id)
            .map(|q| q.clone())
            .collect())
    }

    async fn accept_and_reject_siblings(&self, id: &QuoteId) -> Result<Quote> {
        let order_id = self
            .inner
            .get(id)
            .map(|q| q.order_id)
            .ok_or_else(|| Error::not_found(format!("quote {id}")))?;

        {
            let mut target = self.inner.get_mut(id).unwrap();
            if target.state != QuoteState::Pending {
                return Err(Error::conflict(format!("quote {id} is not pending")));
            }
            target.state = QuoteState::Accepted;
        }

        for mut sibling in self.inner.iter_mut() {
            if sibling.order_id == order_id && sibling.id != *id && sibling.state == QuoteState::Pending {
                sibling.state = QuoteState::Rejected;
            }
        }

        Ok(self.inner.get(id).unwrap().clone())
    }

    async fn due_for_expiry(&self, now: DateTime<Utc>) -> Result<Vec<Quote>> {
        Ok(self
            .inner
            .iter()
            .filter(|q| q.state == QuoteState::Pending && q.expires_at <= now)
            .map(|q| q.clone())
            .collect())
    }

    async fn mark_expired(&self, id: &QuoteId) -> Result<()> {
        let mut entry = self
            .inner
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("quote {id}")))?;
        if entry.state == QuoteState::Pending {
            entry.state = QuoteState::Expired;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::USD;

    fn quote(order_id: OrderId) -> Quote {
        Quote {
            id: QuoteId::new(),
            order_id,
            provider_id: ProviderId::new(),
            method: ShippingMethod::Standard,
            amount: Money::new(500, USD),
            eta_days: 3,
            insurance_included: false,
            state: QuoteState::Pending,
            created_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::hours(24),
        }
    }

    #[tokio::test]
    async fn accepting_a_quote_rejects_its_siblings() {
        let store = InMemoryQuoteStore::default();
        let order_id = OrderId::new();
        let a = quote(order_id);
        let b = quote(order_id);
        let a_id = a.id;
        let b_id = b.id;
        store.insert(a).await.unwrap();
        store.insert(b).await.unwrap();

        store.accept_and_reject_siblings(&a_id).await.unwrap();

        assert_eq!(store.get(&a_id).await.unwrap().unwrap().state, QuoteState::Accepted);
        assert_eq!(store.get(&b_id).await.unwrap().unwrap().state, QuoteState::Rejected);
    }

    #[tokio::test]
    async fn cannot_insert_a_second_quote_once_one_is_accepted() {
        let store = InMemoryQuoteStore::default();
        let order_id = OrderId::new();
        let a = quote(order_id);
        let a_id = a.id;
        store.insert(a).await.unwrap();
        store.accept_and_reject_siblings(&a_id).await.unwrap();

        assert!(store.insert(quote(order_id)).await.is_err());
    }

    #[tokio::test]
    async fn accepting_a_non_pending_quote_fails() {
        let store = InMemoryQuoteStore::default();
        let order_id = OrderId::new();
        let a = quote(order_id);
        let a_id = a.id;
        store.insert(a).await.unwrap();
        store.accept_and_reject_siblings(&a_id).await.unwrap();

        assert!(store.accept_and_reject_siblings(&a_id).await.is_err());
    }
}
