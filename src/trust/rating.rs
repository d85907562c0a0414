//! Sealed-reveal ratings (§4.6): neither party's rating is visible to the
//! other until both have submitted, or 7 days have passed since the first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ids::{Did, OrderId, RatingId};

/// Reveal deadline if only one side has rated (§4.6).
pub const REVEAL_AFTER_FIRST: chrono::Duration = chrono::Duration::days(7);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rating {
    pub id: RatingId,
    pub order_id: OrderId,
    pub rater_did: Did,
    pub ratee_did: Did,
    pub score: u8,
    pub comment: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Both sides of an order's rating exchange, sealed until revealed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RatingPair {
    pub buyer_rating: Option<Rating>,
    pub vendor_rating: Option<Rating>,
    pub revealed: bool,
}

impl RatingPair {
    pub fn first_submitted_at(&self) -> Option<DateTime<Utc>> {
        match (&self.buyer_rating, &self.vendor_rating) {
            (Some(a), Some(b)) => Some(a.submitted_at.min(b.submitted_at)),
            (Some(a), None) => Some(a.submitted_at),
            (None, Some(b)) => Some(b.submitted_at),
            (None, None) => None,
        }
    }

    pub fn should_reveal(&self, now: DateTime<Utc>) -> bool {
        if self.buyer_rating.is_some() && self.vendor_rating.is_some() {
            return true;
        }
        self.first_submitted_at()
            .is_some_and(|first| now - first >= REVEAL_AFTER_FIRST)
    }
}

#[async_trait]
pub trait RatingStore: Send + Sync {
    async fn get_pair(&self, order_id: &OrderId) -> Result<RatingPair>;
    async fn submit(&self, order_id: &OrderId, rating: Rating, is_buyer: bool) -> Result<RatingPair>;
    async fn reveal(&self, order_id: &OrderId) -> Result<RatingPair>;
    async fn due_for_reveal(&self, now: DateTime<Utc>) -> Result<Vec<OrderId>>;
}

#[derive(Default)]
pub struct InMemoryRatingStore {
    inner: dashmap::DashMap<OrderId, RatingPair>,
}

#[async_trait]
impl RatingStore for InMemoryRatingStore {
    async fn get_pair(&self, order_id: &OrderId) -> Result<RatingPair> {
        Ok(self.inner.get(order_id).map(|p| p.clone()).unwrap_or_default())
    }

    async fn submit(&self, order_id: &OrderId, rating: Rating, is_buyer: bool) -> Result<RatingPair> {
        let mut pair = self.inner.entry(*order_id).or_default();
        let slot = if is_buyer {
            &mut pair.buyer_rating
        } else {
            &mut pair.vendor_rating
        };
        if slot.is_some() {
            return Err(Error::conflict("rating already submitted for this side"));
        }
        *slot = Some(rating);
        if pair.buyer_rating.is_some() && pair.vendor_rating.is_some() {
            pair.revealed = true;
        }
        Ok(pair.clone())
    }

    async fn reveal(&self, order_id: &OrderId) -> Result<RatingPair> {
        let mut pair = self
            .inner
            .get_mut(order_id)
            .ok_or_else(|| Error::not_found(format!("rating pair for order {order_id}")))?;
        pair.revealed = true;
        Ok(pair.clone())
    }

    async fn due_for_reveal(&self, now: DateTime<Utc>) -> Result<Vec<OrderId>> {
        Ok(self
            .inner
            .iter()
            .filter(|entry| !entry.revealed && entry.should_reveal(now))
            .map(|entry| *entry.key())
            .collect())
    }
}

/// What `viewer_did` is allowed to see of an order's rating pair before
/// reveal: their own submission, but never the counterparty's (§4.6).
pub fn visible_to(pair: &RatingPair, viewer_did: &Did) -> RatingPair {
    if pair.revealed {
        return pair.clone();
    }
    RatingPair {
        buyer_rating: pair
            .buyer_rating
            .clone()
            .filter(|r| &r.rater_did == viewer_did),
        vendor_rating: pair
            .vendor_rating
            .clone()
            .filter(|r| &r.rater_did == viewer_did),
        revealed: false,
    }
}
