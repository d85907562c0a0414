//! External collaborator ports (§1, §6).
//!
//! HTTP routing, token minting, a relational store, payment rails, price
//! feeds, websocket fan-out, and catalog indexing are all explicitly out of
//! scope — the core only ever calls through these narrow traits. Every call
//! carries an implicit deadline (§5: default 5s); an implementation that
//! exceeds it must return `Error::UpstreamTimeout` rather than let the
//! caller hang.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::money::Money;

/// Default deadline applied to every port call (§5).
pub const DEFAULT_PORT_DEADLINE: Duration = Duration::from_secs(5);

/// A proof of payment submitted either by a gateway callback or by a buyer
/// (§4.4: `payment_pending -> paid`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentProof {
    pub method: String,
    pub source_system_id: String,
    pub observed_at: DateTime<Utc>,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInstructions {
    pub method: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRecord {
    pub payment_id: String,
    pub amount: Money,
    pub refunded_at: DateTime<Utc>,
}

/// §6: `Initialize`, `Verify`, `Refund`. Lightning/Stripe/bank rails are
/// mocked behind this port.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize(
        &self,
        order_id: &str,
        amount: Money,
        method: &str,
    ) -> Result<PaymentInstructions>;

    async fn verify(&self, method: &str, proof: &PaymentProof) -> Result<bool>;

    async fn refund(&self, payment_id: &str, amount: Money) -> Result<RefundRecord>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateQuote {
    pub amount: f64,
    pub rate: f64,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

/// §6: `BTCPrice`, `Convert`. Implementations must fall back across sources
/// and may serve a last-known rate, but a quote older than 24h for a
/// safety-critical conversion is a hard error — enforced here, not by each
/// caller.
#[async_trait]
pub trait RateOracle: Send + Sync {
    async fn btc_price(&self) -> Result<RateQuote>;
    async fn convert(&self, amount: Money, to: &str) -> Result<RateQuote>;
}

/// Rejects a quote staler than this for a safety-critical conversion (§6).
pub const MAX_RATE_AGE: chrono::Duration = chrono::Duration::hours(24);

pub fn require_fresh_rate(quote: &RateQuote, now: DateTime<Utc>) -> Result<()> {
    if now.signed_duration_since(quote.timestamp) > MAX_RATE_AGE {
        return Err(Error::UpstreamError {
            port: "RateOracle".into(),
            reason: "rate quote older than 24h".into(),
        });
    }
    Ok(())
}

/// §6: `Emit(topic, payload)`, at-most-once, fire-and-forget after commit
/// (§5). Delivery failure never rolls back state.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn emit(&self, topic: &str, payload: serde_json::Value);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub product_id: String,
    pub weight_grams: u32,
    pub dims_mm: (u32, u32, u32),
    pub origin_region: String,
    pub lead_time_days: u32,
    pub vendor_did: String,
    pub price: Money,
}

/// §2: the Catalog port exposes `GetProduct` to Logistics and Order; §6
/// additionally lists `Sync`/`Remove`/`Query` for the CatalogIndex used by
/// search/discovery, kept on the same trait since both are read/write views
/// over the same external product data the core never owns.
#[async_trait]
pub trait CatalogIndex: Send + Sync {
    async fn get_product(&self, product_id: &str) -> Result<CatalogEntry>;
    async fn sync(&self, entry: CatalogEntry) -> Result<()>;
    async fn remove(&self, product_id: &str) -> Result<()>;
    async fn query(&self, region: Option<&str>) -> Result<Vec<CatalogEntry>>;
}

// ---------------------------------------------------------------------
// Mock / in-process reference implementations — used by tests and by the
// demo binary. Production deployments swap these for real adapters.
// ---------------------------------------------------------------------

/// Always-approves payment gateway, for tests and local development.
pub struct MockPaymentGateway {
    counter: AtomicU64,
}

impl Default for MockPaymentGateway {
    fn default() -> Self {
        Self {
            counter: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn initialize(
        &self,
        order_id: &str,
        amount: Money,
        method: &str,
    ) -> Result<PaymentInstructions> {
        tracing::debug!(order_id, %amount, method, "mock payment gateway: initialize");
        Ok(PaymentInstructions {
            method: method.to_string(),
            payload: serde_json::json!({ "order_id": order_id, "amount": amount.minor_units }),
        })
    }

    async fn verify(&self, _method: &str, _proof: &PaymentProof) -> Result<bool> {
        Ok(true)
    }

    async fn refund(&self, payment_id: &str, amount: Money) -> Result<RefundRecord> {
        let id = self.counter.fetch_add(1, Ordering::Relaxed);
        Ok(RefundRecord {
            payment_id: format!("{payment_id}-refund-{id}"),
            amount,
            refunded_at: Utc::now(),
        })
    }
}

/// Fixed-rate oracle for tests; always reports a fresh timestamp.
pub struct MockRateOracle;

#[async_trait]
impl RateOracle for MockRateOracle {
    async fn btc_price(&self) -> Result<RateQuote> {
        Ok(RateQuote {
            amount: 60_000.0,
            rate: 1.0,
            source: "mock".into(),
            timestamp: Utc::now(),
        })
    }

    async fn convert(&self, amount: Money, to: &str) -> Result<RateQuote> {
        Ok(RateQuote {
            amount: amount.minor_units as f64 / 100.0,
            rate: 1.0,
            source: format!("mock->{to}"),
            timestamp: Utc::now(),
        })
    }
}

/// Drops every notification; logs at debug for test visibility.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn emit(&self, topic: &str, payload: serde_json::Value) {
        tracing::debug!(topic, %payload, "noop notifier: dropped");
    }
}

/// In-memory catalog backed by a map, for tests.
pub struct MockCatalog {
    entries: dashmap::DashMap<String, CatalogEntry>,
}

impl Default for MockCatalog {
    fn default() -> Self {
        Self {
            entries: dashmap::DashMap::new(),
        }
    }
}

#[async_trait]
impl CatalogIndex for MockCatalog {
    async fn get_product(&self, product_id: &str) -> Result<CatalogEntry> {
        self.entries
            .get(product_id)
            .map(|e| e.clone())
            .ok_or_else(|| Error::not_found(format!("product {product_id}")))
    }

    async fn sync(&self, entry: CatalogEntry) -> Result<()> {
        self.entries.insert(entry.product_id.clone(), entry);
        Ok(())
    }

    async fn remove(&self, product_id: &str) -> Result<()> {
        self.entries.remove(product_id);
        Ok(())
    }

    async fn query(&self, region: Option<&str>) -> Result<Vec<CatalogEntry>> {
        Ok(self
            .entries
            .iter()
            .filter(|e| region.is_none_or(|r| e.origin_region == r))
            .map(|e| e.clone())
            .collect())
    }
}
