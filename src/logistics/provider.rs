//! Shipping provider registry (§4.5). A provider must clear kyc
//! verification before it can be registered to bid on quotes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ids::{Did, ProviderId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    Active,
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShippingMethod {
    Standard,
    Express,
    Freight,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: ProviderId,
    pub operator_did: Did,
    pub name: String,
    pub regions_served: Vec<String>,
    pub shipping_methods: Vec<ShippingMethod>,
    pub insurance_available: bool,
    pub average_rating: f64,
    pub total_deliveries: u32,
    pub status: ProviderStatus,
    pub registered_at: DateTime<Utc>,
}

/// §4.5 `Find` filters: unset fields are not applied.
#[derive(Debug, Clone, Default)]
pub struct ProviderQuery<'a> {
    pub region: Option<&'a str>,
    pub method: Option<ShippingMethod>,
    pub insurance_required: bool,
    pub min_rating: Option<f64>,
}

#[async_trait]
pub trait ProviderStore: Send + Sync {
    async fn insert(&self, provider: Provider) -> Result<()>;
    async fn get(&self, id: &ProviderId) -> Result<Option<Provider>>;
    async fn set_status(&self, id: &ProviderId, status: ProviderStatus) -> Result<()>;
    async fn active_for_region(&self, region: &str) -> Result<Vec<Provider>>;
    async fn find(&self, query: ProviderQuery<'_>) -> Result<Vec<Provider>>;
    async fn record_delivery_rating(&self, id: &ProviderId, rating: f64) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryProviderStore {
    inner: dashmap::DashMap<ProviderId, Provider>,
}

#[async_trait]
impl ProviderStore for InMemoryProviderStore {
    async fn insert(&self, provider: Provider) -> Result<()> {
        self.inner.insert(provider.id, provider);
        Ok(())
    }

    async fn get(&self, id: &ProviderId) -> Result<Option<Provider>> {
        Ok(self.inner.get(id).map(|p| p.clone()))
    }

    async fn set_status(&self, id: &ProviderId, status: ProviderStatus) -> Result<()> {
        let mut entry = self
            .inner
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("provider {id}")))?;
        entry.status = status;
        Ok(())
    }

    async fn active_for_region(&self, region: &str) -> Result<Vec<Provider>> {
        Ok(self
            .inner
            .iter()
            .filter(|p| p.status == ProviderStatus::Active && p.regions_served.iter().any(|r| r == region))
            .map(|p| p.clone())
            .collect())
    }

    /// §4.5 `Find`: matches sorted by (average_rating DESC NULLS LAST,
    /// total_deliveries DESC).
    async fn find(&self, query: ProviderQuery<'_>) -> Result<Vec<Provider>> {
        let mut matches: Vec<Provider> = self
            .inner
            .iter()
            .filter(|p| p.status == ProviderStatus::Active)
            .filter(|p| query.region.is_none_or(|r| p.regions_served.iter().any(|s| s == r)))
            .filter(|p| query.method.is_none_or(|m| p.shipping_methods.contains(&m)))
            .filter(|p| !query.insurance_required || p.insurance_available)
            .filter(|p| query.min_rating.is_none_or(|min| p.average_rating >= min))
            .map(|p| p.clone())
            .collect();
        matches.sort_by(|a, b| {
            b.average_rating
                .partial_cmp(&a.average_rating)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.total_deliveries.cmp(&a.total_deliveries))
        });
        Ok(matches)
    }

    /// §4.5 `UpdateRating`: rolling mean over `total_deliveries + 1`.
    async fn record_delivery_rating(&self, id: &ProviderId, rating: f64) -> Result<()> {
        let mut entry = self
            .inner
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("provider {id}")))?;
        let new_total = entry.total_deliveries + 1;
        entry.average_rating = (entry.average_rating * entry.total_deliveries as f64 + rating) / new_total as f64;
        entry.total_deliveries = new_total;
        Ok(())
    }
}

/// Registers a provider whose operator identity is kyc-verified
/// (§4.5: providers must be kyc-verified to bid).
pub async fn register<PS: ProviderStore>(
    store: &PS,
    operator_did: Did,
    operator_can_transact: bool,
    name: impl Into<String>,
    regions_served: Vec<String>,
    shipping_methods: Vec<ShippingMethod>,
    insurance_available: bool,
) -> Result<ProviderId> {
    if !operator_can_transact {
        return Err(Error::forbidden("provider operator must be kyc-verified"));
    }
    if regions_served.is_empty() {
        return Err(Error::invalid_input("regions_served", "must serve at least one region"));
    }
    if shipping_methods.is_empty() {
        return Err(Error::invalid_input("shipping_methods", "must support at least one shipping method"));
    }
    let provider = Provider {
        id: ProviderId::new(),
        operator_did,
        name: name.into(),
        regions_served,
        shipping_methods,
        insurance_available,
        average_rating: 0.0,
        total_deliveries: 0,
        status: ProviderStatus::Active,
        registered_at: Utc::now(),
    };
    let id = provider.id;
    store.insert(provider).await?;
    Ok(id)
}
