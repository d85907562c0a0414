//! Params (§4.1): a process-wide, read-through view of the Parameter table.
//!
//! Writes happen only as the side effect of an executed governance
//! proposal (§4.7). Reads are cached with a short TTL, except the pause
//! flag and any other safety-critical read, which must always go through
//! to the store (§4.1, §5).

use std::sync::Arc;

use async_trait::async_trait;
use cached::{Cached, TimedCache};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{Error, Result};

pub const PARAM_PROTOCOL_FEE_PERCENTAGE: &str = "protocol_fee_percentage";
pub const PARAM_CLIENT_FEE_PERCENTAGE: &str = "client_fee_percentage";
pub const PARAM_ESCROW_HOLD_DURATION_DAYS: &str = "escrow_hold_duration_days";
pub const PARAM_DISPUTE_WINDOW_DAYS: &str = "dispute_window_days";
pub const PARAM_EMERGENCY_PAUSE_ENABLED: &str = "emergency_pause_enabled";
pub const PARAM_PROOF_VALIDITY_DAYS_DEFAULT: &str = "proof_validity_days_default";
pub const PARAM_VENDOR_RESPONSE_WINDOW_HOURS: &str = "vendor_response_window_hours";

/// A typed parameter value. Kept as a small closed union rather than a bare
/// `serde_json::Value` since every recognized option in §6 is a number,
/// integer, or bool — never free-form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamValue {
    Number(f64),
    Integer(i64),
    Bool(bool),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(v) => Some(*v),
            ParamValue::Integer(v) => Some(*v as f64),
            ParamValue::Bool(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

/// §3: `{name, value, previous_value, last_updated_by, last_updated_at,
/// change_reason}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: ParamValue,
    pub previous_value: Option<ParamValue>,
    pub last_updated_by: Option<String>,
    pub last_updated_at: DateTime<Utc>,
    pub change_reason: Option<String>,
}

/// The narrow store interface this component depends on (§9: no
/// process-wide singleton except this one).
#[async_trait]
pub trait ParamsStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<Parameter>>;
    async fn set(&self, param: Parameter) -> Result<()>;
}

/// In-memory reference implementation.
#[derive(Default)]
pub struct InMemoryParamsStore {
    inner: dashmap::DashMap<String, Parameter>,
}

#[async_trait]
impl ParamsStore for InMemoryParamsStore {
    async fn get(&self, name: &str) -> Result<Option<Parameter>> {
        Ok(self.inner.get(name).map(|p| p.clone()))
    }

    async fn set(&self, param: Parameter) -> Result<()> {
        self.inner.insert(param.name.clone(), param);
        Ok(())
    }
}

fn default_params() -> Vec<(&'static str, ParamValue)> {
    vec![
        (PARAM_PROTOCOL_FEE_PERCENTAGE, ParamValue::Number(3.0)),
        (PARAM_CLIENT_FEE_PERCENTAGE, ParamValue::Number(0.0)),
        (PARAM_ESCROW_HOLD_DURATION_DAYS, ParamValue::Integer(7)),
        (PARAM_DISPUTE_WINDOW_DAYS, ParamValue::Integer(7)),
        (PARAM_EMERGENCY_PAUSE_ENABLED, ParamValue::Bool(false)),
        (PARAM_PROOF_VALIDITY_DAYS_DEFAULT, ParamValue::Integer(30)),
        (PARAM_VENDOR_RESPONSE_WINDOW_HOURS, ParamValue::Integer(48)),
    ]
}

/// Read-through cache TTL for non-safety-critical parameter reads.
const CACHE_TTL_SECS: u64 = 5;

/// Process-wide Params view (§4.1). The one intentional singleton in the
/// design (§9); every other component is a narrow struct taking this by
/// `Arc` reference.
pub struct Params<S: ParamsStore> {
    store: Arc<S>,
    cache: Mutex<TimedCache<String, ParamValue>>,
}

impl<S: ParamsStore> Params<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            cache: Mutex::new(TimedCache::with_lifespan(CACHE_TTL_SECS)),
        }
    }

    /// Seed the store with protocol defaults (§6) for any parameter not
    /// already present. Idempotent.
    pub async fn bootstrap_defaults(&self) -> Result<()> {
        for (name, value) in default_params() {
            if self.store.get(name).await?.is_none() {
                self.store
                    .set(Parameter {
                        name: name.to_string(),
                        value,
                        previous_value: None,
                        last_updated_by: None,
                        last_updated_at: Utc::now(),
                        change_reason: Some("bootstrap default".to_string()),
                    })
                    .await?;
            }
        }
        Ok(())
    }

    /// Cached read. Not safe for the pause-flag check or any other
    /// safety-critical decision (§5) — use [`Params::get_through`] there.
    pub async fn get(&self, name: &str) -> Result<ParamValue> {
        {
            let mut cache = self.cache.lock().await;
            if let Some(v) = cache.cache_get(&name.to_string()) {
                return Ok(*v);
            }
        }
        let value = self.get_through(name).await?;
        let mut cache = self.cache.lock().await;
        cache.cache_set(name.to_string(), value);
        Ok(value)
    }

    /// Always reads the store directly, bypassing the cache. Required at
    /// the entry of every mutating Order/Logistics/Trust operation for the
    /// pause flag (§4.1, §5).
    pub async fn get_through(&self, name: &str) -> Result<ParamValue> {
        self.store
            .get(name)
            .await?
            .map(|p| p.value)
            .ok_or_else(|| Error::not_found(format!("parameter {name}")))
    }

    /// §4.1: consulted at the entry of every mutating Order/Logistics/Trust
    /// operation. Always reads through.
    pub async fn require_not_paused(&self) -> Result<()> {
        let paused = self
            .get_through(PARAM_EMERGENCY_PAUSE_ENABLED)
            .await?
            .as_bool()
            .unwrap_or(false);
        if paused {
            return Err(Error::SystemPaused);
        }
        Ok(())
    }

    /// Write a parameter as the side effect of an executed governance
    /// action (§4.7). Captures `previous_value` and invalidates the cache
    /// entry so the next read observes the new value immediately.
    pub async fn set(
        &self,
        name: &str,
        new_value: ParamValue,
        updated_by: &str,
        reason: &str,
    ) -> Result<Parameter> {
        let previous = self.store.get(name).await?.map(|p| p.value);
        let param = Parameter {
            name: name.to_string(),
            value: new_value,
            previous_value: previous,
            last_updated_by: Some(updated_by.to_string()),
            last_updated_at: Utc::now(),
            change_reason: Some(reason.to_string()),
        };
        self.store.set(param.clone()).await?;
        let mut cache = self.cache.lock().await;
        cache.cache_remove(&name.to_string());
        Ok(param)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn params() -> Params<InMemoryParamsStore> {
        let store = Arc::new(InMemoryParamsStore::default());
        let params = Params::new(store);
        params.bootstrap_defaults().await.unwrap();
        params
    }

    #[tokio::test]
    async fn defaults_match_spec() {
        let p = params().await;
        assert_eq!(
            p.get(PARAM_PROTOCOL_FEE_PERCENTAGE).await.unwrap().as_f64(),
            Some(3.0)
        );
        assert_eq!(
            p.get(PARAM_ESCROW_HOLD_DURATION_DAYS)
                .await
                .unwrap()
                .as_i64(),
            Some(7)
        );
        assert_eq!(p.require_not_paused().await.is_ok(), true);
    }

    #[tokio::test]
    async fn pause_flag_blocks_mutating_ops() {
        let p = params().await;
        p.set(
            PARAM_EMERGENCY_PAUSE_ENABLED,
            ParamValue::Bool(true),
            "gov:exec-1",
            "emergency_pause action executed",
        )
        .await
        .unwrap();

        assert!(matches!(
            p.require_not_paused().await,
            Err(Error::SystemPaused)
        ));
    }

    #[tokio::test]
    async fn write_captures_previous_value() {
        let p = params().await;
        let change = p
            .set(
                PARAM_PROTOCOL_FEE_PERCENTAGE,
                ParamValue::Number(2.5),
                "gov:exec-2",
                "update_protocol_fee",
            )
            .await
            .unwrap();
        assert_eq!(change.previous_value, Some(ParamValue::Number(3.0)));
        assert_eq!(
            p.get(PARAM_PROTOCOL_FEE_PERCENTAGE).await.unwrap().as_f64(),
            Some(2.5)
        );
    }

    #[tokio::test]
    async fn unknown_parameter_is_not_found() {
        let p = params().await;
        assert!(matches!(
            p.get_through("does_not_exist").await,
            Err(Error::NotFound(_))
        ));
    }
}
