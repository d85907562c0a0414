//! The governance signer set (§4.7): the multisig-style group that votes
//! on proposals. Never fewer than three active signers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ids::{Did, SignerId};

/// §4.7: the set must never drop below this many active signers.
pub const MIN_ACTIVE_SIGNERS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signer {
    pub id: SignerId,
    pub did: Did,
    pub active: bool,
    pub added_at: DateTime<Utc>,
}

#[async_trait]
pub trait SignerSetStore: Send + Sync {
    async fn insert(&self, signer: Signer) -> Result<()>;
    async fn get(&self, id: &SignerId) -> Result<Option<Signer>>;
    async fn set_active(&self, id: &SignerId, active: bool) -> Result<()>;
    async fn active_signers(&self) -> Result<Vec<Signer>>;
}

#[derive(Default)]
pub struct InMemorySignerSetStore {
    inner: dashmap::DashMap<SignerId, Signer>,
}

#[async_trait]
impl SignerSetStore for InMemorySignerSetStore {
    async fn insert(&self, signer: Signer) -> Result<()> {
        self.inner.insert(signer.id, signer);
        Ok(())
    }

    async fn get(&self, id: &SignerId) -> Result<Option<Signer>> {
        Ok(self.inner.get(id).map(|s| s.clone()))
    }

    async fn set_active(&self, id: &SignerId, active: bool) -> Result<()> {
        let mut entry = self
            .inner
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("signer {id}")))?;
        entry.active = active;
        Ok(())
    }

    async fn active_signers(&self) -> Result<Vec<Signer>> {
        Ok(self.inner.iter().filter(|s| s.active).map(|s| s.clone()).collect())
    }
}

/// §4.7: `required_approvals = ceil(2 * |active| / 3)`.
pub fn required_approvals(active_count: usize) -> usize {
    (2 * active_count).div_ceil(3)
}

/// Adds a signer to the set.
pub async fn add<S: SignerSetStore>(store: &S, did: Did) -> Result<SignerId> {
    let signer = Signer {
        id: SignerId::new(),
        did,
        active: true,
        added_at: Utc::now(),
    };
    let id = signer.id;
    store.insert(signer).await?;
    Ok(id)
}

/// Removes a signer, refusing to drop the active set below
/// [`MIN_ACTIVE_SIGNERS`].
pub async fn remove<S: SignerSetStore>(store: &S, id: &SignerId) -> Result<()> {
    let active = store.active_signers().await?;
    if active.len() <= MIN_ACTIVE_SIGNERS {
        return Err(Error::conflict(format!(
            "cannot drop below {MIN_ACTIVE_SIGNERS} active signers"
        )));
    }
    store.set_active(id, false).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_approvals_rounds_up() {
        assert_eq!(required_approvals(3), 2);
        assert_eq!(required_approvals(4), 3);
        assert_eq!(required_approvals(9), 6);
    }

    #[tokio::test]
    async fn removal_blocked_at_minimum_signer_count() {
        let store = InMemorySignerSetStore::default();
        let mut ids = vec![];
        for _ in 0..3 {
            ids.push(add(&store, Did::generate()).await.unwrap());
        }
        assert!(remove(&store, &ids[0]).await.is_err());
    }

    #[tokio::test]
    async fn removal_allowed_above_minimum() {
        let store = InMemorySignerSetStore::default();
        let mut ids = vec![];
        for _ in 0..4 {
            ids.push(add(&store, Did::generate()).await.unwrap());
        }
        assert!(remove(&store, &ids[0]).await.is_ok());
        assert_eq!(store.active_signers().await.unwrap().len(), 3);
    }
}
