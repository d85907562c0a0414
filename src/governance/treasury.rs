//! The protocol treasury (§4.7): a minimal ledger of governance-approved
//! withdrawals. Actual custody and settlement rails are out of scope; this
//! only records what governance authorized.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ids::{Did, ProposalId};
use crate::money::Money;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Withdrawal {
    pub proposal_id: ProposalId,
    pub to: Did,
    pub amount: Money,
    pub executed_at: DateTime<Utc>,
}

#[async_trait]
pub trait TreasuryLedger: Send + Sync {
    async fn record_withdrawal(&self, withdrawal: Withdrawal) -> Result<()>;
    async fn history(&self) -> Result<Vec<Withdrawal>>;
}

#[derive(Default)]
pub struct InMemoryTreasuryLedger {
    inner: tokio::sync::Mutex<Vec<Withdrawal>>,
}

#[async_trait]
impl TreasuryLedger for InMemoryTreasuryLedger {
    async fn record_withdrawal(&self, withdrawal: Withdrawal) -> Result<()> {
        self.inner.lock().await.push(withdrawal);
        Ok(())
    }

    async fn history(&self) -> Result<Vec<Withdrawal>> {
        Ok(self.inner.lock().await.clone())
    }
}
