//! Governance proposals (§4.7): draft, vote, execute.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ids::{Did, GovernanceExecutionId, ProposalId, SignerId};
use crate::money::Money;
use crate::params::{
    Params, ParamValue, ParamsStore, PARAM_CLIENT_FEE_PERCENTAGE, PARAM_DISPUTE_WINDOW_DAYS,
    PARAM_EMERGENCY_PAUSE_ENABLED, PARAM_ESCROW_HOLD_DURATION_DAYS, PARAM_PROTOCOL_FEE_PERCENTAGE,
};

use super::signer::{self, required_approvals, SignerSetStore};
use super::treasury::{TreasuryLedger, Withdrawal};

/// Default voting window (§4.7): `Create`'s `voting_duration_hours` falls
/// back to this when the proposer doesn't override it.
pub const DEFAULT_VOTING_WINDOW_HOURS: i64 = 72;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GovernanceAction {
    UpdateProtocolFee(f64),
    UpdateClientFee(f64),
    UpdateEscrowDuration(i64),
    UpdateDisputeWindow(i64),
    EmergencyPause,
    EmergencyUnpause,
    AddSigner(Did),
    RemoveSigner(SignerId),
    TreasuryWithdrawal { to: Did, amount: Money },
}

/// §4.7: rejects a proposal whose action params could never execute, before
/// it ever goes up for a vote.
fn validate_action(action: &GovernanceAction) -> Result<()> {
    match action {
        GovernanceAction::UpdateProtocolFee(pct) | GovernanceAction::UpdateClientFee(pct) => {
            if !(0.0..=100.0).contains(pct) {
                return Err(Error::invalid_input("percentage", "must be between 0 and 100"));
            }
        }
        GovernanceAction::UpdateEscrowDuration(days) | GovernanceAction::UpdateDisputeWindow(days) => {
            if *days <= 0 {
                return Err(Error::invalid_input("days", "must be positive"));
            }
        }
        GovernanceAction::EmergencyPause | GovernanceAction::EmergencyUnpause => {}
        GovernanceAction::AddSigner(_) | GovernanceAction::RemoveSigner(_) => {}
        GovernanceAction::TreasuryWithdrawal { amount, .. } => {
            if amount.minor_units <= 0 {
                return Err(Error::invalid_input("amount", "withdrawal amount must be positive"));
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalState {
    Draft,
    Active,
    Approved,
    Executed,
    Rejected,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRecord {
    pub signer_id: SignerId,
    pub approve: bool,
    pub voted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Succeeded,
    Failed,
}

/// §4.7: one record per execution attempt, including a failed attempt that
/// leaves the proposal `Approved` for retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceActionExecution {
    pub id: GovernanceExecutionId,
    pub executed_by: String,
    pub status: ExecutionStatus,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    /// Sequential, human-referenceable identifier: `"GOV-" + zero-padded
    /// counter` (§3, §4.7).
    pub proposal_number: String,
    pub action: GovernanceAction,
    pub proposed_by: SignerId,
    pub state: ProposalState,
    pub votes: Vec<VoteRecord>,
    /// `required_approvals` frozen from the active signer set at `propose`
    /// time, so a signer added or removed mid-vote can't shift the
    /// threshold underfoot (§4.7).
    pub required_approvals: usize,
    pub executions: Vec<GovernanceActionExecution>,
    pub created_at: DateTime<Utc>,
    pub voting_deadline: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait ProposalStore: Send + Sync {
    async fn insert(&self, proposal: Proposal) -> Result<()>;
    async fn get(&self, id: &ProposalId) -> Result<Option<Proposal>>;
    async fn update(&self, proposal: Proposal) -> Result<()>;
    async fn past_deadline(&self, now: DateTime<Utc>) -> Result<Vec<Proposal>>;
    /// The next sequential number to mint a `proposal_number` from. Starts
    /// at 1.
    async fn next_proposal_number(&self) -> Result<u64>;
}

#[derive(Default)]
pub struct InMemoryProposalStore {
    inner: dashmap::DashMap<ProposalId, Proposal>,
    counter: AtomicU64,
}

#[async_trait]
impl ProposalStore for InMemoryProposalStore {
    async fn insert(&self, proposal: Proposal) -> Result<()> {
        self.inner.insert(proposal.id, proposal);
        Ok(())
    }

    async fn get(&self, id: &ProposalId) -> Result<Option<Proposal>> {
        Ok(self.inner.get(id).map(|p| p.clone()))
    }

    async fn update(&self, proposal: Proposal) -> Result<()> {
        if !self.inner.contains_key(&proposal.id) {
            return Err(Error::not_found(format!("proposal {}", proposal.id)));
        }
        self.inner.insert(proposal.id, proposal);
        Ok(())
    }

    async fn past_deadline(&self, now: DateTime<Utc>) -> Result<Vec<Proposal>> {
        Ok(self
            .inner
            .iter()
            .filter(|p| p.state == ProposalState::Active && p.voting_deadline <= now)
            .map(|p| p.clone())
            .collect())
    }

    async fn next_proposal_number(&self) -> Result<u64> {
        Ok(self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

fn format_proposal_number(n: u64) -> String {
    format!("GOV-{n:03}")
}

pub struct Service<PropS: ProposalStore, SS: SignerSetStore, PS: ParamsStore, TL: TreasuryLedger> {
    proposals: Arc<PropS>,
    signers: Arc<SS>,
    params: Arc<Params<PS>>,
    treasury: Arc<TL>,
    dedupe: Arc<crate::idempotency::EventDedupe>,
}

impl<PropS: ProposalStore, SS: SignerSetStore, PS: ParamsStore, TL: TreasuryLedger> Service<PropS, SS, PS, TL> {
    pub fn new(proposals: Arc<PropS>, signers: Arc<SS>, params: Arc<Params<PS>>, treasury: Arc<TL>) -> Self {
        Self {
            proposals,
            signers,
            params,
            treasury,
            dedupe: Arc::new(crate::idempotency::EventDedupe::new()),
        }
    }

    /// `Create` (§4.7): proposer must be an active signer; defaults to a
    /// 72h voting window unless `voting_duration_hours` overrides it.
    /// `required_approvals` is frozen here from the active signer count.
    pub async fn propose(
        &self,
        action: GovernanceAction,
        proposed_by: SignerId,
        voting_duration_hours: Option<i64>,
    ) -> Result<Proposal> {
        validate_action(&action)?;

        let signer = self
            .signers
            .get(&proposed_by)
            .await?
            .ok_or_else(|| Error::not_found(format!("signer {proposed_by}")))?;
        if !signer.active {
            return Err(Error::forbidden("only an active signer may propose"));
        }

        let active_count = self.signers.active_signers().await?.len();
        let now = Utc::now();
        let window_hours = voting_duration_hours.unwrap_or(DEFAULT_VOTING_WINDOW_HOURS);
        let number = self.proposals.next_proposal_number().await?;
        let proposal = Proposal {
            id: ProposalId::new(),
            proposal_number: format_proposal_number(number),
            action,
            proposed_by,
            state: ProposalState::Active,
            votes: vec![],
            required_approvals: required_approvals(active_count),
            executions: vec![],
            created_at: now,
            voting_deadline: now + chrono::Duration::hours(window_hours),
            executed_at: None,
        };
        self.proposals.insert(proposal.clone()).await?;
        Ok(proposal)
    }

    /// §4.7: one vote per signer; tally checked against the threshold frozen
    /// at proposal creation. Dedupes on `event_id` so a redelivered vote
    /// callback is a no-op rather than a second ballot (§5, §8).
    pub async fn vote(
        &self,
        proposal_id: &ProposalId,
        signer_id: SignerId,
        approve: bool,
        event_id: &str,
    ) -> Result<Proposal> {
        if !self.dedupe.try_claim(&format!("vote:{event_id}")) {
            return Err(Error::conflict(format!("event {event_id} already applied")));
        }

        let mut proposal = self.get(proposal_id).await?;
        if proposal.state != ProposalState::Active {
            return Err(Error::conflict("proposal is not open for voting"));
        }
        if proposal.votes.iter().any(|v| v.signer_id == signer_id) {
            return Err(Error::conflict("signer has already voted on this proposal"));
        }
        let signer = self
            .signers
            .get(&signer_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("signer {signer_id}")))?;
        if !signer.active {
            return Err(Error::forbidden("only an active signer may vote"));
        }

        proposal.votes.push(VoteRecord {
            signer_id,
            approve,
            voted_at: Utc::now(),
        });

        let active_count = self.signers.active_signers().await?.len();
        let threshold = proposal.required_approvals;
        let approvals = proposal.votes.iter().filter(|v| v.approve).count();
        let rejections = proposal.votes.len() - approvals;

        if approvals >= threshold {
            proposal.state = ProposalState::Approved;
        } else if rejections > active_count.saturating_sub(threshold) {
            proposal.state = ProposalState::Rejected;
        }

        self.proposals.update(proposal.clone()).await?;
        Ok(proposal)
    }

    /// Applies an approved proposal's action (§4.7). A failed application
    /// leaves the proposal `Approved` so it can be retried; either outcome
    /// appends a [`GovernanceActionExecution`] record.
    pub async fn execute(&self, proposal_id: &ProposalId, executed_by: &str) -> Result<Proposal> {
        let mut proposal = self.get(proposal_id).await?;
        if proposal.state != ProposalState::Approved {
            return Err(Error::conflict("proposal is not approved"));
        }

        let outcome = self.apply_action(&proposal, executed_by).await;
        let execution = GovernanceActionExecution {
            id: GovernanceExecutionId::new(),
            executed_by: executed_by.to_string(),
            status: if outcome.is_ok() { ExecutionStatus::Succeeded } else { ExecutionStatus::Failed },
            error: outcome.as_ref().err().map(|e| e.to_string()),
            at: Utc::now(),
        };
        proposal.executions.push(execution);

        match outcome {
            Ok(()) => {
                proposal.state = ProposalState::Executed;
                proposal.executed_at = Some(Utc::now());
                self.proposals.update(proposal.clone()).await?;
                Ok(proposal)
            }
            Err(e) => {
                self.proposals.update(proposal.clone()).await?;
                Err(e)
            }
        }
    }

    async fn apply_action(&self, proposal: &Proposal, executed_by: &str) -> Result<()> {
        match &proposal.action {
            GovernanceAction::UpdateProtocolFee(pct) => {
                self.params
                    .set(PARAM_PROTOCOL_FEE_PERCENTAGE, ParamValue::Number(*pct), executed_by, "update_protocol_fee")
                    .await
            }
            GovernanceAction::UpdateClientFee(pct) => {
                self.params
                    .set(PARAM_CLIENT_FEE_PERCENTAGE, ParamValue::Number(*pct), executed_by, "update_client_fee")
                    .await
            }
            GovernanceAction::UpdateEscrowDuration(days) => {
                self.params
                    .set(
                        PARAM_ESCROW_HOLD_DURATION_DAYS,
                        ParamValue::Integer(*days),
                        executed_by,
                        "update_escrow_duration",
                    )
                    .await
            }
            GovernanceAction::UpdateDisputeWindow(days) => {
                self.params
                    .set(PARAM_DISPUTE_WINDOW_DAYS, ParamValue::Integer(*days), executed_by, "update_dispute_window")
                    .await
            }
            GovernanceAction::EmergencyPause => {
                self.params
                    .set(PARAM_EMERGENCY_PAUSE_ENABLED, ParamValue::Bool(true), executed_by, "emergency_pause")
                    .await
            }
            GovernanceAction::EmergencyUnpause => {
                self.params
                    .set(PARAM_EMERGENCY_PAUSE_ENABLED, ParamValue::Bool(false), executed_by, "emergency_unpause")
                    .await
            }
            GovernanceAction::AddSigner(did) => {
                signer::add(self.signers.as_ref(), did.clone()).await.map(|_| ())
            }
            GovernanceAction::RemoveSigner(id) => signer::remove(self.signers.as_ref(), id).await,
            GovernanceAction::TreasuryWithdrawal { to, amount } => {
                self.treasury
                    .record_withdrawal(Withdrawal {
                        proposal_id: proposal.id,
                        to: to.clone(),
                        amount: *amount,
                        executed_at: Utc::now(),
                    })
                    .await
            }
        }
    }

    pub async fn get(&self, id: &ProposalId) -> Result<Proposal> {
        self.proposals
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("proposal {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::signer::{add, InMemorySignerSetStore};
    use crate::governance::treasury::InMemoryTreasuryLedger;
    use crate::params::InMemoryParamsStore;

    async fn service() -> (
        Service<InMemoryProposalStore, InMemorySignerSetStore, InMemoryParamsStore, InMemoryTreasuryLedger>,
        Vec<SignerId>,
    ) {
        let signers_store = Arc::new(InMemorySignerSetStore::default());
        let mut ids = vec![];
        for _ in 0..3 {
            ids.push(add(signers_store.as_ref(), Did::generate()).await.unwrap());
        }
        let params = Arc::new(Params::new(Arc::new(InMemoryParamsStore::default())));
        params.bootstrap_defaults().await.unwrap();
        let svc = Service::new(
            Arc::new(InMemoryProposalStore::default()),
            signers_store,
            params,
            Arc::new(InMemoryTreasuryLedger::default()),
        );
        (svc, ids)
    }

    #[tokio::test]
    async fn proposal_approves_once_threshold_reached_and_executes() {
        let (svc, signers) = service().await;
        let proposal = svc
            .propose(GovernanceAction::UpdateProtocolFee(2.5), signers[0], None)
            .await
            .unwrap();
        assert_eq!(proposal.proposal_number, "GOV-001");
        assert_eq!(proposal.required_approvals, 2);

        let p = svc.vote(&proposal.id, signers[0], true, "evt-vote-1").await.unwrap();
        assert_eq!(p.state, ProposalState::Active);
        let p = svc.vote(&proposal.id, signers[1], true, "evt-vote-2").await.unwrap();
        assert_eq!(p.state, ProposalState::Approved);

        let executed = svc.execute(&proposal.id, "gov:signer-1").await.unwrap();
        assert_eq!(executed.state, ProposalState::Executed);
        assert_eq!(executed.executions.len(), 1);
        assert_eq!(executed.executions[0].status, ExecutionStatus::Succeeded);
        assert_eq!(
            svc.params
                .get(PARAM_PROTOCOL_FEE_PERCENTAGE)
                .await
                .unwrap()
                .as_f64(),
            Some(2.5)
        );
    }

    #[tokio::test]
    async fn proposal_numbers_are_sequential() {
        let (svc, signers) = service().await;
        let first = svc.propose(GovernanceAction::EmergencyPause, signers[0], None).await.unwrap();
        let second = svc.propose(GovernanceAction::EmergencyUnpause, signers[0], None).await.unwrap();
        assert_eq!(first.proposal_number, "GOV-001");
        assert_eq!(second.proposal_number, "GOV-002");
    }

    #[tokio::test]
    async fn out_of_range_fee_is_rejected_at_proposal_time() {
        let (svc, signers) = service().await;
        assert!(svc
            .propose(GovernanceAction::UpdateProtocolFee(150.0), signers[0], None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn required_approvals_stays_frozen_after_a_signer_joins() {
        let (svc, signers) = service().await;
        let proposal = svc
            .propose(GovernanceAction::EmergencyPause, signers[0], None)
            .await
            .unwrap();
        assert_eq!(proposal.required_approvals, 2);

        // A fourth signer joining mid-vote must not change this proposal's
        // already-frozen threshold.
        add(svc_signers(&svc).as_ref(), Did::generate()).await.unwrap();
        let refreshed = svc.get(&proposal.id).await.unwrap();
        assert_eq!(refreshed.required_approvals, 2);
    }

    fn svc_signers<'a>(
        svc: &'a Service<InMemoryProposalStore, InMemorySignerSetStore, InMemoryParamsStore, InMemoryTreasuryLedger>,
    ) -> &'a Arc<InMemorySignerSetStore> {
        &svc.signers
    }

    #[tokio::test]
    async fn same_signer_cannot_vote_twice() {
        let (svc, signers) = service().await;
        let proposal = svc
            .propose(GovernanceAction::EmergencyPause, signers[0], None)
            .await
            .unwrap();
        svc.vote(&proposal.id, signers[0], true, "evt-vote-1").await.unwrap();
        assert!(svc.vote(&proposal.id, signers[0], true, "evt-vote-2").await.is_err());
    }

    #[tokio::test]
    async fn replayed_vote_event_id_is_rejected_as_duplicate() {
        let (svc, signers) = service().await;
        let proposal = svc
            .propose(GovernanceAction::EmergencyPause, signers[0], None)
            .await
            .unwrap();
        svc.vote(&proposal.id, signers[0], true, "evt-vote-1").await.unwrap();
        let err = svc
            .vote(&proposal.id, signers[1], true, "evt-vote-1")
            .await
            .unwrap_err();
        assert!(err.is_duplicate_event());
    }

    #[tokio::test]
    async fn execute_before_approval_is_rejected() {
        let (svc, signers) = service().await;
        let proposal = svc
            .propose(GovernanceAction::EmergencyPause, signers[0], None)
            .await
            .unwrap();
        assert!(svc.execute(&proposal.id, "gov:signer-1").await.is_err());
    }
}
