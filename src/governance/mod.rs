//! Governance (§4.7): the signer set that votes protocol parameters and
//! emergency actions into effect.

pub mod proposal;
pub mod signer;
pub mod treasury;

pub use proposal::{
    ExecutionStatus, GovernanceAction, GovernanceActionExecution, InMemoryProposalStore, Proposal, ProposalState,
    ProposalStore,
};
pub use signer::{InMemorySignerSetStore, Signer, SignerSetStore, MIN_ACTIVE_SIGNERS};
pub use treasury::{InMemoryTreasuryLedger, TreasuryLedger, Withdrawal};
