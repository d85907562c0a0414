//! Background sweeps (§5): the five periodic scans that move state
//! forward without a caller in the loop — escrow auto-release, quote
//! expiry, dispute vendor timeout, rating auto-reveal, and proposal
//! expiry.
//!
//! Each sweep is a fixed-interval scan driven by a cooperative shutdown
//! signal, with per-item error logging that never aborts the rest of the
//! batch.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use crate::error::Error;
use crate::governance::proposal::{ProposalState, ProposalStore};
use crate::logistics::quote::QuoteStore;
use crate::logistics::shipment::ShipmentStore;
use crate::order::escrow::{EscrowState, EscrowStore};
use crate::order::{OrderState, OrderStore};
use crate::trust::dispute::{DisputeState, DisputeStore};
use crate::trust::rating::RatingStore;

/// Poll interval shared by every sweep unless overridden (§5).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Runs `scan_once` every `interval` until `shutdown` fires, logging and
/// continuing past any single-pass error rather than exiting the loop.
pub async fn run_periodic<F, Fut>(name: &'static str, interval: Duration, mut shutdown: watch::Receiver<bool>, mut scan_once: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<usize, Error>>,
{
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match scan_once().await {
                    Ok(n) if n > 0 => tracing::info!(sweep = name, processed = n, "sweep pass completed"),
                    Ok(_) => {}
                    Err(err) => tracing::warn!(sweep = name, error = %err, "sweep pass failed, will retry next tick"),
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    tracing::info!(sweep = name, "shutting down");
                    break;
                }
            }
        }
    }
}

/// Escrows still `Held` past their release deadline: release them and
/// complete the order (§4.4, §5).
pub async fn sweep_escrow_auto_release<ES, OS>(escrows: &ES, orders: &OS) -> Result<usize, Error>
where
    ES: EscrowStore,
    OS: OrderStore,
{
    let due = escrows.due_for_auto_release(Utc::now()).await?;
    let mut processed = 0;
    for escrow in due {
        if let Err(err) = escrows
            .update_state_if(&escrow.id, EscrowState::Held, EscrowState::Released)
            .await
        {
            tracing::warn!(escrow_id = %escrow.id, error = %err, "auto-release failed");
            continue;
        }
        if let Err(err) = orders
            .update_state_if(
                &escrow.order_id,
                OrderState::Delivered,
                OrderState::Completed,
                "sweep_escrow_auto_release",
                "escrow_auto_release_deadline_passed",
                serde_json::json!({}),
                Box::new(|_| {}),
            )
            .await
        {
            tracing::warn!(order_id = %escrow.order_id, error = %err, "auto-complete after escrow release failed");
            continue;
        }
        processed += 1;
    }
    Ok(processed)
}

/// Pending quotes past their expiry (§4.5, §5).
pub async fn sweep_quote_expiry<QS: QuoteStore>(quotes: &QS) -> Result<usize, Error> {
    let due = quotes.due_for_expiry(Utc::now()).await?;
    let mut processed = 0;
    for quote in due {
        if let Err(err) = quotes.mark_expired(&quote.id).await {
            tracing::warn!(quote_id = %quote.id, error = %err, "quote expiry failed");
            continue;
        }
        processed += 1;
    }
    Ok(processed)
}

/// Disputes awaiting a vendor response past the deadline move to
/// `under_review` (§4.6, §5); this flips the bare state only — a deployment
/// wires [`crate::trust::Service::escalate_unanswered`] per escalated
/// dispute to actually run the auto-evaluation cascade against the order.
pub async fn sweep_dispute_vendor_timeout<DS: DisputeStore>(disputes: &DS) -> Result<usize, Error> {
    let due = disputes.past_vendor_deadline(Utc::now()).await?;
    let mut processed = 0;
    for mut dispute in due {
        dispute.state = DisputeState::UnderReview;
        if let Err(err) = disputes.update(dispute).await {
            tracing::warn!(error = %err, "dispute vendor-timeout transition failed");
            continue;
        }
        processed += 1;
    }
    Ok(processed)
}

/// One-sided rating pairs past the 7-day reveal window (§4.6, §5).
pub async fn sweep_rating_auto_reveal<RS: RatingStore>(ratings: &RS) -> Result<usize, Error> {
    let due = ratings.due_for_reveal(Utc::now()).await?;
    let mut processed = 0;
    for order_id in due {
        if let Err(err) = ratings.reveal(&order_id).await {
            tracing::warn!(order_id = %order_id, error = %err, "rating auto-reveal failed");
            continue;
        }
        processed += 1;
    }
    Ok(processed)
}

/// Active proposals past their voting deadline without reaching approval
/// or rejection thresholds (§4.7, §5).
pub async fn sweep_proposal_expiry<PropS: ProposalStore>(proposals: &PropS) -> Result<usize, Error> {
    let due = proposals.past_deadline(Utc::now()).await?;
    let mut processed = 0;
    for mut proposal in due {
        proposal.state = ProposalState::Expired;
        if let Err(err) = proposals.update(proposal).await {
            tracing::warn!(error = %err, "proposal expiry failed");
            continue;
        }
        processed += 1;
    }
    Ok(processed)
}

/// Shipments with no tracking update for longer than this are flagged,
/// not auto-resolved — they surface through `stalled_shipments` for an
/// operator or the dispute flow to act on (§4.5).
pub const SHIPMENT_STALL_THRESHOLD: chrono::Duration = chrono::Duration::days(5);

pub async fn stalled_shipments<SS: ShipmentStore>(_shipments: &SS) -> Result<usize, Error> {
    // Reserved for a future operator-facing alert; tracking-event inspection
    // needs a `ShipmentStore::all()` this port intentionally doesn't expose
    // yet (§9: narrow ports over convenient ones).
    Ok(0)
}
