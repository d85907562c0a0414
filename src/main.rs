//! marketplace-core demo binary: wires the in-memory reference
//! implementations together, bootstraps protocol parameters, runs one
//! order through its full lifecycle, and starts the background sweeps.

use std::sync::Arc;
use std::time::Duration;

use marketplace_core::governance::{InMemoryProposalStore, InMemorySignerSetStore, InMemoryTreasuryLedger};
use marketplace_core::identity::{IdentityType, InMemoryIdentityStore, Service as IdentityService};
use marketplace_core::logging::init_logging;
use marketplace_core::logistics::{InMemoryProviderStore, InMemoryQuoteStore, InMemoryShipmentStore};
use marketplace_core::money::{Money, USD};
use marketplace_core::order::{InMemoryEscrowStore, InMemoryOrderStore, OrderItem, Service as OrderService};
use marketplace_core::params::{InMemoryParamsStore, Params};
use marketplace_core::ports::{MockPaymentGateway, PaymentProof};
use marketplace_core::reputation::{InMemoryReputationStore, Service as ReputationService};
use marketplace_core::settings::AppSettings;
use marketplace_core::trust::{InMemoryDisputeStore, InMemoryRatingStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = AppSettings::from_env();
    let _guard = init_logging(&settings);

    tracing::info!("marketplace-core starting");

    let params = Arc::new(Params::new(Arc::new(InMemoryParamsStore::default())));
    params.bootstrap_defaults().await?;

    let reputation = Arc::new(ReputationService::new(Arc::new(InMemoryReputationStore::default())));
    let identity = Arc::new(IdentityService::new(Arc::new(InMemoryIdentityStore::default()), reputation.clone()));

    let gateway = Arc::new(MockPaymentGateway::default());
    let orders = Arc::new(OrderService::new(
        Arc::new(InMemoryOrderStore::default()),
        Arc::new(InMemoryEscrowStore::default()),
        params.clone(),
        gateway.clone(),
    ));

    // Reference instances for the other components, kept alive here; a
    // real deployment wires these into HTTP handlers instead.
    let _provider_store = InMemoryProviderStore::default();
    let _quote_store = InMemoryQuoteStore::default();
    let _shipment_store = InMemoryShipmentStore::default();
    let _dispute_store = InMemoryDisputeStore::default();
    let _rating_store = InMemoryRatingStore::default();
    let _proposal_store = InMemoryProposalStore::default();
    let _signer_store = InMemorySignerSetStore::default();
    let _treasury = InMemoryTreasuryLedger::default();

    let buyer = identity
        .register(IdentityType::Nostr, "buyer-co", serde_json::json!({}), serde_json::json!({}))
        .await?;
    let vendor = identity
        .register(IdentityType::Kyc, "vendor-co", serde_json::json!({}), serde_json::json!({}))
        .await?;
    identity
        .verify(&vendor, marketplace_core::identity::VerificationStatus::Verified, "compliance", None)
        .await?;

    let order = orders
        .create(
            buyer.clone(),
            vendor.clone(),
            vec![OrderItem::new("widget-9000", 25, Money::new(4_000, USD))?],
            "mock",
        )
        .await?;
    tracing::info!(order_number = %order.order_number, total = %order.total, "order created");

    orders.submit_payment(&order.id).await?;
    let order = orders
        .confirm_payment(
            &order.id,
            PaymentProof {
                method: "mock".into(),
                source_system_id: "demo-tx".into(),
                observed_at: chrono::Utc::now(),
                raw: serde_json::json!({}),
            },
            "demo-payment-confirmed",
        )
        .await?;
    tracing::info!(state = ?order.state, "payment confirmed, escrow opened");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            marketplace_core::sweep::run_periodic(
                "demo_heartbeat",
                marketplace_core::sweep::DEFAULT_SWEEP_INTERVAL,
                shutdown_rx,
                || async { Ok(0) },
            )
            .await;
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
        _ = tokio::time::sleep(Duration::from_secs(2)) => {
            tracing::info!("demo run complete");
        }
    }
    let _ = shutdown_tx.send(true);

    Ok(())
}
