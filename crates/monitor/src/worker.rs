use std::sync::Arc;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use sweep_relay_domain::{
    config::{ConfigError, RelayConfig, WatchedAccount},
    model::LogCategory,
    services::telemetry::TelemetryError,
    TelemetryStore,
};

use crate::{
    builder::TransactionBuilder,
    forwarder::Forwarder,
    pipeline::{initial_balance, process_notification},
    racer::BroadcastRacer,
    registry::EndpointRegistry,
    rpc::LedgerError,
};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("at least one RPC endpoint is required")]
    NoEndpoints,
}

/// Settings the sweep pipeline needs besides its endpoints.
#[derive(Debug, Clone)]
pub struct SweepSettings {
    pub account: WatchedAccount,
    pub target: Pubkey,
    pub fee_reserve: u64,
    pub submit_timeout: Duration,
}

impl From<&RelayConfig> for SweepSettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            account: config.account().clone(),
            target: config.target(),
            fee_reserve: config.fee_reserve_lamports(),
            submit_timeout: config.submit_timeout(),
        }
    }
}

/// Connects the configured endpoints and wires the sweep pipeline.
pub fn build_forwarder(
    config: &RelayConfig,
    store: Arc<TelemetryStore>,
    tracker: TaskTracker,
) -> Result<Arc<Forwarder>, MonitorError> {
    let registry = EndpointRegistry::from_urls(config.endpoints())?;
    Ok(assemble(registry, SweepSettings::from(config), store, tracker))
}

/// Wires a forwarder over an existing registry and reports the setup to the
/// process log. The dashboard store only receives events from the sweep
/// pipeline itself.
pub fn assemble(
    registry: EndpointRegistry,
    settings: SweepSettings,
    store: Arc<TelemetryStore>,
    tracker: TaskTracker,
) -> Arc<Forwarder> {
    let registry = Arc::new(registry);
    report_startup(&registry, &settings);

    let builder = TransactionBuilder::new(
        settings.account,
        settings.target,
        registry.primary().client.clone(),
    );
    let racer = BroadcastRacer::new(store.clone(), tracker.clone(), settings.submit_timeout);
    Arc::new(Forwarder::new(
        registry,
        builder,
        racer,
        store,
        tracker,
        settings.fee_reserve,
    ))
}

fn report_startup(registry: &EndpointRegistry, settings: &SweepSettings) {
    let primary = registry.primary();
    info!(wallet = %settings.account.pubkey(), target = %settings.target, "sweep relay starting");
    info!(label = %primary.label, url = %primary.url, "primary RPC");
    for extra in registry.iter().skip(1) {
        info!(id = %extra.id, label = %extra.label, "added broadcast RPC");
    }
    info!(endpoints = registry.len(), "racing submissions across RPC endpoints");
}

/// Runs the balance monitor until the account subscription ends.
///
/// A failed initial read is recorded and skipped. A failed subscription is
/// recorded and returned, since nothing further can be swept; the caller
/// decides whether the process stays up. Spawned sweeps run on the
/// forwarder's tracker so the caller can wait for them.
pub async fn run_monitor(forwarder: Arc<Forwarder>) -> Result<(), MonitorError> {
    let account = forwarder.builder().account().pubkey();
    let store = forwarder.store().clone();
    let tracker = forwarder.tracker().clone();

    // 1. Sweep whatever arrived while the process was down. The sweep runs in
    //    the background so the subscription is not delayed by the race.
    match initial_balance(&forwarder, &account).await {
        Ok(Some(balance)) => {
            let forwarder = forwarder.clone();
            tracker.spawn(async move {
                forwarder.forward(balance).await;
            });
        }
        Ok(None) => {}
        Err(err) => {
            store.log(
                LogCategory::Error,
                format!("failed to read initial balance: {err}"),
            );
        }
    }

    // 2. Open the standing log subscription on the primary endpoint. There is
    //    exactly one attempt.
    let primary = forwarder.registry().primary();
    let mut notifications = match primary.client.subscribe_account_logs(&account).await {
        Ok(stream) => stream,
        Err(err) => {
            store.log(
                LogCategory::Error,
                format!(
                    "account subscription failed, not retrying; no further deposits will be swept: {err}"
                ),
            );
            return Err(err.into());
        }
    };
    store.log(
        LogCategory::Info,
        format!("subscribed to account logs via {} ({})", primary.label, primary.id),
    );

    // 3. One task per notification. Nothing is queued or deduplicated, so two
    //    close deposits may race the same balance.
    while let Some(notification) = notifications.next().await {
        let forwarder = forwarder.clone();
        let store = store.clone();
        tracker.spawn(async move {
            if let Err(err) = process_notification(&forwarder, &account, notification).await {
                warn!(?err, "notification handling failed");
                store.log(
                    LogCategory::Error,
                    format!("failed to process notification: {err}"),
                );
            }
        });
    }

    // 4. The remote side closed the stream. Tell the operator instead of
    //    resubscribing.
    store.log(
        LogCategory::Error,
        "account subscription ended, not resubscribing; no further deposits will be swept",
    );
    Ok(())
}
