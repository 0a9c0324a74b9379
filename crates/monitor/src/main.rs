//! Monitor binary that watches one account and sweeps incoming funds.

use std::{io, sync::Arc, time::Duration};

use sweep_relay_domain::config::RelayConfig;
use sweep_relay_domain::services::telemetry::{init_telemetry, TelemetryConfig};
use sweep_relay_domain::TelemetryStore;
use sweep_relay_monitor::{build_forwarder, run_monitor, MonitorError};
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> io::Result<()> {
    if let Err(err) = bootstrap().await {
        eprintln!("[monitor] bootstrap failed: {err}");
        return Err(io::Error::other(err.to_string()));
    }

    Ok(())
}

async fn bootstrap() -> Result<(), MonitorError> {
    let config = RelayConfig::load_from_env()?;
    let telemetry_config = TelemetryConfig::from_env("MONITOR")?;
    init_telemetry(&telemetry_config)?;

    let store = Arc::new(TelemetryStore::default());
    let tracker = TaskTracker::new();
    let forwarder = build_forwarder(&config, store, tracker.clone())?;

    // The monitor stops on its own when the subscription is lost; the process
    // still waits for ctrl-c so in-flight sweeps are not cut short.
    let monitor = tokio::spawn(async move {
        if let Err(err) = run_monitor(forwarder).await {
            error!(?err, "monitor stopped");
        }
    });
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("ctrl-c handler unavailable, stopping");
    }
    info!("shutdown requested");
    monitor.abort();

    tracker.close();
    if tokio::time::timeout(SHUTDOWN_GRACE, tracker.wait()).await.is_err() {
        warn!(pending = tracker.len(), "in-flight sweeps did not settle before exit");
    }
    Ok(())
}
