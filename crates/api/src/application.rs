use std::{sync::Arc, time::Duration};

use actix_web::{middleware::Logger, web, App, HttpServer};
use sweep_relay_domain::config::{ApiConfig, ConfigError, RelayConfig};
use sweep_relay_domain::services::telemetry::{init_telemetry, TelemetryConfig, TelemetryError};
use sweep_relay_domain::TelemetryStore;
use sweep_relay_monitor::{build_forwarder, run_monitor, MonitorError};
use thiserror::Error;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::{
    handlers::{
        logs_handler, metrics_handler, query_config, send_details_handler, status_page_handler,
    },
    state::AppState,
};

/// How long in-flight sweeps may keep running after the server stops.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Boots the co-located monitor and dashboard and blocks until the HTTP
/// server stops.
pub async fn run() -> Result<(), BootstrapError> {
    // 1. Load configuration. Both configs are validated before anything
    //    connects, so a bad key or endpoint fails the process immediately.
    let api_config = ApiConfig::load_from_env()?;
    let relay_config = RelayConfig::load_from_env()?;

    // 2. Telemetry: tracing subscriber plus the Prometheus recorder behind
    //    `/metrics`. Variables use the `API_` prefix.
    let telemetry_config = TelemetryConfig::from_env("API")?;
    let telemetry = init_telemetry(&telemetry_config)?;

    // 3. Shared state. The monitor writes into the store and the dashboard
    //    reads from it; the tracker owns every sweep and straggler task.
    let store = Arc::new(TelemetryStore::default());
    let tracker = TaskTracker::new();
    let forwarder = build_forwarder(&relay_config, store.clone(), tracker.clone())?;

    // 4. Start the monitor in the background. Losing the subscription stops
    //    sweeping but leaves the dashboard up for inspection.
    let monitor = tokio::spawn(async move {
        if let Err(err) = run_monitor(forwarder).await {
            error!(?err, "monitor stopped");
        }
    });

    // 5. Serve the dashboard.
    let state = AppState::new(store, telemetry);
    info!(bind = %api_config.api_bind_address(), "starting dashboard");
    // actix-web installs its own ctrl-c handler and resolves `run()` after a
    // graceful stop.
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .app_data(query_config())
            .wrap(Logger::default())
            .configure(routes)
    })
    .bind(api_config.api_bind_address())?
    .run();

    let served = server.await;

    // 6. Stop taking notifications, then give in-flight sweeps a bounded
    //    window to settle before the runtime goes away.
    monitor.abort();
    tracker.close();
    if tokio::time::timeout(SHUTDOWN_GRACE, tracker.wait())
        .await
        .is_err()
    {
        warn!(
            pending = tracker.len(),
            "in-flight sweeps did not settle before exit"
        );
    }

    served?;
    Ok(())
}

/// Dashboard routes, shared with the handler tests.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(status_page_handler))
        .route("/api/logs", web::get().to(logs_handler))
        .route("/api/send-details", web::get().to(send_details_handler))
        .route("/metrics", web::get().to(metrics_handler));
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("monitor error: {0}")]
    Monitor(#[from] MonitorError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
