//! Process-wide tracing and Prometheus wiring for the relay binaries.
//!
//! Both binaries call [`init_telemetry`] once at boot. The relay's metric
//! names live here so the monitor, the dashboard and the exporter agree on
//! them, and every series carries a `service` label naming the binary.

use std::{env, net::SocketAddr, sync::Arc};

use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::hydrate_env_file;

pub const FORWARD_OPERATIONS_TOTAL: &str = "forward_operations_total";
pub const FORWARD_DURATION_MS: &str = "forward_duration_ms";
pub const BROADCAST_ATTEMPTS_TOTAL: &str = "broadcast_attempts_total";
pub const BROADCAST_WINNER_LATENCY_MS: &str = "broadcast_winner_latency_ms";
pub const MONITOR_NOTIFICATIONS_TOTAL: &str = "monitor_notifications_total";
pub const API_REQUESTS_TOTAL: &str = "api_requests_total";

const DEFAULT_LOG_FILTER: &str = "info";

/// Upper bounds for the millisecond histograms: from a fast local node up to
/// the default submission timeout.
const LATENCY_BUCKETS_MS: &[f64] = &[
    5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1_000.0, 2_500.0, 5_000.0, 10_000.0,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetricKind {
    Counter,
    LatencyHistogram,
}

const RELAY_METRICS: &[(&str, MetricKind, &str)] = &[
    (
        FORWARD_OPERATIONS_TOTAL,
        MetricKind::Counter,
        "Sweep attempts by terminal stage.",
    ),
    (
        FORWARD_DURATION_MS,
        MetricKind::LatencyHistogram,
        "Wall time of one sweep attempt, observation to record.",
    ),
    (
        BROADCAST_ATTEMPTS_TOTAL,
        MetricKind::Counter,
        "Per-endpoint submissions by result, counted once every endpoint settles.",
    ),
    (
        BROADCAST_WINNER_LATENCY_MS,
        MetricKind::LatencyHistogram,
        "Submission latency of the endpoint that answered first with a signature.",
    ),
    (
        MONITOR_NOTIFICATIONS_TOTAL,
        MetricKind::Counter,
        "Account log notifications by handling result.",
    ),
    (
        API_REQUESTS_TOTAL,
        MetricKind::Counter,
        "Dashboard JSON requests by route.",
    ),
];

static SUBSCRIBER_INSTALLED: OnceCell<()> = OnceCell::new();
static METRICS_HANDLE: OnceCell<Arc<PrometheusHandle>> = OnceCell::new();

/// Observability settings for one binary, read from `<PREFIX>_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    service: String,
    log_filter: String,
    metrics_address: Option<SocketAddr>,
}

impl TelemetryConfig {
    /// Reads `<PREFIX>_LOG_FILTER` (default `info`) and the optional
    /// `<PREFIX>_METRICS_ADDRESS` listener. The lowercased prefix becomes the
    /// `service` label, e.g. `API` -> `service="api"`.
    pub fn from_env(prefix: &str) -> Result<Self, TelemetryError> {
        let _ = hydrate_env_file();
        let upper = prefix.trim().to_ascii_uppercase();

        let log_filter = env::var(format!("{upper}_LOG_FILTER"))
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let metrics_address = match env::var(format!("{upper}_METRICS_ADDRESS")) {
            Ok(value) if !value.trim().is_empty() => {
                let value = value.trim();
                Some(value.parse().map_err(|err: std::net::AddrParseError| {
                    TelemetryError::InvalidMetricsAddress(value.to_string(), err.to_string())
                })?)
            }
            _ => None,
        };

        Ok(Self {
            service: upper.to_ascii_lowercase(),
            log_filter,
            metrics_address,
        })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    pub fn metrics_address(&self) -> Option<SocketAddr> {
        self.metrics_address
    }
}

/// Handle to the installed exporter; the dashboard renders `/metrics` from it.
#[derive(Clone)]
pub struct TelemetryGuard {
    metrics: Arc<PrometheusHandle>,
}

impl TelemetryGuard {
    pub fn render_metrics(&self) -> String {
        self.metrics.render()
    }
}

/// Installs the tracing subscriber and the Prometheus recorder. Later calls
/// in the same process reuse whatever the first call installed.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    install_tracing(config)?;
    let metrics = METRICS_HANDLE
        .get_or_try_init(|| install_metrics(config).map(Arc::new))?
        .clone();
    Ok(TelemetryGuard { metrics })
}

fn install_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_new(config.log_filter())
        .map_err(|err| TelemetryError::InvalidLogFilter(err.to_string()))?;

    if SUBSCRIBER_INSTALLED.set(()).is_err() {
        return Ok(());
    }
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .map_err(|err| TelemetryError::Tracing(err.to_string()))
}

fn install_metrics(config: &TelemetryConfig) -> Result<PrometheusHandle, TelemetryError> {
    let mut builder = PrometheusBuilder::new()
        .add_global_label("service", config.service())
        .set_buckets_for_metric(Matcher::Suffix("_ms".to_string()), LATENCY_BUCKETS_MS)
        .map_err(|err| TelemetryError::Metrics(err.to_string()))?;
    if let Some(addr) = config.metrics_address() {
        builder = builder.with_http_listener(addr);
    }

    let handle = builder
        .install_recorder()
        .map_err(|err| TelemetryError::Metrics(err.to_string()))?;
    describe_relay_metrics();
    Ok(handle)
}

fn describe_relay_metrics() {
    for &(name, kind, help) in RELAY_METRICS {
        match kind {
            MetricKind::Counter => describe_counter!(name, help),
            MetricKind::LatencyHistogram => describe_histogram!(name, Unit::Milliseconds, help),
        }
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    InvalidLogFilter(String),
    #[error("failed to install tracing subscriber: {0}")]
    Tracing(String),
    #[error("invalid metrics address `{0}`: {1}")]
    InvalidMetricsAddress(String, String),
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_GUARD: Mutex<()> = Mutex::new(());

    fn clear(prefix: &str) {
        env::set_var("SWEEP_RELAY_SKIP_DOTENV", "1");
        env::remove_var(format!("{prefix}_LOG_FILTER"));
        env::remove_var(format!("{prefix}_METRICS_ADDRESS"));
    }

    #[test]
    fn prefix_becomes_service_label() {
        let _guard = ENV_GUARD.lock().unwrap();
        clear("SWEEPER");

        let cfg = TelemetryConfig::from_env(" sweeper ").unwrap();
        assert_eq!(cfg.service(), "sweeper");
        assert_eq!(cfg.log_filter(), "info");
        assert_eq!(cfg.metrics_address(), None);
    }

    #[test]
    fn listener_address_is_parsed_up_front() {
        let _guard = ENV_GUARD.lock().unwrap();
        clear("SWEEPER");
        env::set_var("SWEEPER_LOG_FILTER", "sweep_relay_monitor=debug");
        env::set_var("SWEEPER_METRICS_ADDRESS", "127.0.0.1:9464");

        let cfg = TelemetryConfig::from_env("SWEEPER").unwrap();
        assert_eq!(cfg.log_filter(), "sweep_relay_monitor=debug");
        assert_eq!(
            cfg.metrics_address(),
            Some("127.0.0.1:9464".parse().unwrap())
        );
        clear("SWEEPER");
    }

    #[test]
    fn bad_listener_address_is_rejected() {
        let _guard = ENV_GUARD.lock().unwrap();
        clear("SWEEPER");
        env::set_var("SWEEPER_METRICS_ADDRESS", "localhost");

        let err = TelemetryConfig::from_env("SWEEPER").unwrap_err();
        assert!(matches!(err, TelemetryError::InvalidMetricsAddress(ref addr, _) if addr == "localhost"));
        clear("SWEEPER");
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let _guard = ENV_GUARD.lock().unwrap();
        clear("SWEEPER");
        env::set_var("SWEEPER_LOG_FILTER", "   ");
        env::set_var("SWEEPER_METRICS_ADDRESS", "  ");

        let cfg = TelemetryConfig::from_env("SWEEPER").unwrap();
        assert_eq!(cfg.log_filter(), "info");
        assert_eq!(cfg.metrics_address(), None);
        clear("SWEEPER");
    }

    #[test]
    fn relay_metric_names_follow_unit_suffixes() {
        for &(name, kind, help) in RELAY_METRICS {
            assert!(!help.is_empty());
            match kind {
                MetricKind::Counter => assert!(name.ends_with("_total"), "{name}"),
                MetricKind::LatencyHistogram => assert!(name.ends_with("_ms"), "{name}"),
            }
        }
        let mut names: Vec<_> = RELAY_METRICS.iter().map(|(name, _, _)| *name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), RELAY_METRICS.len());
    }
}
