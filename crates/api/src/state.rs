use std::sync::Arc;

use sweep_relay_domain::{services::telemetry::TelemetryGuard, TelemetryStore};

#[derive(Clone)]
pub struct AppState {
    store: Arc<TelemetryStore>,
    telemetry: TelemetryGuard,
}

impl AppState {
    pub fn new(store: Arc<TelemetryStore>, telemetry: TelemetryGuard) -> Self {
        Self { store, telemetry }
    }

    pub fn store(&self) -> &TelemetryStore {
        self.store.as_ref()
    }

    pub fn telemetry(&self) -> &TelemetryGuard {
        &self.telemetry
    }
}
