//! Domain-level building blocks shared across the monitor and dashboard crates.
//!
//! Everything here is free of network I/O: configuration loading, endpoint
//! URL normalization, the sweep data model and the in-memory telemetry store
//! that the dashboard reads from.

pub mod config;
pub mod endpoint;
pub mod model;
pub mod services;

pub use config::{ApiConfig, ConfigError, RelayConfig, WatchedAccount};
pub use endpoint::{EndpointError, EndpointUrl};
pub use model::*;
pub use services::store::TelemetryStore;
