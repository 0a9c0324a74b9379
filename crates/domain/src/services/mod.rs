//! Shared service helpers: the in-memory telemetry store and tracing/metrics wiring.

pub mod store;
pub mod telemetry;

pub use store::*;
pub use telemetry::*;
