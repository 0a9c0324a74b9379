//! Library entrypoint for embedding the monitor inside other binaries (e.g.,
//! the API process). The binary in `main.rs` runs the monitor alone and logs
//! through tracing only; production co-locates it with the dashboard so both
//! share one telemetry store.

pub mod builder;
pub mod forwarder;
pub mod pipeline;
pub mod racer;
pub mod registry;
pub mod rpc;
pub mod worker;

#[cfg(test)]
mod testing;

pub use forwarder::{ForwardError, Forwarder};
pub use racer::{BroadcastRacer, BroadcastTally, RaceOutcome};
pub use registry::{Endpoint, EndpointRegistry};
pub use rpc::{LedgerClient, LedgerError, SolanaLedgerClient};
pub use worker::{assemble, build_forwarder, run_monitor, MonitorError, SweepSettings};
