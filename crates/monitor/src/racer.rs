//! Multi-endpoint broadcast race.
//!
//! Every endpoint receives the same signed transaction concurrently. The
//! caller gets the first result to *complete*, whether it is a success or a
//! failure, so a fast-failing endpoint can mask a slower one that would have
//! accepted the transaction. The remaining submissions keep running on the
//! shared [`TaskTracker`] and a single aggregate log line is written once all
//! of them settle.

use std::{sync::Arc, time::Duration};

use metrics::{counter, histogram};
use solana_sdk::signature::Signature;
use sweep_relay_domain::{
    model::LogCategory,
    services::telemetry::{BROADCAST_ATTEMPTS_TOTAL, BROADCAST_WINNER_LATENCY_MS},
    TelemetryStore,
};
use thiserror::Error;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{timeout, Instant},
};
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::builder::SignedTransfer;
use crate::registry::EndpointRegistry;
use crate::rpc::{SubmitError, SubmitOptions};

/// Outcome of one endpoint's submission.
#[derive(Debug, Clone)]
pub struct SendAttemptResult {
    pub endpoint_id: String,
    pub label: String,
    pub outcome: Result<Signature, SubmitError>,
    pub send_ms: u64,
}

impl SendAttemptResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Success/failure counts over every endpoint of one race.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastTally {
    pub succeeded: usize,
    pub failed: usize,
}

impl BroadcastTally {
    fn add(&mut self, success: bool) {
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

#[derive(Debug)]
pub struct RaceOutcome {
    pub first: SendAttemptResult,
    pub broadcast_ms: u64,
    pub total_rpcs: usize,
    /// Resolves once every endpoint has answered or timed out. Dropping it
    /// does not cancel the accounting.
    pub stragglers: JoinHandle<BroadcastTally>,
}

#[derive(Debug, Error)]
pub enum RaceError {
    #[error("every submission task exited without reporting a result")]
    NoResult,
}

pub struct BroadcastRacer {
    store: Arc<TelemetryStore>,
    tracker: TaskTracker,
    submit_timeout: Duration,
}

impl BroadcastRacer {
    pub fn new(store: Arc<TelemetryStore>, tracker: TaskTracker, submit_timeout: Duration) -> Self {
        Self {
            store,
            tracker,
            submit_timeout,
        }
    }

    pub async fn race(
        &self,
        transfer: &SignedTransfer,
        endpoints: &EndpointRegistry,
    ) -> Result<RaceOutcome, RaceError> {
        let started = Instant::now();
        let total_rpcs = endpoints.len();
        let (result_tx, mut result_rx) = mpsc::unbounded_channel();

        for endpoint in endpoints.iter() {
            let result_tx = result_tx.clone();
            let client = endpoint.client.clone();
            let transaction = transfer.transaction.clone();
            let endpoint_id = endpoint.id.clone();
            let label = endpoint.label.clone();
            let bound = self.submit_timeout;

            self.tracker.spawn(async move {
                let sent_at = Instant::now();
                let outcome = match timeout(bound, client.submit(&transaction, SubmitOptions::race()))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(SubmitError::timeout(bound)),
                };
                let send_ms = sent_at.elapsed().as_millis() as u64;
                debug!(endpoint = %endpoint_id, send_ms, ok = outcome.is_ok(), "submission settled");
                let _ = result_tx.send(SendAttemptResult {
                    endpoint_id,
                    label,
                    outcome,
                    send_ms,
                });
            });
        }
        drop(result_tx);

        let first = result_rx.recv().await.ok_or(RaceError::NoResult)?;
        let broadcast_ms = started.elapsed().as_millis() as u64;

        let mut tally = BroadcastTally::default();
        tally.add(first.is_success());
        let store = self.store.clone();
        let stragglers = self.tracker.spawn(async move {
            while let Some(result) = result_rx.recv().await {
                tally.add(result.is_success());
            }
            counter!(BROADCAST_ATTEMPTS_TOTAL, "result" => "ok").increment(tally.succeeded as u64);
            counter!(BROADCAST_ATTEMPTS_TOTAL, "result" => "error").increment(tally.failed as u64);
            store.log(
                LogCategory::Broadcast,
                format!(
                    "parallel broadcast: {} succeeded, {} failed",
                    tally.succeeded, tally.failed
                ),
            );
            tally
        });

        if first.is_success() {
            histogram!(BROADCAST_WINNER_LATENCY_MS).record(first.send_ms as f64);
        }

        Ok(RaceOutcome {
            first,
            broadcast_ms,
            total_rpcs,
            stragglers,
        })
    }
}
