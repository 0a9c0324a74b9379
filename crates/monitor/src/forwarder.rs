use std::sync::Arc;

use metrics::{counter, histogram};
use sweep_relay_domain::{
    model::{
        sweep_amount, ForwardOperation, ForwardStage, LogCategory, LogEntry, SendDetailRecord,
        SubmitErrorKind,
    },
    services::telemetry::{FORWARD_DURATION_MS, FORWARD_OPERATIONS_TOTAL},
    TelemetryStore,
};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;

use crate::builder::TransactionBuilder;
use crate::racer::{BroadcastRacer, RaceError};
use crate::registry::EndpointRegistry;
use crate::rpc::{LedgerError, SubmitError};

/// Unexpected failures that end an operation in the `exception` stage.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("failed to build transaction: {0}")]
    Build(#[from] LedgerError),
    #[error(transparent)]
    Race(#[from] RaceError),
}

/// Drives one sweep end to end: amount check, build, race, record.
pub struct Forwarder {
    registry: Arc<EndpointRegistry>,
    builder: TransactionBuilder,
    racer: BroadcastRacer,
    store: Arc<TelemetryStore>,
    tracker: TaskTracker,
    fee_reserve: u64,
}

impl Forwarder {
    pub fn new(
        registry: Arc<EndpointRegistry>,
        builder: TransactionBuilder,
        racer: BroadcastRacer,
        store: Arc<TelemetryStore>,
        tracker: TaskTracker,
        fee_reserve: u64,
    ) -> Self {
        Self {
            registry,
            builder,
            racer,
            store,
            tracker,
            fee_reserve,
        }
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<TelemetryStore> {
        &self.store
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    pub fn builder(&self) -> &TransactionBuilder {
        &self.builder
    }

    /// Sweeps `balance` minus the fee reserve. Never fails: every outcome,
    /// including unexpected errors, ends in a recorded terminal stage.
    pub async fn forward(&self, balance: u64) -> SendDetailRecord {
        let started = Instant::now();
        let mut operation = ForwardOperation::start(balance);

        if let Err(err) = self.drive(&mut operation).await {
            operation.error = Some(err.to_string());
            operation.advance(ForwardStage::Exception);
            self.store
                .log(LogCategory::Error, format!("exception while forwarding: {err}"));
        }

        operation.total_duration_ms = started.elapsed().as_millis() as u64;
        let stage: &'static str = operation.stage.into();
        counter!(FORWARD_OPERATIONS_TOTAL, "stage" => stage).increment(1);
        histogram!(FORWARD_DURATION_MS).record(operation.total_duration_ms as f64);

        self.store.record_send_detail(operation)
    }

    async fn drive(&self, operation: &mut ForwardOperation) -> Result<(), ForwardError> {
        let Some(amount) = sweep_amount(operation.lamports_balance, self.fee_reserve) else {
            self.store.record_log(
                LogEntry::new(LogCategory::Warning, "balance does not cover the network fee")
                    .with_field("balance", operation.lamports_balance),
            );
            operation.advance(ForwardStage::Insufficient);
            return Ok(());
        };
        operation.lamports_to_send = Some(amount);

        let transfer = self.builder.build(amount).await?;
        operation.blockhash = Some(transfer.blockhash.to_string());
        operation.rpc_latency.get_blockhash_ms = Some(transfer.blockhash_ms);
        operation.advance(ForwardStage::Built);

        operation.advance(ForwardStage::Broadcasting);
        // The straggler handle is tracked by the racer; this operation ends
        // at the first answer.
        let race = self.racer.race(&transfer, &self.registry).await?;
        operation.rpc_latency.broadcast_ms = Some(race.broadcast_ms);
        operation.total_rpcs = Some(race.total_rpcs);

        let first = race.first;
        match first.outcome {
            Ok(signature) => {
                operation.signature = Some(signature.to_string());
                operation.winner_endpoint = Some(first.endpoint_id);
                operation.winner_rpc = Some(first.label.clone());
                operation.winner_send_ms = Some(first.send_ms);
                operation.advance(ForwardStage::Sent);
                self.store.record_log(
                    LogEntry::new(
                        LogCategory::Send,
                        format!(
                            "broadcast to {} RPCs, winner: {} ({}ms)",
                            race.total_rpcs, first.label, first.send_ms
                        ),
                    )
                    .with_field("signature", signature.to_string()),
                );
            }
            Err(err) => {
                operation.error = Some(err.message.clone());
                operation.error_kind = Some(err.kind);
                operation.advance(ForwardStage::BroadcastFailed);
                self.log_broadcast_failure(&err);
            }
        }

        Ok(())
    }

    fn log_broadcast_failure(&self, err: &SubmitError) {
        let (category, message) = match err.kind {
            SubmitErrorKind::InsufficientFunds => (
                LogCategory::Warning,
                format!("insufficient funds for fee or rent: {err}"),
            ),
            SubmitErrorKind::StaleBlockhash => {
                (LogCategory::Warning, format!("blockhash expired: {err}"))
            }
            SubmitErrorKind::Timeout | SubmitErrorKind::Unclassified => (
                LogCategory::Error,
                format!("parallel broadcast failed: {err}"),
            ),
        };
        let kind: &'static str = err.kind.into();
        self.store
            .record_log(LogEntry::new(category, message).with_field("error_kind", kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{forwarder_over, MockLedger, MockOutcome};
    use std::sync::atomic::Ordering;

    const FEE_RESERVE: u64 = 5_000;

    fn forwarder(ledgers: &[Arc<MockLedger>]) -> Forwarder {
        forwarder_over(ledgers, FEE_RESERVE)
    }

    fn total_submissions(ledgers: &[Arc<MockLedger>]) -> usize {
        ledgers
            .iter()
            .map(|ledger| ledger.submit_calls.load(Ordering::SeqCst))
            .sum()
    }

    #[tokio::test]
    async fn balances_at_or_below_reserve_are_insufficient() {
        let ledgers = vec![Arc::new(MockLedger::new()), Arc::new(MockLedger::new())];
        let forwarder = forwarder(&ledgers);

        for balance in [0, 1, 4_999, 5_000] {
            let record = forwarder.forward(balance).await;
            assert_eq!(record.operation.stage, ForwardStage::Insufficient);
            assert_eq!(record.operation.lamports_to_send, None);
        }

        assert_eq!(total_submissions(&ledgers), 0);
        assert_eq!(ledgers[0].blockhash_calls.load(Ordering::SeqCst), 0);
        let warnings = forwarder.store().recent_logs(None);
        assert_eq!(warnings.len(), 4);
        assert!(warnings
            .iter()
            .all(|entry| entry.category == LogCategory::Warning));
        assert_eq!(forwarder.store().send_detail_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn sends_balance_minus_reserve_and_records_winner() {
        let ledgers = vec![
            Arc::new(MockLedger::new().with_submit(50, MockOutcome::Succeed)),
            Arc::new(MockLedger::new().with_submit(80, MockOutcome::Succeed)),
            Arc::new(MockLedger::new().with_submit(120, MockOutcome::Succeed)),
        ];
        let forwarder = forwarder(&ledgers);

        let record = forwarder.forward(1_000_000).await;
        let op = &record.operation;
        assert_eq!(op.stage, ForwardStage::Sent);
        assert_eq!(op.lamports_to_send, Some(995_000));
        assert_eq!(op.winner_endpoint.as_deref(), Some("endpoint-1"));
        assert_eq!(op.winner_send_ms, Some(50));
        assert_eq!(op.total_rpcs, Some(3));
        assert_eq!(op.rpc_latency.broadcast_ms, Some(50));
        assert!(op.signature.is_some());
        for ledger in &ledgers {
            assert_eq!(ledger.submitted_lamports(), vec![995_000]);
        }
        assert_eq!(forwarder.store().recent_send_details(None), vec![record.clone()]);
        let latest = &forwarder.store().recent_logs(Some(1))[0];
        assert_eq!(latest.category, LogCategory::Send);
        assert_eq!(latest.fields["signature"], op.signature.clone().unwrap());
    }

    #[tokio::test]
    async fn blockhash_failure_is_an_exception_without_submissions() {
        let ledgers = vec![
            Arc::new(MockLedger::new().failing_blockhash("timed out fetching blockhash")),
            Arc::new(MockLedger::new()),
        ];
        let forwarder = forwarder(&ledgers);

        let record = forwarder.forward(1_000_000).await;
        assert_eq!(record.operation.stage, ForwardStage::Exception);
        assert!(record
            .operation
            .error
            .as_deref()
            .unwrap()
            .contains("timed out fetching blockhash"));
        assert_eq!(total_submissions(&ledgers), 0);
        let latest = &forwarder.store().recent_logs(Some(1))[0];
        assert_eq!(latest.category, LogCategory::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_classified_but_share_one_stage() {
        let cases = [
            (SubmitErrorKind::InsufficientFunds, LogCategory::Warning, "insufficient funds"),
            (SubmitErrorKind::StaleBlockhash, LogCategory::Warning, "blockhash expired"),
            (SubmitErrorKind::Unclassified, LogCategory::Error, "parallel broadcast failed"),
        ];
        for (kind, category, wording) in cases {
            let ledgers = vec![Arc::new(
                MockLedger::new().with_submit(10, MockOutcome::Fail(kind, "rejected".into())),
            )];
            let forwarder = forwarder(&ledgers);

            let record = forwarder.forward(50_000).await;
            assert_eq!(record.operation.stage, ForwardStage::BroadcastFailed);
            assert_eq!(record.operation.error_kind, Some(kind));
            assert_eq!(record.operation.error.as_deref(), Some("rejected"));

            let failure = forwarder
                .store()
                .recent_logs(None)
                .into_iter()
                .find(|entry| entry.category != LogCategory::Broadcast)
                .unwrap();
            assert_eq!(failure.category, category);
            assert!(failure.message.starts_with(wording), "{}", failure.message);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_runs_are_not_deduplicated() {
        let ledgers = vec![Arc::new(MockLedger::new().with_submit(10, MockOutcome::Succeed))];
        let forwarder = Arc::new(forwarder(&ledgers));
        let (a, b) = tokio::join!(forwarder.forward(60_000), forwarder.forward(60_000));
        assert_eq!(a.operation.stage, ForwardStage::Sent);
        assert_eq!(b.operation.stage, ForwardStage::Sent);
        assert_eq!(total_submissions(&ledgers), 2);
        assert_eq!(forwarder.store().send_detail_count(), 2);
    }
}
