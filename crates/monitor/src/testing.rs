//! Scriptable in-memory ledger used by the pipeline tests.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use solana_sdk::{
    hash::Hash, pubkey::Pubkey, signature::Keypair, signature::Signature,
    transaction::Transaction,
};
use sweep_relay_domain::{config::WatchedAccount, model::SubmitErrorKind, TelemetryStore};
use tokio::{sync::mpsc, time::sleep};
use tokio_util::task::TaskTracker;

use crate::builder::TransactionBuilder;
use crate::forwarder::Forwarder;
use crate::racer::BroadcastRacer;
use crate::registry::{endpoint_id, Endpoint, EndpointRegistry};
use crate::rpc::{
    AccountLogStream, LedgerClient, LedgerError, LogNotification, SubmitError, SubmitOptions,
};

#[derive(Debug, Clone)]
pub enum MockOutcome {
    Succeed,
    Fail(SubmitErrorKind, String),
    Hang,
}

pub struct MockLedger {
    balances: Mutex<VecDeque<Result<u64, String>>>,
    default_balance: u64,
    blockhash: Hash,
    blockhash_error: Option<String>,
    submit_delay: Duration,
    submit_outcome: MockOutcome,
    notifications: Mutex<Option<AccountLogStream>>,
    pub balance_calls: AtomicUsize,
    pub blockhash_calls: AtomicUsize,
    pub submit_calls: AtomicUsize,
    pub submitted: Mutex<Vec<(Transaction, SubmitOptions)>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            balances: Mutex::new(VecDeque::new()),
            default_balance: 0,
            blockhash: Hash::new_unique(),
            blockhash_error: None,
            submit_delay: Duration::ZERO,
            submit_outcome: MockOutcome::Succeed,
            notifications: Mutex::new(None),
            balance_calls: AtomicUsize::new(0),
            blockhash_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
        }
    }

    /// Balance reads pop from this queue, then fall back to the last value.
    pub fn with_balances(mut self, balances: &[u64]) -> Self {
        self.default_balance = balances.last().copied().unwrap_or(0);
        self.balances = Mutex::new(balances.iter().copied().map(Ok).collect());
        self
    }

    pub fn with_balance_results(self, results: Vec<Result<u64, String>>) -> Self {
        *self.balances.lock().unwrap() = results.into();
        self
    }

    pub fn failing_blockhash(mut self, message: &str) -> Self {
        self.blockhash_error = Some(message.to_string());
        self
    }

    pub fn with_submit(mut self, delay_ms: u64, outcome: MockOutcome) -> Self {
        self.submit_delay = Duration::from_millis(delay_ms);
        self.submit_outcome = outcome;
        self
    }

    /// Returns the sender half that feeds `subscribe_account_logs`.
    pub fn with_subscription(self) -> (Self, mpsc::UnboundedSender<LogNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.notifications.lock().unwrap() = Some(AccountLogStream::from_receiver(rx));
        (self, tx)
    }

    pub fn blockhash(&self) -> Hash {
        self.blockhash
    }

    pub fn submitted_lamports(&self) -> Vec<u64> {
        self.submitted
            .lock()
            .unwrap()
            .iter()
            .map(|(tx, _)| {
                let data = &tx.message.instructions[0].data;
                u64::from_le_bytes(data[4..12].try_into().unwrap())
            })
            .collect()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn balance(&self, _account: &Pubkey) -> Result<u64, LedgerError> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        match self.balances.lock().unwrap().pop_front() {
            Some(result) => result.map_err(LedgerError::Rpc),
            None => Ok(self.default_balance),
        }
    }

    async fn latest_blockhash(&self) -> Result<Hash, LedgerError> {
        self.blockhash_calls.fetch_add(1, Ordering::SeqCst);
        match &self.blockhash_error {
            Some(message) => Err(LedgerError::Rpc(message.clone())),
            None => Ok(self.blockhash),
        }
    }

    async fn submit(
        &self,
        transaction: &Transaction,
        options: SubmitOptions,
    ) -> Result<Signature, SubmitError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submitted
            .lock()
            .unwrap()
            .push((transaction.clone(), options));
        sleep(self.submit_delay).await;
        match &self.submit_outcome {
            MockOutcome::Succeed => Ok(transaction.signatures[0]),
            MockOutcome::Fail(kind, message) => Err(SubmitError::new(*kind, message.clone())),
            MockOutcome::Hang => std::future::pending().await,
        }
    }

    async fn subscribe_account_logs(
        &self,
        _account: &Pubkey,
    ) -> Result<AccountLogStream, LedgerError> {
        self.notifications
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| LedgerError::Subscription("websocket handshake refused".into()))
    }
}

/// Registry over the given mocks, ids `endpoint-1..`, label `Mock`.
pub fn registry_of(ledgers: &[Arc<MockLedger>]) -> EndpointRegistry {
    let endpoints = ledgers
        .iter()
        .enumerate()
        .map(|(index, ledger)| Endpoint {
            id: endpoint_id(index),
            label: "Mock".to_string(),
            url: format!("http://mock-{}.invalid", index + 1),
            client: ledger.clone() as Arc<dyn LedgerClient>,
        })
        .collect();
    EndpointRegistry::new(endpoints).expect("non-empty registry")
}

/// Forwarder over the given mocks with a fresh store and tracker.
pub fn forwarder_over(ledgers: &[Arc<MockLedger>], fee_reserve: u64) -> Forwarder {
    let registry = Arc::new(registry_of(ledgers));
    let store = Arc::new(TelemetryStore::default());
    let tracker = TaskTracker::new();
    let builder = TransactionBuilder::new(
        WatchedAccount::from_keypair(Keypair::new()),
        Pubkey::new_unique(),
        registry.primary().client.clone(),
    );
    let racer = BroadcastRacer::new(store.clone(), tracker.clone(), Duration::from_secs(10));
    Forwarder::new(registry, builder, racer, store, tracker, fee_reserve)
}
