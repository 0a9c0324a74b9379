use async_trait::async_trait;
use futures_util::StreamExt;
use solana_client::{
    client_error::ClientError,
    nonblocking::{pubsub_client::PubsubClient, rpc_client::RpcClient},
    rpc_config::{RpcSendTransactionConfig, RpcTransactionLogsConfig, RpcTransactionLogsFilter},
};
use solana_sdk::{
    commitment_config::{CommitmentConfig, CommitmentLevel},
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::Transaction,
};
use sweep_relay_domain::endpoint::EndpointUrl;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

mod types;

pub use types::{
    classify_client_error, classify_transaction_error, LogNotification, SubmitError,
    SubmitOptions,
};

/// Failures of reads and subscriptions against a single endpoint.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("subscription error: {0}")]
    Subscription(String),
}

impl From<ClientError> for LedgerError {
    fn from(value: ClientError) -> Self {
        Self::Rpc(value.to_string())
    }
}

/// The remote calls the sweep pipeline makes against one endpoint. All reads
/// use `processed` commitment.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn balance(&self, account: &Pubkey) -> Result<u64, LedgerError>;
    async fn latest_blockhash(&self) -> Result<Hash, LedgerError>;
    async fn submit(
        &self,
        transaction: &Transaction,
        options: SubmitOptions,
    ) -> Result<Signature, SubmitError>;
    async fn subscribe_account_logs(&self, account: &Pubkey)
        -> Result<AccountLogStream, LedgerError>;
}

/// Notifications for one standing subscription. Ends when the remote side
/// closes the stream; it is never re-established.
#[derive(Debug)]
pub struct AccountLogStream {
    receiver: mpsc::UnboundedReceiver<LogNotification>,
}

impl AccountLogStream {
    pub fn from_receiver(receiver: mpsc::UnboundedReceiver<LogNotification>) -> Self {
        Self { receiver }
    }

    pub async fn next(&mut self) -> Option<LogNotification> {
        self.receiver.recv().await
    }
}

/// [`LedgerClient`] backed by the Solana nonblocking RPC and pubsub clients.
pub struct SolanaLedgerClient {
    rpc: RpcClient,
    websocket_url: String,
}

impl SolanaLedgerClient {
    pub fn new(url: &EndpointUrl) -> Self {
        Self {
            rpc: RpcClient::new_with_commitment(
                url.as_str().to_string(),
                CommitmentConfig::processed(),
            ),
            websocket_url: url.websocket_url(),
        }
    }
}

#[async_trait]
impl LedgerClient for SolanaLedgerClient {
    async fn balance(&self, account: &Pubkey) -> Result<u64, LedgerError> {
        Ok(self
            .rpc
            .get_balance_with_commitment(account, CommitmentConfig::processed())
            .await?
            .value)
    }

    async fn latest_blockhash(&self) -> Result<Hash, LedgerError> {
        let (blockhash, _last_valid_height) = self
            .rpc
            .get_latest_blockhash_with_commitment(CommitmentConfig::processed())
            .await?;
        Ok(blockhash)
    }

    async fn submit(
        &self,
        transaction: &Transaction,
        options: SubmitOptions,
    ) -> Result<Signature, SubmitError> {
        let config = RpcSendTransactionConfig {
            skip_preflight: options.skip_preflight,
            preflight_commitment: Some(CommitmentLevel::Processed),
            max_retries: Some(options.max_retries),
            ..Default::default()
        };
        Ok(self
            .rpc
            .send_transaction_with_config(transaction, config)
            .await?)
    }

    async fn subscribe_account_logs(
        &self,
        account: &Pubkey,
    ) -> Result<AccountLogStream, LedgerError> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let websocket_url = self.websocket_url.clone();
        let mention = account.to_string();

        // The pubsub stream borrows its client, so both live in one task that
        // forwards notifications into an owned channel.
        tokio::spawn(async move {
            let client = match PubsubClient::new(&websocket_url).await {
                Ok(client) => client,
                Err(err) => {
                    let _ = ready_tx.send(Err(LedgerError::Subscription(err.to_string())));
                    return;
                }
            };
            let subscription = client
                .logs_subscribe(
                    RpcTransactionLogsFilter::Mentions(vec![mention]),
                    RpcTransactionLogsConfig {
                        commitment: Some(CommitmentConfig::processed()),
                    },
                )
                .await;
            let (mut stream, unsubscribe) = match subscription {
                Ok(pair) => pair,
                Err(err) => {
                    let _ = ready_tx.send(Err(LedgerError::Subscription(err.to_string())));
                    return;
                }
            };
            if ready_tx.send(Ok(())).is_err() {
                unsubscribe().await;
                return;
            }

            while let Some(response) = stream.next().await {
                debug!(signature = %response.value.signature, "account log notification");
                let notification = LogNotification {
                    signature: response.value.signature,
                    slot: response.context.slot,
                };
                if notify_tx.send(notification).is_err() {
                    break;
                }
            }
            warn!(url = %websocket_url, "account log stream ended");
            unsubscribe().await;
        });

        ready_rx
            .await
            .map_err(|_| LedgerError::Subscription("subscription task exited".into()))??;
        Ok(AccountLogStream::from_receiver(notify_rx))
    }
}
