use std::sync::Arc;

use solana_sdk::{
    hash::Hash, pubkey::Pubkey, signature::Signature, system_instruction,
    transaction::Transaction,
};
use sweep_relay_domain::config::WatchedAccount;
use tokio::time::Instant;

use crate::rpc::{LedgerClient, LedgerError};

/// A signed single-transfer transaction, ready for submission.
#[derive(Debug, Clone)]
pub struct SignedTransfer {
    pub transaction: Arc<Transaction>,
    pub signature: Signature,
    pub blockhash: Hash,
    pub lamports: u64,
    pub blockhash_ms: u64,
}

/// Builds sweep transactions from the watched account to the destination.
pub struct TransactionBuilder {
    account: WatchedAccount,
    destination: Pubkey,
    blockhash_source: Arc<dyn LedgerClient>,
}

impl TransactionBuilder {
    pub fn new(
        account: WatchedAccount,
        destination: Pubkey,
        blockhash_source: Arc<dyn LedgerClient>,
    ) -> Self {
        Self {
            account,
            destination,
            blockhash_source,
        }
    }

    pub fn account(&self) -> &WatchedAccount {
        &self.account
    }

    pub fn destination(&self) -> Pubkey {
        self.destination
    }

    /// Fetches one fresh blockhash and signs a transfer of `lamports`. Fetch
    /// failures are returned as-is; nothing is retried here.
    pub async fn build(&self, lamports: u64) -> Result<SignedTransfer, LedgerError> {
        let started = Instant::now();
        let blockhash = self.blockhash_source.latest_blockhash().await?;
        let blockhash_ms = started.elapsed().as_millis() as u64;

        let payer = self.account.pubkey();
        let instruction = system_instruction::transfer(&payer, &self.destination, lamports);
        let transaction = Transaction::new_signed_with_payer(
            &[instruction],
            Some(&payer),
            &[self.account.keypair()],
            blockhash,
        );
        let signature = transaction.signatures[0];

        Ok(SignedTransfer {
            transaction: Arc::new(transaction),
            signature,
            blockhash,
            lamports,
            blockhash_ms,
        })
    }
}
