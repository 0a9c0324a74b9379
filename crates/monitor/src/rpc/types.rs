use std::time::Duration;

use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_sdk::{instruction::InstructionError, transaction::TransactionError};
use sweep_relay_domain::model::SubmitErrorKind;
use thiserror::Error;

/// `SystemError::ResultWithNegativeLamports`, returned by the system program
/// when a transfer exceeds the source balance.
const SYSTEM_RESULT_WITH_NEGATIVE_LAMPORTS: u32 = 1;

/// Per-submission flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOptions {
    pub skip_preflight: bool,
    pub max_retries: usize,
}

impl SubmitOptions {
    /// Fail fast: no local simulation and no node-side rebroadcast. The race
    /// across endpoints is the redundancy.
    pub const fn race() -> Self {
        Self {
            skip_preflight: true,
            max_retries: 0,
        }
    }
}

/// A rejected submission with its typed classification.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct SubmitError {
    pub kind: SubmitErrorKind,
    pub message: String,
}

impl SubmitError {
    pub fn new(kind: SubmitErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            SubmitErrorKind::Timeout,
            format!("no response within {}ms", after.as_millis()),
        )
    }
}

impl From<ClientError> for SubmitError {
    fn from(err: ClientError) -> Self {
        Self::new(classify_client_error(&err), err.to_string())
    }
}

pub fn classify_client_error(err: &ClientError) -> SubmitErrorKind {
    if let Some(tx_err) = err.get_transaction_error() {
        return classify_transaction_error(&tx_err);
    }
    match err.kind() {
        ClientErrorKind::Reqwest(inner) if inner.is_timeout() => SubmitErrorKind::Timeout,
        _ => SubmitErrorKind::Unclassified,
    }
}

pub fn classify_transaction_error(err: &TransactionError) -> SubmitErrorKind {
    match err {
        TransactionError::BlockhashNotFound => SubmitErrorKind::StaleBlockhash,
        TransactionError::InsufficientFundsForFee
        | TransactionError::InsufficientFundsForRent { .. } => SubmitErrorKind::InsufficientFunds,
        TransactionError::InstructionError(
            _,
            InstructionError::Custom(SYSTEM_RESULT_WITH_NEGATIVE_LAMPORTS),
        ) => SubmitErrorKind::InsufficientFunds,
        _ => SubmitErrorKind::Unclassified,
    }
}

/// One `logsSubscribe` notification for the watched account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogNotification {
    pub signature: String,
    pub slot: u64,
}
