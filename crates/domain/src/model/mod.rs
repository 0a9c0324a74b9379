//! Data structures shared by the sweep pipeline and the dashboard.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum_macros::{AsRefStr, IntoStaticStr};

/// Returns the lamports to forward once the fee reserve is withheld, or
/// `None` when the balance does not cover the reserve.
pub fn sweep_amount(balance: u64, fee_reserve: u64) -> Option<u64> {
    balance.checked_sub(fee_reserve).filter(|amount| *amount > 0)
}

/// Kind of operational log line shown on the dashboard.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LogCategory {
    Info,
    Receive,
    Send,
    Broadcast,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub category: LogCategory,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

impl LogEntry {
    pub fn new(category: LogCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            timestamp: Utc::now(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }
}

/// Lifecycle of a single sweep attempt.
///
/// `start -> insufficient`, `start -> built -> broadcasting -> sent`,
/// `broadcasting -> broadcast_failed`, and any non-terminal stage may end in
/// `exception`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ForwardStage {
    Start,
    Insufficient,
    Built,
    Broadcasting,
    Sent,
    BroadcastFailed,
    Exception,
}

impl ForwardStage {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Insufficient | Self::Sent | Self::BroadcastFailed | Self::Exception
        )
    }

    pub fn can_advance_to(self, next: ForwardStage) -> bool {
        use ForwardStage::*;
        match (self, next) {
            (Start, Insufficient) | (Start, Built) => true,
            (Built, Broadcasting) => true,
            (Broadcasting, Sent) | (Broadcasting, BroadcastFailed) => true,
            (current, Exception) => !current.is_terminal(),
            _ => false,
        }
    }
}

/// Typed reason a submission was rejected.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubmitErrorKind {
    /// Fee or rent could not be covered by the account.
    InsufficientFunds,
    /// The embedded blockhash expired or is unknown to the node.
    StaleBlockhash,
    /// The endpoint did not answer within the per-call bound.
    Timeout,
    Unclassified,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcLatency {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get_blockhash_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broadcast_ms: Option<u64>,
}

impl RpcLatency {
    pub fn total_ms(&self) -> u64 {
        self.get_blockhash_ms.unwrap_or(0) + self.broadcast_ms.unwrap_or(0)
    }
}

/// One sweep attempt, owned and mutated by the forwarder until recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardOperation {
    pub stage: ForwardStage,
    pub lamports_balance: u64,
    pub lamports_to_send: Option<u64>,
    pub blockhash: Option<String>,
    pub rpc_latency: RpcLatency,
    pub signature: Option<String>,
    pub error: Option<String>,
    pub error_kind: Option<SubmitErrorKind>,
    pub winner_endpoint: Option<String>,
    pub winner_rpc: Option<String>,
    pub winner_send_ms: Option<u64>,
    pub total_rpcs: Option<usize>,
    pub total_duration_ms: u64,
}

impl ForwardOperation {
    pub fn start(lamports_balance: u64) -> Self {
        Self {
            stage: ForwardStage::Start,
            lamports_balance,
            lamports_to_send: None,
            blockhash: None,
            rpc_latency: RpcLatency::default(),
            signature: None,
            error: None,
            error_kind: None,
            winner_endpoint: None,
            winner_rpc: None,
            winner_send_ms: None,
            total_rpcs: None,
            total_duration_ms: 0,
        }
    }

    pub fn advance(&mut self, next: ForwardStage) {
        debug_assert!(
            self.stage.can_advance_to(next),
            "illegal forward transition {:?} -> {:?}",
            self.stage,
            next
        );
        self.stage = next;
    }
}

/// A finalized [`ForwardOperation`] plus the derived timing split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendDetailRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub operation: ForwardOperation,
    pub rpc_ms: u64,
    pub local_processing_ms: u64,
    pub rpc_percentage: Option<u8>,
}

impl SendDetailRecord {
    pub fn finalize(id: String, operation: ForwardOperation) -> Self {
        let rpc_ms = operation.rpc_latency.total_ms();
        let total = operation.total_duration_ms;
        let local_processing_ms = total.saturating_sub(rpc_ms);
        let rpc_percentage = (total > 0)
            .then(|| ((rpc_ms.min(total) * 100 + total / 2) / total) as u8);

        Self {
            id,
            timestamp: Utc::now(),
            operation,
            rpc_ms,
            local_processing_ms,
            rpc_percentage,
        }
    }
}
