use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, PoisonError,
    },
};

use chrono::Utc;
use tracing::{error, info, warn};

use crate::model::{ForwardOperation, LogCategory, LogEntry, SendDetailRecord};

pub const LOG_CAPACITY: usize = 1000;
pub const SEND_DETAIL_CAPACITY: usize = 500;

/// Newest-first buffer that drops its oldest entries past `capacity`.
#[derive(Debug)]
pub struct RingBuffer<T> {
    capacity: usize,
    entries: Mutex<VecDeque<T>>,
}

impl<T: Clone> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Prepends and truncates under one lock so readers never observe the
    /// buffer above its cap.
    pub fn push(&self, entry: T) {
        let mut guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        guard.push_front(entry);
        guard.truncate(self.capacity);
    }

    /// Up to `limit` entries, newest first. `None` returns everything.
    pub fn latest(&self, limit: Option<usize>) -> Vec<T> {
        let guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let take = limit.unwrap_or(guard.len());
        guard.iter().take(take).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-scoped store backing the dashboard: operational log lines and
/// finalized send records. Content is lost on restart.
#[derive(Debug)]
pub struct TelemetryStore {
    logs: RingBuffer<LogEntry>,
    send_details: RingBuffer<SendDetailRecord>,
    sequence: AtomicU64,
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::with_capacity(LOG_CAPACITY, SEND_DETAIL_CAPACITY)
    }
}

impl TelemetryStore {
    pub fn with_capacity(log_capacity: usize, send_detail_capacity: usize) -> Self {
        Self {
            logs: RingBuffer::new(log_capacity),
            send_details: RingBuffer::new(send_detail_capacity),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn log(&self, category: LogCategory, message: impl Into<String>) {
        self.record_log(LogEntry::new(category, message));
    }

    /// Appends a log entry and mirrors it to the tracing subscriber.
    pub fn record_log(&self, entry: LogEntry) {
        let category: &'static str = entry.category.into();
        match entry.category {
            LogCategory::Error => error!(category, fields = ?entry.fields, "{}", entry.message),
            LogCategory::Warning => warn!(category, fields = ?entry.fields, "{}", entry.message),
            _ => info!(category, fields = ?entry.fields, "{}", entry.message),
        }
        self.logs.push(entry);
    }

    /// Finalizes the operation into a [`SendDetailRecord`] and stores it.
    pub fn record_send_detail(&self, operation: ForwardOperation) -> SendDetailRecord {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let id = format!("{}-{seq}", Utc::now().timestamp_millis());
        let record = SendDetailRecord::finalize(id, operation);

        let op = &record.operation;
        let stage: &'static str = op.stage.into();
        info!(
            stage,
            signature = op.signature.as_deref().unwrap_or("N/A"),
            total_ms = op.total_duration_ms,
            get_blockhash_ms = ?op.rpc_latency.get_blockhash_ms,
            broadcast_ms = ?op.rpc_latency.broadcast_ms,
            rpc_ms = record.rpc_ms,
            local_ms = record.local_processing_ms,
            "send detail recorded"
        );

        self.send_details.push(record.clone());
        record
    }

    pub fn recent_logs(&self, limit: Option<usize>) -> Vec<LogEntry> {
        self.logs.latest(limit)
    }

    pub fn recent_send_details(&self, limit: Option<usize>) -> Vec<SendDetailRecord> {
        self.send_details.latest(limit)
    }

    pub fn log_count(&self) -> usize {
        self.logs.len()
    }

    pub fn send_detail_count(&self) -> usize {
        self.send_details.len()
    }
}
