//! Audit records and sinks
//!
//! Every pipeline decision produces one [`AuditRecord`]. Sinks are
//! fire-and-forget: [`AuditSink::record`] must return without waiting on
//! I/O, so a slow consumer can never stall request processing.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::security::StatementKind;
use crate::types::{RejectReason, Verdict};

/// Audit entry for one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub client_id: String,
    pub database: Option<String>,
    pub statement_kind: StatementKind,
    pub verdict: Verdict,
    pub reason: Option<RejectReason>,
    pub rule_id: Option<String>,
    /// Rule ids of every threat signature observed
    pub threats: Vec<&'static str>,
    pub latency_us: u64,
    pub cached: bool,
    /// Admitted, but the executor failed or timed out
    pub execution_failed: bool,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: u64,
}

impl AuditRecord {
    #[must_use]
    pub fn new(client_id: impl Into<String>, statement_kind: StatementKind, verdict: Verdict) -> Self {
        Self {
            client_id: client_id.into(),
            database: None,
            statement_kind,
            verdict,
            reason: None,
            rule_id: None,
            threats: Vec::new(),
            latency_us: 0,
            cached: matches!(verdict, Verdict::ServeCached),
            execution_failed: false,
            timestamp_ms: unix_millis(),
        }
    }

    #[must_use]
    pub const fn latency(&self) -> Duration {
        Duration::from_micros(self.latency_us)
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

/// Destination for audit records
pub trait AuditSink: Send + Sync + fmt::Debug {
    /// Record one entry. Must not block.
    fn record(&self, record: &AuditRecord);
}

/// Writes audit records as structured `tracing` events on the `audit` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) {
        let reason = record.reason.map(|r| r.as_str());
        let threats = record.threats.join(",");

        if record.verdict == Verdict::Reject {
            tracing::warn!(
                target: "audit",
                client_id = %record.client_id,
                database = record.database.as_deref(),
                statement = record.statement_kind.as_str(),
                verdict = record.verdict.as_str(),
                reason,
                rule_id = record.rule_id.as_deref(),
                threats = %threats,
                latency_us = record.latency_us,
                "Request rejected"
            );
        } else {
            tracing::info!(
                target: "audit",
                client_id = %record.client_id,
                database = record.database.as_deref(),
                statement = record.statement_kind.as_str(),
                verdict = record.verdict.as_str(),
                cached = record.cached,
                execution_failed = record.execution_failed,
                threats = %threats,
                latency_us = record.latency_us,
                "Request processed"
            );
        }
    }
}

/// Hands records to a bounded channel; drops them when the channel is full
#[derive(Debug, Clone)]
pub struct ChannelAuditSink {
    sender: mpsc::Sender<AuditRecord>,
    dropped: Arc<AtomicU64>,
}

impl ChannelAuditSink {
    /// Create a sink and the receiving end of its channel
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AuditRecord>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let sink = Self {
            sender,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (sink, receiver)
    }

    /// Create a sink whose records are forwarded to `inner` by a background task.
    ///
    /// The task ends once every clone of the returned sink is dropped.
    #[must_use]
    pub fn spawn(capacity: usize, inner: Arc<dyn AuditSink>) -> (Self, JoinHandle<()>) {
        let (sink, mut receiver) = Self::new(capacity);
        let handle = tokio::spawn(async move {
            while let Some(record) = receiver.recv().await {
                inner.record(&record);
            }
            tracing::debug!("Audit channel closed");
        });
        (sink, handle)
    }

    /// Records dropped because the channel was full or closed
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl AuditSink for ChannelAuditSink {
    fn record(&self, record: &AuditRecord) {
        if let Err(e) = self.sender.try_send(record.clone()) {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            let cause = match e {
                mpsc::error::TrySendError::Full(_) => "full",
                mpsc::error::TrySendError::Closed(_) => "closed",
            };
            tracing::debug!(cause, dropped_total = total, "Audit record dropped");
        }
    }
}
