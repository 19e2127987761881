//! Append-only audit sinks.
//!
//! Recording is fire-and-forget from the caller's point of view: use
//! [`record_event`], which never fails the surrounding operation.

use async_trait::async_trait;
use metrics::counter;
use redis::aio::ConnectionManager;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use trust_core::middleware::{RejectionObserver, SignatureRejection};

use crate::models::{AuditAction, AuditEvent, AuditStatus};

const AUDIT_BUFFER: usize = 1024;
pub const DEFAULT_AUDIT_MAX_LEN: isize = 100_000;

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<(), anyhow::Error>;
}

/// Record through `sink`, surfacing failures to logs and metrics only.
pub async fn record_event(sink: &dyn AuditSink, event: AuditEvent) {
    let action = event.action.as_str();
    if let Err(e) = sink.record(event).await {
        counter!("audit_record_failures_total").increment(1);
        tracing::error!(action = %action, error = %e, "Failed to record audit event");
    }
}

/// Feeds requests refused by the signature middleware into an audit sink.
#[derive(Clone)]
pub struct AuditRejectionObserver {
    audit: Arc<dyn AuditSink>,
}

impl AuditRejectionObserver {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self { audit }
    }
}

#[async_trait]
impl RejectionObserver for AuditRejectionObserver {
    async fn signature_rejected(&self, rejection: SignatureRejection) {
        record_event(
            self.audit.as_ref(),
            AuditEvent::new(None, AuditAction::SignatureRejected, AuditStatus::Denied)
                .with_target("route", format!("{} {}", rejection.method, rejection.path))
                .with_metadata(json!({
                    "request_id": rejection.request_id,
                    "reason": rejection.reason,
                })),
        )
        .await;
    }
}

/// Writes audit events to the structured log under the `audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), anyhow::Error> {
        tracing::info!(
            target: "audit",
            event_id = %event.event_id,
            subject_id = event.subject_id.as_deref().unwrap_or("-"),
            action = event.action.as_str(),
            status = event.status.as_str(),
            target_type = event.target_type.as_deref().unwrap_or("-"),
            target_id = event.target_id.as_deref().unwrap_or("-"),
            metadata = %event.metadata,
            "audit"
        );
        Ok(())
    }
}

/// Pushes JSON events onto a capped Redis list from a background task.
#[derive(Clone)]
pub struct RedisAuditSink {
    tx: mpsc::Sender<AuditEvent>,
}

impl RedisAuditSink {
    pub fn spawn(conn: ConnectionManager, list_key: String, max_len: isize) -> Self {
        let (tx, mut rx) = mpsc::channel::<AuditEvent>(AUDIT_BUFFER);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = push_event(conn.clone(), &list_key, max_len, &event).await {
                    counter!("audit_record_failures_total").increment(1);
                    tracing::error!(
                        event_id = %event.event_id,
                        error = %e,
                        "Failed to persist audit event"
                    );
                }
            }
            tracing::debug!("Audit writer stopped");
        });

        Self { tx }
    }
}

async fn push_event(
    mut conn: ConnectionManager,
    list_key: &str,
    max_len: isize,
    event: &AuditEvent,
) -> Result<(), anyhow::Error> {
    let payload = serde_json::to_string(event)?;

    redis::pipe()
        .atomic()
        .cmd("LPUSH")
        .arg(list_key)
        .arg(payload)
        .ignore()
        .cmd("LTRIM")
        .arg(list_key)
        .arg(0)
        .arg(max_len - 1)
        .ignore()
        .query_async::<_, ()>(&mut conn)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to push audit event: {}", e))
}

#[async_trait]
impl AuditSink for RedisAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), anyhow::Error> {
        self.tx
            .try_send(event)
            .map_err(|e| anyhow::anyhow!("Audit buffer unavailable: {}", e))
    }
}

/// Keeps events in memory for inspection.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), anyhow::Error> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
        Ok(())
    }
}
