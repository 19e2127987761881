//! Audit records for security-relevant events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    Failure,
    Denied,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "success",
            AuditStatus::Failure => "failure",
            AuditStatus::Denied => "denied",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    StepUpRequested,
    StepUpConsumed,
    StepUpInvalidated,
    SignatureRejected,
    IntegrityFailure,
    SecretSealed,
    SecretOpened,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::StepUpRequested => "step_up_requested",
            AuditAction::StepUpConsumed => "step_up_consumed",
            AuditAction::StepUpInvalidated => "step_up_invalidated",
            AuditAction::SignatureRejected => "signature_rejected",
            AuditAction::IntegrityFailure => "integrity_failure",
            AuditAction::SecretSealed => "secret_sealed",
            AuditAction::SecretOpened => "secret_opened",
        }
    }
}

/// One append-only audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub subject_id: Option<String>,
    pub action: AuditAction,
    pub status: AuditStatus,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(subject_id: Option<&str>, action: AuditAction, status: AuditStatus) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            subject_id: subject_id.map(str::to_string),
            action,
            status,
            target_type: None,
            target_id: None,
            metadata: serde_json::Value::Object(Default::default()),
            created_at: Utc::now(),
        }
    }

    pub fn with_target(mut self, target_type: impl Into<String>, target_id: impl Into<String>) -> Self {
        self.target_type = Some(target_type.into());
        self.target_id = Some(target_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}
