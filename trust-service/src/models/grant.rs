use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Operations that require a fresh password confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitiveAction {
    Sign,
    SignBlock,
    SendProcess,
    InsertDocument,
    UpdateCredential,
}

impl SensitiveAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensitiveAction::Sign => "sign",
            SensitiveAction::SignBlock => "sign_block",
            SensitiveAction::SendProcess => "send_process",
            SensitiveAction::InsertDocument => "insert_document",
            SensitiveAction::UpdateCredential => "update_credential",
        }
    }
}

impl fmt::Display for SensitiveAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensitiveAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sign" => Ok(SensitiveAction::Sign),
            "sign_block" => Ok(SensitiveAction::SignBlock),
            "send_process" => Ok(SensitiveAction::SendProcess),
            "insert_document" => Ok(SensitiveAction::InsertDocument),
            "update_credential" => Ok(SensitiveAction::UpdateCredential),
            other => Err(format!("Unknown sensitive action: {}", other)),
        }
    }
}

/// Single-use authorization for one (subject, action, target).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub grant_id: String,
    pub subject_id: String,
    pub action: SensitiveAction,
    pub target_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub origin_ip: Option<String>,
}

impl Grant {
    pub fn issue(
        subject_id: &str,
        action: SensitiveAction,
        target_id: &str,
        origin_ip: Option<&str>,
        issued_at: DateTime<Utc>,
        ttl_seconds: u64,
    ) -> Self {
        Self {
            grant_id: Uuid::new_v4().simple().to_string(),
            subject_id: subject_id.to_string(),
            action,
            target_id: target_id.to_string(),
            issued_at,
            expires_at: i64::try_from(ttl_seconds)
                .ok()
                .and_then(chrono::Duration::try_seconds)
                .and_then(|ttl| issued_at.checked_add_signed(ttl))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            origin_ip: origin_ip.map(str::to_string),
        }
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Result of a grant request. Control-flow outcomes, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
    Granted {
        grant_id: String,
        expires_in: u64,
        expires_at: DateTime<Utc>,
    },
    Denied {
        attempts_remaining: u32,
    },
    LockedOut {
        locked_until: DateTime<Utc>,
        retry_after_seconds: u64,
    },
}

impl GrantOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, GrantOutcome::Granted { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            GrantOutcome::Granted { .. } => "granted",
            GrantOutcome::Denied { .. } => "denied",
            GrantOutcome::LockedOut { .. } => "locked_out",
        }
    }
}
