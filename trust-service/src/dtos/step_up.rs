use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

use crate::models::{GrantOutcome, SensitiveAction};

// The acting subject travels in the body so it is covered by the request
// signature.

#[derive(Deserialize, Validate)]
pub struct GrantRequest {
    #[validate(length(min = 1, max = 256, message = "Subject must be 1-256 characters"))]
    pub subject: String,

    #[validate(length(min = 1, max = 1024, message = "Password is required"))]
    pub password: String,

    pub action: SensitiveAction,

    #[validate(length(min = 1, max = 256, message = "Target must be 1-256 characters"))]
    pub target: String,
}

impl fmt::Debug for GrantRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrantRequest")
            .field("subject", &self.subject)
            .field("password", &"[REDACTED]")
            .field("action", &self.action)
            .field("target", &self.target)
            .finish()
    }
}

/// Identifies one grant for check and consume.
#[derive(Debug, Deserialize, Validate)]
pub struct GrantKeyRequest {
    #[validate(length(min = 1, max = 256, message = "Subject must be 1-256 characters"))]
    pub subject: String,

    pub action: SensitiveAction,

    #[validate(length(min = 1, max = 256, message = "Target must be 1-256 characters"))]
    pub target: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct InvalidateRequest {
    #[validate(length(min = 1, max = 256, message = "Subject must be 1-256 characters"))]
    pub subject: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum GrantResponse {
    #[serde(rename_all = "camelCase")]
    Granted {
        granted: bool,
        expires_in: u64,
        grant_id: String,
    },
    #[serde(rename_all = "camelCase")]
    LockedOut {
        granted: bool,
        message: String,
        locked_until: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Denied {
        granted: bool,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        attempts_remaining: Option<u32>,
    },
}

impl From<GrantOutcome> for GrantResponse {
    fn from(outcome: GrantOutcome) -> Self {
        match outcome {
            GrantOutcome::Granted {
                grant_id,
                expires_in,
                ..
            } => GrantResponse::Granted {
                granted: true,
                expires_in,
                grant_id,
            },
            GrantOutcome::Denied { attempts_remaining } => GrantResponse::Denied {
                granted: false,
                message: denial_message(attempts_remaining),
                attempts_remaining: Some(attempts_remaining),
            },
            GrantOutcome::LockedOut { locked_until, .. } => GrantResponse::LockedOut {
                granted: false,
                message: "Too many failed attempts. Try again later.".to_string(),
                locked_until,
            },
        }
    }
}

fn denial_message(attempts_remaining: u32) -> String {
    match attempts_remaining {
        0 => "Incorrect password. Step-up is now locked.".to_string(),
        1 => "Incorrect password. 1 attempt remaining.".to_string(),
        n => format!("Incorrect password. {} attempts remaining.", n),
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct GrantCheckResponse {
    pub valid: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct GrantConsumeResponse {
    pub consumed: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct InvalidateResponse {
    pub invalidated: u64,
}
