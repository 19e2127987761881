use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

use crate::vault::StoredSecret;

#[derive(Deserialize, Validate)]
pub struct SealRequest {
    #[validate(length(min = 1, max = 256, message = "Subject must be 1-256 characters"))]
    pub subject: String,

    #[validate(length(min = 1, max = 256, message = "Target must be 1-256 characters"))]
    pub target: String,

    #[validate(length(min = 1, max = 4096, message = "Secret must be 1-4096 characters"))]
    pub secret: String,
}

impl fmt::Debug for SealRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealRequest")
            .field("subject", &self.subject)
            .field("target", &self.target)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// A stored credential presented back for verification.
#[derive(Debug, Deserialize, Validate)]
pub struct InspectRequest {
    #[validate(length(min = 1, max = 256, message = "Subject must be 1-256 characters"))]
    pub subject: String,

    #[validate(length(min = 1, max = 256, message = "Target must be 1-256 characters"))]
    pub target: String,

    pub sealed: StoredSecret,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SealResponse {
    pub sealed: StoredSecret,
}

/// Only a masked preview of the plaintext leaves the service.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct InspectResponse {
    pub masked: String,
}
