//! HMAC-SHA256 request signing for service-to-service calls.
//!
//! Signing base: `timestamp \n METHOD \n path \n hex(sha256(body))`.
//! The request id travels alongside the signature for correlation but is not
//! part of the signed base.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_HEADER: &str = "X-Timestamp";
pub const SIGNATURE_HEADER: &str = "X-Signature";
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Default replay window in seconds.
pub const DEFAULT_WINDOW_SECONDS: i64 = 300;

/// Why a signature was rejected. Only ever logged; callers see a uniform denial.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing header {0}")]
    MissingHeader(&'static str),

    #[error("malformed timestamp")]
    MalformedTimestamp,

    #[error("timestamp outside replay window (skew {skew}s)")]
    OutsideWindow { skew: i64 },

    #[error("signature mismatch")]
    Mismatch,

    #[error("invalid signing key")]
    InvalidKey,
}

/// Headers produced for one outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub timestamp: String,
    pub signature: String,
    pub request_id: String,
}

impl SignedHeaders {
    pub fn pairs(&self) -> [(&'static str, &str); 3] {
        [
            (TIMESTAMP_HEADER, self.timestamp.as_str()),
            (SIGNATURE_HEADER, self.signature.as_str()),
            (REQUEST_ID_HEADER, self.request_id.as_str()),
        ]
    }
}

/// Hex-encoded SHA-256 of the raw body.
pub fn body_digest(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

pub fn signing_base(timestamp: &str, method: &str, path: &str, body: &[u8]) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        timestamp,
        method.to_ascii_uppercase(),
        path,
        body_digest(body)
    )
}

fn compute_mac(
    secret: &SecretString,
    timestamp: &str,
    method: &str,
    path: &str,
    body: &[u8],
) -> Result<Vec<u8>, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|_| SignatureError::InvalidKey)?;
    mac.update(signing_base(timestamp, method, path, body).as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

#[derive(Clone)]
pub struct RequestSigner {
    secret: SecretString,
}

impl RequestSigner {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Sign with the current wall-clock time.
    pub fn sign(
        &self,
        method: &str,
        path: &str,
        body: &[u8],
    ) -> Result<SignedHeaders, SignatureError> {
        self.sign_at(chrono::Utc::now().timestamp(), method, path, body)
    }

    pub fn sign_at(
        &self,
        timestamp: i64,
        method: &str,
        path: &str,
        body: &[u8],
    ) -> Result<SignedHeaders, SignatureError> {
        let timestamp = timestamp.to_string();
        let mac = compute_mac(&self.secret, &timestamp, method, path, body)?;

        Ok(SignedHeaders {
            timestamp,
            signature: hex::encode(mac),
            request_id: Uuid::new_v4().to_string(),
        })
    }
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner").finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct RequestVerifier {
    secret: SecretString,
    window_seconds: i64,
}

impl RequestVerifier {
    pub fn new(secret: SecretString, window_seconds: i64) -> Self {
        Self {
            secret,
            window_seconds,
        }
    }

    pub fn window_seconds(&self) -> i64 {
        self.window_seconds
    }

    pub fn verify(
        &self,
        method: &str,
        path: &str,
        body: &[u8],
        timestamp: Option<&str>,
        signature: Option<&str>,
    ) -> Result<(), SignatureError> {
        self.verify_at(
            chrono::Utc::now().timestamp(),
            method,
            path,
            body,
            timestamp,
            signature,
        )
    }

    /// Verify against an explicit `now` (Unix seconds).
    pub fn verify_at(
        &self,
        now: i64,
        method: &str,
        path: &str,
        body: &[u8],
        timestamp: Option<&str>,
        signature: Option<&str>,
    ) -> Result<(), SignatureError> {
        let timestamp = timestamp.ok_or(SignatureError::MissingHeader(TIMESTAMP_HEADER))?;
        let signature = signature.ok_or(SignatureError::MissingHeader(SIGNATURE_HEADER))?;

        let issued_at: i64 = timestamp
            .parse()
            .map_err(|_| SignatureError::MalformedTimestamp)?;

        let skew = now.saturating_sub(issued_at);
        if skew.saturating_abs() > self.window_seconds {
            return Err(SignatureError::OutsideWindow { skew });
        }

        let expected = compute_mac(&self.secret, timestamp, method, path, body)?;
        let provided = hex::decode(signature.trim()).map_err(|_| SignatureError::Mismatch)?;

        if bool::from(expected.as_slice().ct_eq(provided.as_slice())) {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }
}

impl std::fmt::Debug for RequestVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestVerifier")
            .field("window_seconds", &self.window_seconds)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn secret() -> SecretString {
        SecretString::new("engine-secret".to_string())
    }

    fn pair() -> (RequestSigner, RequestVerifier) {
        (
            RequestSigner::new(secret()),
            RequestVerifier::new(secret(), DEFAULT_WINDOW_SECONDS),
        )
    }

    #[test]
    fn test_known_vector() {
        let (signer, _) = pair();
        let headers = signer
            .sign_at(NOW, "POST", "/v1/act", br#"{"job_id":"J-1"}"#)
            .unwrap();

        assert_eq!(headers.timestamp, "1700000000");
        assert_eq!(
            headers.signature,
            "7a5019574b5759737f9e605810e636553f2beffb11f21164fca098e7cbd412bb"
        );
    }

    #[test]
    fn test_empty_body_digest() {
        assert_eq!(
            body_digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_sign_and_verify_within_window() {
        let (signer, verifier) = pair();
        let body = br#"{"action":"sign","target":"DOC-42"}"#;
        let headers = signer.sign_at(NOW, "POST", "/v1/act", body).unwrap();

        let result = verifier.verify_at(
            NOW + 120,
            "POST",
            "/v1/act",
            body,
            Some(&headers.timestamp),
            Some(&headers.signature),
        );
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_method_is_case_insensitive() {
        let (signer, verifier) = pair();
        let headers = signer.sign_at(NOW, "post", "/v1/act", b"x").unwrap();

        assert!(verifier
            .verify_at(
                NOW,
                "POST",
                "/v1/act",
                b"x",
                Some(&headers.timestamp),
                Some(&headers.signature)
            )
            .is_ok());
    }

    #[test]
    fn test_timestamp_outside_window() {
        let (signer, verifier) = pair();
        let headers = signer.sign_at(NOW, "POST", "/v1/act", b"{}").unwrap();

        for now in [NOW + DEFAULT_WINDOW_SECONDS + 1, NOW - DEFAULT_WINDOW_SECONDS - 1] {
            let result = verifier.verify_at(
                now,
                "POST",
                "/v1/act",
                b"{}",
                Some(&headers.timestamp),
                Some(&headers.signature),
            );
            assert!(matches!(result, Err(SignatureError::OutsideWindow { .. })));
        }
    }

    #[test]
    fn test_window_boundary_is_inclusive() {
        let (signer, verifier) = pair();
        let headers = signer.sign_at(NOW, "GET", "/v1/x", b"").unwrap();

        assert!(verifier
            .verify_at(
                NOW + DEFAULT_WINDOW_SECONDS,
                "GET",
                "/v1/x",
                b"",
                Some(&headers.timestamp),
                Some(&headers.signature)
            )
            .is_ok());
    }

    #[test]
    fn test_tampered_body() {
        let (signer, verifier) = pair();
        let headers = signer
            .sign_at(NOW, "POST", "/v1/act", br#"{"foo":"bar"}"#)
            .unwrap();

        let result = verifier.verify_at(
            NOW,
            "POST",
            "/v1/act",
            br#"{"foo":"baz"}"#,
            Some(&headers.timestamp),
            Some(&headers.signature),
        );
        assert_eq!(result, Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_signature_bound_to_path() {
        let (signer, verifier) = pair();
        let headers = signer.sign_at(NOW, "POST", "/v1/act", b"{}").unwrap();

        let result = verifier.verify_at(
            NOW,
            "POST",
            "/v1/other",
            b"{}",
            Some(&headers.timestamp),
            Some(&headers.signature),
        );
        assert_eq!(result, Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_wrong_secret() {
        let signer = RequestSigner::new(SecretString::new("other".to_string()));
        let (_, verifier) = pair();
        let headers = signer.sign_at(NOW, "POST", "/v1/act", b"{}").unwrap();

        let result = verifier.verify_at(
            NOW,
            "POST",
            "/v1/act",
            b"{}",
            Some(&headers.timestamp),
            Some(&headers.signature),
        );
        assert_eq!(result, Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_missing_and_malformed_inputs() {
        let (_, verifier) = pair();

        assert_eq!(
            verifier.verify_at(NOW, "POST", "/", b"", None, Some("00")),
            Err(SignatureError::MissingHeader(TIMESTAMP_HEADER))
        );
        assert_eq!(
            verifier.verify_at(NOW, "POST", "/", b"", Some("1700000000"), None),
            Err(SignatureError::MissingHeader(SIGNATURE_HEADER))
        );
        assert_eq!(
            verifier.verify_at(NOW, "POST", "/", b"", Some("yesterday"), Some("00")),
            Err(SignatureError::MalformedTimestamp)
        );
        assert_eq!(
            verifier.verify_at(NOW, "POST", "/", b"", Some("1700000000"), Some("not-hex")),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_request_ids_are_fresh() {
        let (signer, _) = pair();
        let a = signer.sign_at(NOW, "POST", "/", b"").unwrap();
        let b = signer.sign_at(NOW, "POST", "/", b"").unwrap();

        assert_eq!(a.signature, b.signature);
        assert_ne!(a.request_id, b.request_id);
    }
}
