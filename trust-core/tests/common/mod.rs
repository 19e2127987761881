#![allow(dead_code)]

use axum::{middleware::from_fn_with_state, routing::post, Router};
use secrecy::SecretString;
use trust_core::middleware::signature::{signature_validation_middleware, SignatureConfig};
use trust_core::utils::signature::{RequestSigner, RequestVerifier, DEFAULT_WINDOW_SECONDS};

pub const TEST_SECRET: &str = "inter-service-test-secret";

#[derive(Clone)]
pub struct TestState {
    pub signature: SignatureConfig,
}

impl AsRef<SignatureConfig> for TestState {
    fn as_ref(&self) -> &SignatureConfig {
        &self.signature
    }
}

pub fn signer() -> RequestSigner {
    RequestSigner::new(SecretString::new(TEST_SECRET.to_string()))
}

pub fn signature_config() -> SignatureConfig {
    SignatureConfig::new(RequestVerifier::new(
        SecretString::new(TEST_SECRET.to_string()),
        DEFAULT_WINDOW_SECONDS,
    ))
    .with_excluded_paths(["/health"])
}

/// Router whose `/v1/act` echoes the body it received after verification.
pub fn protected_app(signature: SignatureConfig) -> Router {
    let state = TestState { signature };
    Router::new()
        .route("/v1/act", post(|body: String| async move { body }))
        .route("/health", post(|| async { "ok" }))
        .layer(from_fn_with_state(
            state.clone(),
            signature_validation_middleware::<TestState>,
        ))
        .with_state(state)
}
