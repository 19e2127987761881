#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use secrecy::SecretString;
use std::sync::Arc;
use trust_core::config::Config;
use trust_core::middleware::SignatureConfig;
use trust_core::utils::signature::{RequestSigner, RequestVerifier, DEFAULT_WINDOW_SECONDS};
use trust_service::config::TrustConfig;
use trust_service::services::{
    AuditRejectionObserver, InMemoryCredentialDirectory, InMemoryStore, ManualClock,
    MemoryAuditSink, StepUpAuthorizer, StepUpPolicy, VaultService,
};
use trust_service::utils::Password;
use trust_service::vault::{MasterKey, SecretCipher};
use trust_service::{AppState, UNSIGNED_PATHS};

pub const SUBJECT: &str = "U";
pub const PASSWORD: &str = "correct horse battery staple";
pub const WRONG_PASSWORD: &str = "Tr0ub4dor&3";
pub const SIGNING_SECRET: &str = "inter-service-test-secret";
pub const MASTER_KEY_HEX: &str =
    "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

pub struct Harness {
    pub authorizer: StepUpAuthorizer,
    pub store: Arc<InMemoryStore>,
    pub credentials: Arc<InMemoryCredentialDirectory>,
    pub audit: Arc<MemoryAuditSink>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn clock_start(&self) -> DateTime<Utc> {
        start_time()
    }
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn password(value: &str) -> Password {
    Password::new(value.to_string())
}

pub fn harness() -> Harness {
    harness_with(StepUpPolicy::default())
}

pub fn harness_with(policy: StepUpPolicy) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let credentials = Arc::new(InMemoryCredentialDirectory::new());
    credentials
        .set_password(SUBJECT, &password(PASSWORD))
        .expect("hash test password");
    let audit = Arc::new(MemoryAuditSink::new());
    let clock = Arc::new(ManualClock::new(start_time()));

    let authorizer = StepUpAuthorizer::new(
        store.clone(),
        credentials.clone(),
        audit.clone(),
        policy,
    )
    .with_clock(clock.clone());

    Harness {
        authorizer,
        store,
        credentials,
        audit,
        clock,
    }
}

pub fn signer() -> RequestSigner {
    RequestSigner::new(SecretString::new(SIGNING_SECRET.to_string()))
}

fn test_config() -> TrustConfig {
    let vars = [
        ("VAULT_MASTER_KEY", MASTER_KEY_HEX),
        ("HMAC_SHARED_SECRET", SIGNING_SECRET),
    ];
    TrustConfig::from_lookup(Config { port: 0 }, move |key| {
        vars.iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
    })
    .expect("test configuration")
}

pub fn app_state(harness: &Harness) -> AppState {
    let signature = SignatureConfig::new(RequestVerifier::new(
        SecretString::new(SIGNING_SECRET.to_string()),
        DEFAULT_WINDOW_SECONDS,
    ))
    .with_excluded_paths(UNSIGNED_PATHS)
    .with_observer(Arc::new(AuditRejectionObserver::new(harness.audit.clone())));

    AppState {
        config: Arc::new(test_config()),
        step_up: harness.authorizer.clone(),
        store: harness.store.clone(),
        vault: VaultService::new(
            SecretCipher::new(&MasterKey::generate()),
            harness.authorizer.clone(),
            harness.audit.clone(),
        ),
        signature: Arc::new(signature),
    }
}
