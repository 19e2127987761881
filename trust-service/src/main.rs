use clap::Parser;
use std::io::{BufRead, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use trust_core::middleware::SignatureConfig;
use trust_core::observability::init_tracing;
use trust_core::utils::RequestVerifier;
use trust_service::cli::{Cli, Command};
use trust_service::config::TrustConfig;
use trust_service::services::{
    audit::DEFAULT_AUDIT_MAX_LEN, init_metrics, AuditRejectionObserver, AuditSink,
    EphemeralStore, InMemoryStore, RedisAuditSink, RedisStore, StepUpAuthorizer,
    StoreCredentialDirectory, TracingAuditSink, VaultService,
};
use trust_service::vault::{MasterKey, StoredSecret};
use trust_service::{build_router, AppState, UNSIGNED_PATHS};

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

/// Re-encrypt JSON-lines `StoredSecret`s from stdin under the active key.
fn rotate_secrets(config: &TrustConfig) -> std::io::Result<()> {
    let new = config
        .cipher()
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    let old = config
        .previous_cipher()
        .map_err(|e| std::io::Error::other(e.to_string()))?
        .ok_or_else(|| std::io::Error::other("VAULT_PREVIOUS_MASTER_KEY is not set"))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for (index, line) in std::io::stdin().lock().lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let stored: StoredSecret = serde_json::from_str(&line)
            .map_err(|e| std::io::Error::other(format!("line {}: {}", index + 1, e)))?;
        let rotated = new
            .reencrypt_stored(&old, &stored)
            .map_err(|e| std::io::Error::other(format!("line {}: {}", index + 1, e)))?;
        let encoded = serde_json::to_string(&rotated).map_err(std::io::Error::other)?;
        writeln!(out, "{}", encoded)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    let command = Cli::parse().command();
    if command == Command::GenerateKey {
        println!("{}", MasterKey::generate().to_hex().as_str());
        return Ok(());
    }

    let config = TrustConfig::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    if command == Command::RotateSecrets {
        return rotate_secrets(&config);
    }

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )
    .map_err(|e| std::io::Error::other(format!("Tracing initialization error: {}", e)))?;

    init_metrics().map_err(|e| {
        tracing::error!("Failed to initialize metrics: {}", e);
        std::io::Error::other(format!("Metrics initialization error: {}", e))
    })?;

    let cipher = config.cipher().map_err(|e| {
        tracing::error!("Vault is not usable: {}", e);
        std::io::Error::other(format!("Vault configuration error: {}", e))
    })?;
    if config.vault.previous_master_key.is_some() {
        tracing::info!("Previous master key configured; secrets can be re-encrypted");
    }

    let (store, audit): (Arc<dyn EphemeralStore>, Arc<dyn AuditSink>) =
        match config.store.redis_url.as_deref() {
            Some(url) => {
                let redis = RedisStore::connect(url).await.map_err(|e| {
                    tracing::error!("Failed to connect to Redis: {}", e);
                    std::io::Error::other(format!("Redis connection error: {}", e))
                })?;
                let audit = RedisAuditSink::spawn(
                    redis.connection(),
                    config.store.audit_stream_key.clone(),
                    DEFAULT_AUDIT_MAX_LEN,
                );
                let store: Arc<dyn EphemeralStore> = Arc::new(redis);
                let audit: Arc<dyn AuditSink> = Arc::new(audit);
                (store, audit)
            }
            None => {
                tracing::warn!(
                    "REDIS_URL not set; using in-process store, grants are not shared between instances"
                );
                let store: Arc<dyn EphemeralStore> = Arc::new(InMemoryStore::new());
                let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
                (store, audit)
            }
        };

    let credentials = Arc::new(StoreCredentialDirectory::new(store.clone()));
    let step_up = StepUpAuthorizer::new(
        store.clone(),
        credentials,
        audit.clone(),
        config.step_up_policy(),
    );
    let vault = VaultService::new(cipher, step_up.clone(), audit.clone());

    let verifier = RequestVerifier::new(
        config.signing.shared_secret.clone(),
        config.signing.window_seconds,
    );
    let mut signature = SignatureConfig::new(verifier)
        .with_excluded_paths(UNSIGNED_PATHS)
        .with_observer(Arc::new(AuditRejectionObserver::new(audit)));
    signature.require_signatures = config.signing.require_signatures;
    if !signature.require_signatures {
        tracing::warn!("REQUIRE_SIGNATURES is disabled; unsigned requests will be accepted");
    }

    let port = config.common.port;
    let state = AppState {
        config: Arc::new(config),
        step_up,
        store,
        vault,
        signature: Arc::new(signature),
    };

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        tracing::error!("Failed to bind to {}: {}", addr, e);
        e
    })?;
    tracing::info!("trust-service listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
}
