use secrecy::{ExposeSecret, SecretString};
use std::str::FromStr;
use std::time::Duration;
use trust_core::config::{self as core_config, get_env, parse_env};
use trust_core::error::AppError;

use crate::services::StepUpPolicy;
use crate::vault::{MasterKey, SecretCipher};

pub const MAX_WINDOW_SECONDS: i64 = 3600;
pub const MAX_GRANT_TTL_SECONDS: u64 = 3600;
pub const MAX_ATTEMPTS: u32 = 100;
pub const MAX_LOCKOUT_MINUTES: u64 = 24 * 60;
pub const MAX_STORE_TIMEOUT_MS: u64 = 60_000;

fn check_range<T>(name: &str, value: T, min: T, max: T) -> Result<(), AppError>
where
    T: PartialOrd + std::fmt::Display,
{
    if value < min || value > max {
        return Err(AppError::ConfigError(anyhow::anyhow!(
            "{} must be between {} and {}, got {}",
            name,
            min,
            max,
            value
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct TrustConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub vault: VaultConfig,
    pub signing: SigningConfig,
    pub step_up: StepUpConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Prod),
            other => Err(format!("Invalid ENVIRONMENT '{}': expected dev or prod", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub master_key: SecretString,
    pub previous_master_key: Option<SecretString>,
}

#[derive(Debug, Clone)]
pub struct SigningConfig {
    pub shared_secret: SecretString,
    pub window_seconds: i64,
    pub require_signatures: bool,
}

#[derive(Debug, Clone)]
pub struct StepUpConfig {
    pub grant_ttl_seconds: u64,
    pub max_attempts: u32,
    pub lockout_minutes: u64,
    pub strict_ip_binding: bool,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Unset outside production selects the in-process store.
    pub redis_url: Option<String>,
    pub timeout_ms: u64,
    pub audit_stream_key: String,
}

impl TrustConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        Self::from_lookup(common, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(common: core_config::Config, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment: Environment = lookup("ENVIRONMENT")
            .unwrap_or_else(|| "dev".to_string())
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let redis_url = if is_prod {
            Some(get_env(&lookup, "REDIS_URL", None, true)?)
        } else {
            optional("REDIS_URL")
        };

        let config = TrustConfig {
            common,
            environment,
            service_name: get_env(&lookup, "SERVICE_NAME", Some("trust-service"), is_prod)?,
            log_level: get_env(&lookup, "LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: optional("OTLP_ENDPOINT"),
            vault: VaultConfig {
                master_key: SecretString::new(get_env(&lookup, "VAULT_MASTER_KEY", None, is_prod)?),
                previous_master_key: optional("VAULT_PREVIOUS_MASTER_KEY").map(SecretString::new),
            },
            signing: SigningConfig {
                shared_secret: SecretString::new(get_env(
                    &lookup,
                    "HMAC_SHARED_SECRET",
                    None,
                    is_prod,
                )?),
                window_seconds: parse_env(&lookup, "HMAC_WINDOW_SECONDS", "300", is_prod)?,
                require_signatures: parse_env(&lookup, "REQUIRE_SIGNATURES", "true", is_prod)?,
            },
            step_up: StepUpConfig {
                grant_ttl_seconds: parse_env(&lookup, "STEP_UP_GRANT_TTL_SECONDS", "90", is_prod)?,
                max_attempts: parse_env(&lookup, "STEP_UP_MAX_ATTEMPTS", "5", is_prod)?,
                lockout_minutes: parse_env(&lookup, "STEP_UP_LOCKOUT_MINUTES", "15", is_prod)?,
                strict_ip_binding: parse_env(
                    &lookup,
                    "STEP_UP_STRICT_IP_BINDING",
                    "false",
                    is_prod,
                )?,
            },
            store: StoreConfig {
                redis_url,
                timeout_ms: parse_env(&lookup, "STORE_TIMEOUT_MS", "500", is_prod)?,
                audit_stream_key: get_env(&lookup, "AUDIT_STREAM_KEY", Some("audit:events"), is_prod)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.signing.shared_secret.expose_secret().len() < 16 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "HMAC_SHARED_SECRET must be at least 16 bytes"
            )));
        }
        check_range(
            "HMAC_WINDOW_SECONDS",
            self.signing.window_seconds,
            1,
            MAX_WINDOW_SECONDS,
        )?;
        check_range(
            "STEP_UP_GRANT_TTL_SECONDS",
            self.step_up.grant_ttl_seconds,
            1,
            MAX_GRANT_TTL_SECONDS,
        )?;
        check_range(
            "STEP_UP_MAX_ATTEMPTS",
            self.step_up.max_attempts,
            1,
            MAX_ATTEMPTS,
        )?;
        check_range(
            "STEP_UP_LOCKOUT_MINUTES",
            self.step_up.lockout_minutes,
            1,
            MAX_LOCKOUT_MINUTES,
        )?;
        check_range("STORE_TIMEOUT_MS", self.store.timeout_ms, 1, MAX_STORE_TIMEOUT_MS)?;

        self.cipher()?;
        self.previous_cipher()?;
        Ok(())
    }

    /// Cipher for the active master key.
    pub fn cipher(&self) -> Result<SecretCipher, AppError> {
        SecretCipher::from_config(Some(self.vault.master_key.expose_secret()))
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("VAULT_MASTER_KEY: {}", e)))
    }

    /// Cipher for the key being rotated away from, when one is configured.
    pub fn previous_cipher(&self) -> Result<Option<SecretCipher>, AppError> {
        self.vault
            .previous_master_key
            .as_ref()
            .map(|key| {
                MasterKey::parse(key.expose_secret())
                    .map(|key| SecretCipher::new(&key))
                    .map_err(|e| {
                        AppError::ConfigError(anyhow::anyhow!("VAULT_PREVIOUS_MASTER_KEY: {}", e))
                    })
            })
            .transpose()
    }

    pub fn step_up_policy(&self) -> StepUpPolicy {
        StepUpPolicy {
            grant_ttl_seconds: self.step_up.grant_ttl_seconds,
            max_attempts: self.step_up.max_attempts,
            lockout_seconds: self.step_up.lockout_minutes.saturating_mul(60),
            strict_ip_binding: self.step_up.strict_ip_binding,
            store_timeout: Duration::from_millis(self.store.timeout_ms),
        }
    }
}
