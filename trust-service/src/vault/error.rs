use thiserror::Error;
use trust_core::error::AppError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VaultError {
    /// Key material is missing or malformed. Fatal at startup.
    #[error("Vault configuration error: {0}")]
    Configuration(String),

    /// Authentication tag mismatch, wrong key, or undecodable fields.
    #[error("Secret failed integrity check")]
    Integrity,

    #[error("Encryption failed")]
    Encryption,

    /// Some but not all of ciphertext, nonce and tag are present.
    #[error("Stored secret is incomplete: {0}")]
    Incomplete(&'static str),
}

impl From<VaultError> for AppError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::Configuration(msg) => AppError::ConfigError(anyhow::anyhow!(msg)),
            VaultError::Integrity | VaultError::Incomplete(_) => {
                AppError::IntegrityError(anyhow::anyhow!(err))
            }
            VaultError::Encryption => AppError::InternalError(anyhow::anyhow!(err)),
        }
    }
}
