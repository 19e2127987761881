//! Credential sealing on behalf of a subject.
//!
//! Sealing a new credential spends an `update_credential` step-up grant for
//! the credential's target. Opening is audited, and a stored secret that
//! fails authentication is recorded as an integrity failure.

use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::sync::Arc;
use trust_core::error::AppError;

use super::audit::{record_event, AuditSink};
use super::step_up::StepUpAuthorizer;
use crate::models::{AuditAction, AuditEvent, AuditStatus, SensitiveAction};
use crate::vault::{SecretCipher, StoredSecret, VaultError};

#[derive(Clone)]
pub struct VaultService {
    cipher: SecretCipher,
    step_up: StepUpAuthorizer,
    audit: Arc<dyn AuditSink>,
}

impl VaultService {
    pub fn new(cipher: SecretCipher, step_up: StepUpAuthorizer, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            cipher,
            step_up,
            audit,
        }
    }

    /// Encrypt `secret` for `target_id`, consuming the subject's
    /// `update_credential` grant. Without a live grant nothing is encrypted.
    #[tracing::instrument(skip(self, secret))]
    pub async fn seal(
        &self,
        subject_id: &str,
        target_id: &str,
        secret: &SecretString,
    ) -> Result<StoredSecret, AppError> {
        let consumed = self
            .step_up
            .consume_grant(subject_id, SensitiveAction::UpdateCredential, target_id)
            .await?;

        if !consumed {
            self.audit_event(
                subject_id,
                target_id,
                AuditAction::SecretSealed,
                AuditStatus::Denied,
                None,
            )
            .await;
            return Err(AppError::AuthError(anyhow::anyhow!(
                "No update_credential grant for {}",
                target_id
            )));
        }

        let stored = self
            .cipher
            .encrypt(secret.expose_secret().as_bytes())?
            .to_stored();

        self.audit_event(
            subject_id,
            target_id,
            AuditAction::SecretSealed,
            AuditStatus::Success,
            None,
        )
        .await;
        tracing::info!(subject_id = %subject_id, target_id = %target_id, "Credential sealed");

        Ok(stored)
    }

    /// Decrypt a stored credential. Tampered, truncated or foreign-key
    /// secrets are audited and surface as a generic denial.
    #[tracing::instrument(skip(self, stored))]
    pub async fn open(
        &self,
        subject_id: &str,
        target_id: &str,
        stored: &StoredSecret,
    ) -> Result<SecretString, AppError> {
        let opened = stored
            .decode()
            .and_then(|secret| self.cipher.decrypt_string(&secret));

        match opened {
            Ok(secret) => {
                self.audit_event(
                    subject_id,
                    target_id,
                    AuditAction::SecretOpened,
                    AuditStatus::Success,
                    None,
                )
                .await;
                Ok(secret)
            }
            Err(err @ (VaultError::Integrity | VaultError::Incomplete(_))) => {
                tracing::warn!(
                    subject_id = %subject_id,
                    target_id = %target_id,
                    "Stored credential failed integrity check"
                );
                self.audit_event(
                    subject_id,
                    target_id,
                    AuditAction::IntegrityFailure,
                    AuditStatus::Failure,
                    Some(err.to_string()),
                )
                .await;
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn audit_event(
        &self,
        subject_id: &str,
        target_id: &str,
        action: AuditAction,
        status: AuditStatus,
        reason: Option<String>,
    ) {
        let mut event =
            AuditEvent::new(Some(subject_id), action, status).with_target("credential", target_id);
        if let Some(reason) = reason {
            event = event.with_metadata(json!({ "reason": reason }));
        }
        record_event(self.audit.as_ref(), event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        InMemoryCredentialDirectory, InMemoryStore, MemoryAuditSink, StepUpPolicy,
    };
    use crate::utils::Password;
    use crate::vault::MasterKey;

    struct Fixture {
        vault: VaultService,
        step_up: StepUpAuthorizer,
        audit: Arc<MemoryAuditSink>,
    }

    fn fixture() -> Fixture {
        let credentials = Arc::new(InMemoryCredentialDirectory::new());
        credentials
            .set_password("U", &Password::new("hunter22".to_string()))
            .unwrap();
        let audit = Arc::new(MemoryAuditSink::new());
        let step_up = StepUpAuthorizer::new(
            Arc::new(InMemoryStore::new()),
            credentials,
            audit.clone(),
            StepUpPolicy::default(),
        );
        let vault = VaultService::new(
            SecretCipher::new(&MasterKey::generate()),
            step_up.clone(),
            audit.clone(),
        );
        Fixture {
            vault,
            step_up,
            audit,
        }
    }

    fn actions(audit: &MemoryAuditSink) -> Vec<(AuditAction, AuditStatus)> {
        audit
            .events()
            .into_iter()
            .map(|event| (event.action, event.status))
            .collect()
    }

    #[tokio::test]
    async fn test_seal_requires_update_credential_grant() {
        let f = fixture();
        let secret = SecretString::new("erp-password".to_string());

        let err = f.vault.seal("U", "ERP-1", &secret).await.unwrap_err();
        assert!(matches!(err, AppError::AuthError(_)));
        assert_eq!(
            actions(&f.audit).last(),
            Some(&(AuditAction::SecretSealed, AuditStatus::Denied))
        );
    }

    #[tokio::test]
    async fn test_seal_spends_grant_and_opens_back() {
        let f = fixture();
        f.step_up
            .request_grant(
                "U",
                &Password::new("hunter22".to_string()),
                SensitiveAction::UpdateCredential,
                "ERP-1",
                None,
            )
            .await
            .unwrap();

        let secret = SecretString::new("erp-password".to_string());
        let stored = f.vault.seal("U", "ERP-1", &secret).await.unwrap();
        let opened = f.vault.open("U", "ERP-1", &stored).await.unwrap();
        assert_eq!(opened.expose_secret(), "erp-password");

        // single use
        assert!(f.vault.seal("U", "ERP-1", &secret).await.is_err());
    }

    #[tokio::test]
    async fn test_grant_for_other_target_does_not_unlock_seal() {
        let f = fixture();
        f.step_up
            .request_grant(
                "U",
                &Password::new("hunter22".to_string()),
                SensitiveAction::UpdateCredential,
                "ERP-1",
                None,
            )
            .await
            .unwrap();

        let secret = SecretString::new("erp-password".to_string());
        assert!(f.vault.seal("U", "ERP-2", &secret).await.is_err());
    }

    #[tokio::test]
    async fn test_tampered_secret_is_audited_as_integrity_failure() {
        let f = fixture();
        let cipher = SecretCipher::new(&MasterKey::generate());
        let foreign = cipher.encrypt(b"sealed elsewhere").unwrap().to_stored();

        let err = f.vault.open("U", "ERP-1", &foreign).await.unwrap_err();
        assert!(matches!(err, AppError::IntegrityError(_)));

        let events = f.audit.events();
        let last = events.last().unwrap();
        assert_eq!(last.action, AuditAction::IntegrityFailure);
        assert_eq!(last.status, AuditStatus::Failure);
        assert_eq!(last.target_id.as_deref(), Some("ERP-1"));
    }

    #[tokio::test]
    async fn test_malformed_fields_are_integrity_failures() {
        let f = fixture();
        let stored = StoredSecret {
            ciphertext: "AAAA".to_string(),
            nonce: "not base64!".to_string(),
            auth_tag: "AAAA".to_string(),
        };

        assert!(f.vault.open("U", "ERP-1", &stored).await.is_err());
        assert_eq!(
            actions(&f.audit),
            vec![(AuditAction::IntegrityFailure, AuditStatus::Failure)]
        );
    }
}
