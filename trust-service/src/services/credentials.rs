use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use super::store::EphemeralStore;
use crate::utils::{hash_password, Password, PasswordHashString};

/// Looks up the current password hash for a subject.
#[async_trait]
pub trait CredentialDirectory: Send + Sync {
    async fn password_hash(
        &self,
        subject_id: &str,
    ) -> Result<Option<PasswordHashString>, anyhow::Error>;
}

pub fn credential_key(subject_id: &str) -> String {
    format!("credentials:{}", urlencoding::encode(subject_id))
}

/// Reads hashes the host application publishes under `credentials:{subject}`.
#[derive(Clone)]
pub struct StoreCredentialDirectory {
    store: Arc<dyn EphemeralStore>,
}

impl StoreCredentialDirectory {
    pub fn new(store: Arc<dyn EphemeralStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CredentialDirectory for StoreCredentialDirectory {
    async fn password_hash(
        &self,
        subject_id: &str,
    ) -> Result<Option<PasswordHashString>, anyhow::Error> {
        Ok(self
            .store
            .get(&credential_key(subject_id))
            .await?
            .map(PasswordHashString::new))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCredentialDirectory {
    hashes: DashMap<String, PasswordHashString>,
}

impl InMemoryCredentialDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_hash(&self, subject_id: impl Into<String>, hash: PasswordHashString) {
        self.hashes.insert(subject_id.into(), hash);
    }

    pub fn set_password(
        &self,
        subject_id: impl Into<String>,
        password: &Password,
    ) -> Result<(), anyhow::Error> {
        let hash = hash_password(password)?;
        self.insert_hash(subject_id, hash);
        Ok(())
    }
}

#[async_trait]
impl CredentialDirectory for InMemoryCredentialDirectory {
    async fn password_hash(
        &self,
        subject_id: &str,
    ) -> Result<Option<PasswordHashString>, anyhow::Error> {
        Ok(self.hashes.get(subject_id).map(|h| h.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryStore;

    #[tokio::test]
    async fn test_store_directory_reads_published_hash() {
        let store = Arc::new(InMemoryStore::new());
        store
            .set_with_expiry(&credential_key("user:7"), "$argon2id$stub", 60)
            .await
            .unwrap();

        let directory = StoreCredentialDirectory::new(store);

        assert_eq!(
            directory.password_hash("user:7").await.unwrap(),
            Some(PasswordHashString::new("$argon2id$stub".to_string()))
        );
        assert_eq!(directory.password_hash("user:8").await.unwrap(), None);
    }

    #[test]
    fn test_credential_key_escapes_subject() {
        assert_eq!(credential_key("a:b"), "credentials:a%3Ab");
    }
}
