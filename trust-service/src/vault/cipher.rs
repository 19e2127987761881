use super::{EncryptedSecret, MasterKey, StoredSecret, VaultError, NONCE_LEN, TAG_LEN};
use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Key, Nonce, Tag,
};
use rand::{rngs::OsRng, RngCore};
use secrecy::SecretString;
use zeroize::Zeroizing;

/// AES-256-GCM cipher bound to one master key.
///
/// Rotation never mutates an existing instance: build a second cipher for the
/// new key and use [`SecretCipher::reencrypt_from`] or [`rotate_key`].
#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl SecretCipher {
    pub fn new(key: &MasterKey) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
        Self { cipher }
    }

    /// Build from configured key material. A missing or malformed key is a
    /// configuration error.
    pub fn from_config(encoded: Option<&str>) -> Result<Self, VaultError> {
        let encoded = encoded
            .ok_or_else(|| VaultError::Configuration("master key is not configured".to_string()))?;
        Ok(Self::new(&MasterKey::parse(encoded)?))
    }

    /// Encrypt under a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedSecret, VaultError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let mut buffer = plaintext.to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(Nonce::from_slice(&nonce), b"", &mut buffer)
            .map_err(|_| VaultError::Encryption)?;

        let mut tag_bytes = [0u8; TAG_LEN];
        tag_bytes.copy_from_slice(&tag);

        Ok(EncryptedSecret::new(buffer, nonce, tag_bytes))
    }

    /// Decrypt and authenticate. The returned buffer is wiped on drop.
    pub fn decrypt(&self, secret: &EncryptedSecret) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        let mut buffer = Zeroizing::new(secret.ciphertext.clone());
        self.cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(&secret.nonce),
                b"",
                &mut *buffer,
                Tag::from_slice(&secret.tag),
            )
            .map_err(|_| VaultError::Integrity)?;
        Ok(buffer)
    }

    /// Decrypt a UTF-8 credential such as an external-system password.
    pub fn decrypt_string(&self, secret: &EncryptedSecret) -> Result<SecretString, VaultError> {
        let bytes = self.decrypt(secret)?;
        let text = std::str::from_utf8(&bytes).map_err(|_| VaultError::Integrity)?;
        Ok(SecretString::new(text.to_owned()))
    }

    /// Re-encrypt a secret currently sealed under `old`. The plaintext only
    /// lives in a zeroizing buffer for the duration of the call.
    pub fn reencrypt_from(
        &self,
        old: &SecretCipher,
        secret: &EncryptedSecret,
    ) -> Result<EncryptedSecret, VaultError> {
        let plaintext = old.decrypt(secret)?;
        self.encrypt(&plaintext)
    }

    /// [`SecretCipher::reencrypt_from`] over the base64 column form.
    pub fn reencrypt_stored(
        &self,
        old: &SecretCipher,
        stored: &StoredSecret,
    ) -> Result<StoredSecret, VaultError> {
        Ok(self.reencrypt_from(old, &stored.decode()?)?.to_stored())
    }
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}

pub fn rotate_key(
    secret: &EncryptedSecret,
    old_key: &MasterKey,
    new_key: &MasterKey,
) -> Result<EncryptedSecret, VaultError> {
    SecretCipher::new(new_key).reencrypt_from(&SecretCipher::new(old_key), secret)
}
