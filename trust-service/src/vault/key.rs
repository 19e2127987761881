use super::VaultError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// AES-256 key length in bytes.
pub const MASTER_KEY_LEN: usize = 32;

/// Process-wide vault key. Never persisted next to ciphertexts.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    bytes: [u8; MASTER_KEY_LEN],
}

impl MasterKey {
    pub fn from_bytes(bytes: [u8; MASTER_KEY_LEN]) -> Self {
        Self { bytes }
    }

    pub fn try_from_slice(slice: &[u8]) -> Result<Self, VaultError> {
        if slice.len() != MASTER_KEY_LEN {
            return Err(VaultError::Configuration(format!(
                "master key must be {} bytes, got {}",
                MASTER_KEY_LEN,
                slice.len()
            )));
        }
        let mut bytes = [0u8; MASTER_KEY_LEN];
        bytes.copy_from_slice(slice);
        Ok(Self { bytes })
    }

    /// Parse key material from configuration: 64 hex characters, or standard
    /// base64 of exactly 32 bytes.
    pub fn parse(encoded: &str) -> Result<Self, VaultError> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Err(VaultError::Configuration("master key is empty".to_string()));
        }

        if let Ok(decoded) = hex::decode(encoded) {
            let decoded = Zeroizing::new(decoded);
            return Self::try_from_slice(&decoded);
        }

        let decoded = STANDARD.decode(encoded).map_err(|_| {
            VaultError::Configuration("master key is neither hex nor base64".to_string())
        })?;
        let decoded = Zeroizing::new(decoded);
        Self::try_from_slice(&decoded)
    }

    /// Fresh random key, for bootstrapping a deployment.
    pub fn generate() -> Self {
        let mut bytes = [0u8; MASTER_KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Hex form suitable for `VAULT_MASTER_KEY`.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.bytes))
    }

    pub(crate) fn as_bytes(&self) -> &[u8; MASTER_KEY_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_and_base64() {
        let key = MasterKey::generate();
        let hex_form = key.to_hex();
        let b64_form = STANDARD.encode(key.as_bytes());

        assert_eq!(MasterKey::parse(&hex_form).unwrap().as_bytes(), key.as_bytes());
        assert_eq!(MasterKey::parse(&b64_form).unwrap().as_bytes(), key.as_bytes());
    }

    #[test]
    fn rejects_wrong_lengths() {
        assert!(matches!(
            MasterKey::parse(&"ab".repeat(31)),
            Err(VaultError::Configuration(_))
        ));
        assert!(matches!(
            MasterKey::parse(&"ab".repeat(33)),
            Err(VaultError::Configuration(_))
        ));
        assert!(matches!(MasterKey::parse("  "), Err(VaultError::Configuration(_))));
        assert!(matches!(
            MasterKey::parse("not a key at all!"),
            Err(VaultError::Configuration(_))
        ));
    }

    #[test]
    fn debug_is_redacted() {
        let key = MasterKey::from_bytes([7u8; MASTER_KEY_LEN]);
        let rendered = format!("{:?}", key);
        assert!(!rendered.contains("07"));
        assert!(!rendered.contains('7'));
    }

    #[test]
    fn generated_keys_differ() {
        assert_ne!(MasterKey::generate().as_bytes(), MasterKey::generate().as_bytes());
    }
}
