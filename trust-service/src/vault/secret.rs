use super::VaultError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// One long-lived secret at rest: AES-256-GCM ciphertext with its nonce and
/// detached authentication tag.
///
/// The type only exists fully populated, so a partially stored secret cannot
/// be represented. Owners that may have no secret hold `Option<EncryptedSecret>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedSecret {
    pub(crate) ciphertext: Vec<u8>,
    pub(crate) nonce: [u8; NONCE_LEN],
    pub(crate) tag: [u8; TAG_LEN],
}

impl EncryptedSecret {
    pub fn new(ciphertext: Vec<u8>, nonce: [u8; NONCE_LEN], tag: [u8; TAG_LEN]) -> Self {
        Self {
            ciphertext,
            nonce,
            tag,
        }
    }

    /// Build from raw column bytes, validating nonce and tag lengths.
    pub fn from_parts(ciphertext: &[u8], nonce: &[u8], tag: &[u8]) -> Result<Self, VaultError> {
        let nonce: [u8; NONCE_LEN] = nonce.try_into().map_err(|_| VaultError::Integrity)?;
        let tag: [u8; TAG_LEN] = tag.try_into().map_err(|_| VaultError::Integrity)?;
        Ok(Self::new(ciphertext.to_vec(), nonce, tag))
    }

    /// Load from three nullable byte columns. All absent means no secret;
    /// a mix of present and absent columns is rejected.
    pub fn from_columns(
        ciphertext: Option<&[u8]>,
        nonce: Option<&[u8]>,
        tag: Option<&[u8]>,
    ) -> Result<Option<Self>, VaultError> {
        match (ciphertext, nonce, tag) {
            (Some(c), Some(n), Some(t)) => Self::from_parts(c, n, t).map(Some),
            (None, None, None) => Ok(None),
            (None, _, _) => Err(VaultError::Incomplete("ciphertext")),
            (_, None, _) => Err(VaultError::Incomplete("nonce")),
            (_, _, None) => Err(VaultError::Incomplete("auth_tag")),
        }
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    pub fn tag(&self) -> &[u8; TAG_LEN] {
        &self.tag
    }

    pub fn to_stored(&self) -> StoredSecret {
        StoredSecret {
            ciphertext: STANDARD.encode(&self.ciphertext),
            nonce: STANDARD.encode(self.nonce),
            auth_tag: STANDARD.encode(self.tag),
        }
    }
}

/// Textual form of an [`EncryptedSecret`]: each field standard base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSecret {
    pub ciphertext: String,
    pub nonce: String,
    pub auth_tag: String,
}

impl StoredSecret {
    /// Decode the three fields. Any undecodable field or wrong length is an
    /// integrity failure, indistinguishable from a bad tag.
    pub fn decode(&self) -> Result<EncryptedSecret, VaultError> {
        let ciphertext = STANDARD
            .decode(&self.ciphertext)
            .map_err(|_| VaultError::Integrity)?;
        let nonce = STANDARD
            .decode(&self.nonce)
            .map_err(|_| VaultError::Integrity)?;
        let tag = STANDARD
            .decode(&self.auth_tag)
            .map_err(|_| VaultError::Integrity)?;
        EncryptedSecret::from_parts(&ciphertext, &nonce, &tag)
    }

    /// Textual variant of [`EncryptedSecret::from_columns`].
    pub fn from_columns(
        ciphertext: Option<String>,
        nonce: Option<String>,
        auth_tag: Option<String>,
    ) -> Result<Option<Self>, VaultError> {
        match (ciphertext, nonce, auth_tag) {
            (Some(ciphertext), Some(nonce), Some(auth_tag)) => Ok(Some(Self {
                ciphertext,
                nonce,
                auth_tag,
            })),
            (None, None, None) => Ok(None),
            (None, _, _) => Err(VaultError::Incomplete("ciphertext")),
            (_, None, _) => Err(VaultError::Incomplete("nonce")),
            (_, _, None) => Err(VaultError::Incomplete("auth_tag")),
        }
    }
}

impl From<&EncryptedSecret> for StoredSecret {
    fn from(secret: &EncryptedSecret) -> Self {
        secret.to_stored()
    }
}

impl TryFrom<&StoredSecret> for EncryptedSecret {
    type Error = VaultError;

    fn try_from(stored: &StoredSecret) -> Result<Self, Self::Error> {
        stored.decode()
    }
}

/// Mask a secret for display, keeping `show` characters at each end.
///
/// Short values are fully masked.
pub fn mask_secret(value: &str, show: usize) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.is_empty() {
        return "****".to_string();
    }
    if chars.len() <= show * 2 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..show].iter().collect();
    let tail: String = chars[chars.len() - show..].iter().collect();
    format!("{}{}{}", head, "*".repeat(chars.len() - show * 2), tail)
}
