//! Credential vault: authenticated encryption of long-lived third-party
//! secrets under a process-wide master key.

mod cipher;
mod error;
mod key;
mod secret;

pub use cipher::{rotate_key, SecretCipher};
pub use error::VaultError;
pub use key::{MasterKey, MASTER_KEY_LEN};
pub use secret::{mask_secret, EncryptedSecret, StoredSecret, NONCE_LEN, TAG_LEN};
