use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use secrecy::{ExposeSecret, SecretString};
use std::sync::OnceLock;

/// Supplied password. Never printed, wiped on drop.
#[derive(Debug, Clone)]
pub struct Password(SecretString);

impl Password {
    pub fn new(password: String) -> Self {
        Self(SecretString::new(password))
    }

    pub fn from_secret(secret: SecretString) -> Self {
        Self(secret)
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

/// PHC-formatted argon2 hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Hash with Argon2id and a fresh salt.
pub fn hash_password(password: &Password) -> Result<PasswordHashString, anyhow::Error> {
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = Argon2::default()
        .hash_password(password.expose().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    Ok(PasswordHashString::new(password_hash))
}

/// Returns `Ok(false)` on mismatch and `Err` only when the stored hash is
/// unusable.
pub fn verify_password(
    password: &Password,
    password_hash: &PasswordHashString,
) -> Result<bool, anyhow::Error> {
    let parsed_hash = PasswordHash::new(password_hash.as_str())
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;

    Ok(Argon2::default()
        .verify_password(password.expose().as_bytes(), &parsed_hash)
        .is_ok())
}

/// Hash of a random password nobody knows, with the default parameters.
fn placeholder_hash() -> Option<&'static PasswordHashString> {
    static PLACEHOLDER: OnceLock<Option<PasswordHashString>> = OnceLock::new();
    PLACEHOLDER
        .get_or_init(|| {
            let salt = SaltString::generate(&mut OsRng);
            hash_password(&Password::new(salt.as_str().to_string())).ok()
        })
        .as_ref()
}

/// Spend one full verification on a subject with no stored hash.
pub fn verify_against_placeholder(password: &Password) {
    if let Some(hash) = placeholder_hash() {
        let _ = verify_password(password, hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_password() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash = hash_password(&password).expect("Failed to hash password");

        assert!(hash.as_str().starts_with("$argon2id$"));
        assert!(!hash.as_str().contains("mySecurePassword123"));
    }

    #[test]
    fn test_verify_password() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash = hash_password(&password).expect("Failed to hash password");

        assert!(verify_password(&password, &hash).unwrap());
        assert!(!verify_password(&Password::new("wrongPassword".to_string()), &hash).unwrap());
    }

    #[test]
    fn test_malformed_hash_is_an_error() {
        let password = Password::new("x".to_string());
        let hash = PasswordHashString::new("not-a-phc-string".to_string());

        assert!(verify_password(&password, &hash).is_err());
    }

    #[test]
    fn test_password_debug_is_redacted() {
        let password = Password::new("hunter2".to_string());
        assert!(!format!("{:?}", password).contains("hunter2"));
    }

    #[test]
    fn test_placeholder_uses_default_cost() {
        let placeholder = placeholder_hash().expect("placeholder hash");
        let real = hash_password(&Password::new("x".to_string())).unwrap();

        let params = |h: &PasswordHashString| {
            let parsed = PasswordHash::new(h.as_str()).unwrap();
            (parsed.algorithm.to_string(), parsed.params.to_string())
        };
        assert_eq!(params(placeholder), params(&real));

        verify_against_placeholder(&Password::new("anything".to_string()));
    }
}
