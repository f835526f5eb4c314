//! Password hashing with Argon2id.
//!
//! Hashes are stored as PHC strings, so parameters and salt travel with
//! the hash and verification is recomputation, never decryption.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::Rng;
use std::sync::OnceLock;

/// Stand-in hash verified when a login names no identity.
pub(crate) static DUMMY_HASH: OnceLock<String> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
#[error("Password hashing failed: {0}")]
pub struct HashError(String);

/// Hash a password into a PHC string with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, HashError> {
    let mut salt_bytes = [0u8; 16];
    rand::rng().fill(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| HashError(e.to_string()))?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| HashError(e.to_string()))
}

/// Check a password against a stored PHC string.
///
/// A malformed stored hash counts as a mismatch.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Spend the same Argon2 work as a real verification against a hash no
/// identity owns. Keeps "no such identity" as slow as "wrong password".
pub fn verify_dummy(password: &str) {
    let stored = DUMMY_HASH.get_or_init(|| hash_password("chirp-dummy-password").unwrap_or_default());
    let _ = verify_password(password, stored);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("battery staple", &hash));
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("pw").unwrap();
        let b = hash_password("pw").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("pw", &a));
        assert!(verify_password("pw", &b));
    }

    #[test]
    fn test_malformed_hash_is_mismatch() {
        assert!(!verify_password("pw", ""));
        assert!(!verify_password("pw", "plaintext"));
    }

    #[test]
    fn test_dummy_hash_is_real_argon2() {
        verify_dummy("anything");
        let stored = DUMMY_HASH.get().unwrap();
        assert!(stored.starts_with("$argon2id$"));
        assert!(PasswordHash::new(stored).is_ok());
    }
}
