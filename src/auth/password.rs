//! One-way hashing for passwords and API keys.

use argon2::{
    password_hash::{rand_core::OsRng, Error as PasswordHashError, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashError {
    #[error("failed to hash credential")]
    Hash,
    #[error("malformed credential hash")]
    Format,
}

/// Hash a secret with Argon2id and a fresh random salt.
///
/// The output is a PHC string carrying algorithm, parameters, and salt, so
/// verification needs no side channel.
///
/// # Errors
///
/// Returns [`HashError::Hash`] when hashing fails (should not happen with
/// default parameters).
pub fn hash_secret(secret: &str) -> Result<String, HashError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| HashError::Hash)
}

/// Verify `candidate` against a stored PHC hash in constant time.
///
/// A mismatch is a plain `false`, never an error; only a hash that cannot be
/// parsed reports [`HashError::Format`].
///
/// # Errors
///
/// Returns [`HashError::Format`] when `stored_hash` is not a valid PHC string.
pub fn verify_secret(stored_hash: &str, candidate: &str) -> Result<bool, HashError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|_| HashError::Format)?;
    match Argon2::default().verify_password(candidate.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(PasswordHashError::Password) => Ok(false),
        Err(_) => Err(HashError::Format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_round_trip() -> Result<(), HashError> {
        let hash = hash_secret("Passw0rd!")?;
        assert_ne!(hash, "Passw0rd!");
        assert!(hash.starts_with("$argon2"));
        assert!(verify_secret(&hash, "Passw0rd!")?);
        assert!(!verify_secret(&hash, "passw0rd!")?);
        Ok(())
    }

    #[test]
    fn salts_make_hashes_unique() -> Result<(), HashError> {
        let first = hash_secret("same-secret")?;
        let second = hash_secret("same-secret")?;
        assert_ne!(first, second);
        assert!(verify_secret(&first, "same-secret")?);
        assert!(verify_secret(&second, "same-secret")?);
        Ok(())
    }

    #[test]
    fn malformed_hash_is_an_error_not_a_mismatch() {
        assert_eq!(
            verify_secret("not-a-phc-string", "anything"),
            Err(HashError::Format)
        );
    }
}
