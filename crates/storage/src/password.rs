//! Argon2 password hashing for locally stored accounts.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::repository::StorageError;

/// Hash `password` into a PHC string with a fresh random salt.
///
/// # Errors
///
/// Returns `StorageError::Hashing` if Argon2 rejects the input.
pub fn hash_password(password: &str) -> Result<String, StorageError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| StorageError::Hashing(e.to_string()))
}

/// Check `password` against a stored PHC hash.
///
/// # Errors
///
/// Returns `StorageError::Hashing` if the stored hash cannot be parsed.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, StorageError> {
    let parsed =
        PasswordHash::new(password_hash).map_err(|e| StorageError::Hashing(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
