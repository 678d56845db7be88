//! Password hashing with Argon2.
//!
//! Each hash carries its own random salt inside the PHC string, so no
//! separate salt column exists and no two users share salt material.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::error::{DataError, Result};

/// Hash a password with a fresh random salt, returning the PHC string.
pub fn hash(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| DataError::validation(format!("failed to hash password: {e}")))
}

/// Verify a password against a stored PHC string.
pub fn verify(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}
