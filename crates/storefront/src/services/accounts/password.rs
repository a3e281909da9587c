//! Password hashing and policy.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use rand::seq::IndexedRandom;

use crate::services::ServiceError;

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Length of generated temporary passwords.
const TEMPORARY_PASSWORD_LENGTH: usize = 12;

const TEMPORARY_PASSWORD_CHARS: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*";

/// Validate password meets requirements.
pub fn validate_password(password: &str) -> Result<(), ServiceError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ServiceError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2id.
pub fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| ServiceError::PasswordHash)
}

/// Verify a password against a hash.
pub fn verify_password(password: &str, hash: &str) -> Result<(), ServiceError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| ServiceError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| ServiceError::InvalidCredentials)
}

/// A random password handed to invited administrators.
pub fn generate_temporary_password() -> String {
    let mut rng = rand::rng();
    (0..TEMPORARY_PASSWORD_LENGTH)
        .filter_map(|_| TEMPORARY_PASSWORD_CHARS.choose(&mut rng))
        .map(|&b| char::from(b))
        .collect()
}
