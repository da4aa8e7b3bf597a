//! Password hashing and strength checks
//!
//! Hashes are Argon2id PHC strings with a random salt per hash.

use anyhow::{Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Passwords rejected outright no matter their length
const COMMON_PASSWORDS: &[&str] = &[
    "password", "password1", "password123", "12345678", "123456789", "1234567890",
    "qwertyuiop", "qwerty123", "iloveyou", "sunshine", "princess", "football",
    "baseball", "welcome1", "admin123", "letmein1", "abc12345", "trustno1",
    "passw0rd", "11111111", "00000000", "marketplace",
];

/// Hash a password using Argon2id with the crate defaults.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
        .context("Password hashing failed")?;

    Ok(password_hash.to_string())
}

/// Verify a password against a stored PHC hash.
///
/// A wrong password is `Ok(false)`; a malformed hash is an error.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))
        .context("Failed to parse password hash")?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("Password verification failed: {}", e))
            .context("Password verification error"),
    }
}

/// Check a candidate password; returns every failed rule's message.
///
/// `attributes` are the account values (username, email) the password must
/// not resemble.
pub fn validate_password_strength(password: &str, attributes: &[&str]) -> Vec<String> {
    let mut problems = Vec::new();
    let lowered = password.to_lowercase();

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        problems.push(format!(
            "This password is too short. It must contain at least {} characters.",
            MIN_PASSWORD_LENGTH
        ));
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        problems.push("This password is entirely numeric.".to_string());
    }
    if COMMON_PASSWORDS.contains(&lowered.as_str()) {
        problems.push("This password is too common.".to_string());
    }
    if attributes.iter().any(|attr| too_similar(&lowered, attr)) {
        problems.push("The password is too similar to your account details.".to_string());
    }
    problems
}

/// Similar when the password contains the attribute (or its email local
/// part) or the attribute contains the password.
fn too_similar(password: &str, attribute: &str) -> bool {
    let attribute = attribute.trim().to_lowercase();
    let mut parts = vec![attribute.clone()];
    if let Some((local, _)) = attribute.split_once('@') {
        parts.push(local.to_string());
    }
    parts
        .iter()
        .filter(|part| part.chars().count() >= 3)
        .any(|part| password.contains(part.as_str()) || part.contains(password))
}
