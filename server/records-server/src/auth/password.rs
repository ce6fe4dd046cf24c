//! Argon2id password hashing
//!
//! Hashing is CPU-intensive, so request handlers go through the async
//! wrappers, which run it on the blocking pool.

use std::sync::OnceLock;

use anyhow::Context;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashingFailed(String),

    #[error("Failed to verify password: {0}")]
    VerificationFailed(String),

    #[error("Invalid password hash format: {0}")]
    InvalidHashFormat(String),
}

/// Hash a password into a PHC string (`$argon2id$v=19$...`)
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))
}

/// Verify a password against a stored PHC string
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| PasswordError::InvalidHashFormat(e.to_string()))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerificationFailed(e.to_string())),
    }
}

pub async fn hash_password_blocking(password: &str) -> anyhow::Result<String> {
    let password = password.to_string();
    let hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .context("Password hashing task panicked")??;
    Ok(hash)
}

pub async fn verify_password_blocking(password: &str, hash: &str) -> anyhow::Result<bool> {
    let password = password.to_string();
    let hash = hash.to_string();
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .context("Password verification task panicked")??;
    Ok(valid)
}

/// Spend the same verification work as a real login when no account matched
pub async fn verify_dummy_blocking(password: &str) -> anyhow::Result<()> {
    static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();

    let password = password.to_string();
    tokio::task::spawn_blocking(move || {
        let hash = DUMMY_HASH.get_or_init(|| hash_password("unmatched-account").ok());
        if let Some(hash) = hash {
            let _ = verify_password(&password, hash);
        }
    })
    .await
    .context("Password verification task panicked")?;
    Ok(())
}
