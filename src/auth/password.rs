use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

use crate::error::ApiError;

pub fn hash_password(plain: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            ApiError::Unexpected(anyhow::anyhow!("password hashing failed"))
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> Result<bool, ApiError> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        ApiError::Unexpected(anyhow::anyhow!("stored password hash is malformed"))
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Burns one argon2 verification against a throwaway hash. Called on the
/// unknown-username login path so its timing matches the wrong-password path.
pub fn dummy_verify(plain: &str) {
    lazy_static::lazy_static! {
        static ref DUMMY_HASH: String =
            hash_password("fitid-timing-placeholder").expect("hash static placeholder");
    }
    let _ = verify_password(plain, &DUMMY_HASH);
}
