//! Password hashing for user accounts.
//!
//! Passwords are stored as argon2id PHC strings (algorithm, parameters, salt and hash in one
//! string), so the parameters can change later without invalidating existing hashes.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

/// Maximum password length, so nobody can make us hash a huge buffer.
pub const MAX_PASSWORD_LENGTH: usize = 512;
pub const MIN_PASSWORD_LENGTH: usize = 6;

pub fn hash_password(password: &str) -> Result<String, anyhow::Error> {
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(anyhow::anyhow!("The password provided was too long."));
    }

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash the password: {}", e))?;

    Ok(hash.to_string())
}

/// Returns `Ok(false)` for a wrong password and an error only when the stored hash is unusable.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, anyhow::Error> {
    if password.len() > MAX_PASSWORD_LENGTH {
        return Ok(false);
    }

    let parsed = PasswordHash::new(password_hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash in the database: {}", e))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(_) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("Failed to verify the password: {}", e)),
    }
}
