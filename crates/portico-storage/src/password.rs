// Local passport password hashing
// Decision: Argon2id with default parameters, PHC string stored in passports.password
// Decision: Hashing happens in the storage layer so no backend ever sees a plaintext password

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use portico_core::Passport;

/// Hash a plaintext password into a PHC string
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("Failed to hash password: {}", e))
}

/// Whether `password` matches a stored PHC hash. A malformed hash is an error,
/// a mismatch is `Ok(false)`.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| anyhow!("Malformed password hash: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Check a candidate password against a passport. A passport without a
/// stored hash never matches.
pub fn validate_password(passport: &Passport, candidate: &str) -> Result<bool> {
    match passport.password.as_deref() {
        Some(hash) => verify_password(candidate, hash),
        None => Ok(false),
    }
}
