//! Passcode issuing and verification using Argon2
//!
//! A passcode is the shared secret teammates use to join an existing
//! instance. It is generated once at team creation, returned to the caller
//! in plaintext exactly once, and only its Argon2id hash is persisted.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::Rng;

use crate::team::PASSCODE_LEN;
use crate::types::GatehouseError;

const PASSCODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate a fresh passcode and its Argon2id hash.
///
/// Returns `(plaintext, hash)`. The plaintext is never re-derivable from
/// the hash; callers must hand it to the client immediately or lose it.
pub fn issue_passcode() -> Result<(String, String), GatehouseError> {
    let mut rng = rand::thread_rng();
    let plaintext: String = (0..PASSCODE_LEN)
        .map(|_| PASSCODE_CHARSET[rng.gen_range(0..PASSCODE_CHARSET.len())] as char)
        .collect();

    let hash = hash_passcode(&plaintext)?;
    Ok((plaintext, hash))
}

/// Hash a passcode using Argon2id.
///
/// Returns the PHC-formatted hash string that includes the salt and parameters.
pub fn hash_passcode(passcode: &str) -> Result<String, GatehouseError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(passcode.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| GatehouseError::Auth(format!("Failed to hash passcode: {e}")))
}

/// Verify a presented passcode against a stored hash.
///
/// A wrong passcode is `Ok(false)`, never an error; only a malformed
/// stored hash is an error.
pub fn verify_passcode(presented: &str, hash: &str) -> Result<bool, GatehouseError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| GatehouseError::Auth(format!("Invalid passcode hash format: {e}")))?;

    Ok(Argon2::default()
        .verify_password(presented.as_bytes(), &parsed_hash)
        .is_ok())
}
