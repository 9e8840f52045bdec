//! Salted password hashing for persisted user accounts.

use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

const SALT_SIZE: usize = 16;

/// Generates a fresh random salt, hex-encoded for storage.
pub(crate) fn generate_salt() -> String {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    hex::encode(salt)
}

/// Hashes a password with the given hex salt.
pub(crate) fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

pub(crate) fn verify_password(salt: &str, password: &str, expected_hash: &str) -> bool {
    hash_password(salt, password) == expected_hash
}
