//! Key derivation using Argon2id
//!
//! Derives encryption keys from user passwords using Argon2id,
//! a memory-hard key derivation function resistant to GPU/ASIC attacks.

use argon2::{Argon2, Params};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::crypto::secure::Credential;
use crate::error::{VitrineError, VitrineResult};

/// Salt length in bytes
pub const SALT_LEN: usize = 16;

/// Derived key length in bytes (AES-256)
pub const KEY_LEN: usize = 32;

/// Parameters for key derivation
///
/// Serialized into backup manifests so that envelopes written with older
/// parameters remain readable after the defaults change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Iteration count
    pub iterations: u32,
    /// Parallelism degree
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 131072, // 128 MiB
            iterations: 4,
            parallelism: 2,
        }
    }
}

/// A derived encryption key
pub struct DerivedKey {
    key: [u8; KEY_LEN],
}

impl DerivedKey {
    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

// Don't print the key in Debug output
impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey").finish_non_exhaustive()
    }
}

/// Generate a fresh random salt
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive an encryption key from a password and a raw salt
///
/// Rejects empty passwords and wrong-sized salts before any KDF work.
/// The same password, salt, and parameters always produce the same key.
pub fn derive_key(
    password: &Credential,
    salt: &[u8],
    params: &KdfParams,
) -> VitrineResult<DerivedKey> {
    if password.is_empty() {
        return Err(VitrineError::invalid_input("password must not be empty"));
    }
    if salt.len() != SALT_LEN {
        return Err(VitrineError::invalid_input(format!(
            "salt must be {} bytes, got {}",
            SALT_LEN,
            salt.len()
        )));
    }

    let argon2_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| VitrineError::Crypto(format!("Invalid Argon2 parameters: {}", e)))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2_params,
    );

    let mut key = [0u8; KEY_LEN];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| VitrineError::Crypto(format!("Key derivation failed: {}", e)))?;

    Ok(DerivedKey { key })
}

/// Check a password against a previously derived key
///
/// Never returns an error: any internal failure (empty password, bad salt,
/// parameter mismatch) reports as a plain `false`. The comparison visits
/// every byte regardless of where the first difference occurs.
pub fn verify_password(
    password: &Credential,
    salt: &[u8],
    expected: &[u8],
    params: &KdfParams,
) -> bool {
    let derived = match derive_key(password, salt, params) {
        Ok(key) => key,
        Err(_) => return false,
    };

    if expected.len() != KEY_LEN {
        return false;
    }

    let mut diff = 0u8;
    for (a, b) in derived.as_bytes().iter().zip(expected.iter()) {
        diff |= a ^ b;
    }
    diff == 0
}
