//! Password-based encryption
//!
//! Composes Argon2id key derivation with AES-256-GCM into a self-describing
//! envelope: a fresh salt for every encryption, with the KDF parameters
//! carried alongside the ciphertext so envelopes written under older
//! defaults stay readable.

use serde::{Deserialize, Serialize};

use crate::error::{VitrineError, VitrineResult};

use super::encryption::{self, b64, CipherEnvelope};
use super::key_derivation::{self, KdfParams};
use super::secure::Credential;

/// Algorithm identifier written into backup manifests
pub const ALGORITHM_ID: &str = "Argon2id+AES-256-GCM";

/// A password-encrypted payload carrying everything needed to decrypt it
/// except the password itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordEnvelope {
    pub kdf: KdfParams,
    #[serde(with = "b64")]
    pub salt: Vec<u8>,
    pub cipher: CipherEnvelope,
}

/// Encrypt plaintext under a password
///
/// Generates a fresh salt, derives a key, and seals the plaintext. The
/// derived key lives only for the duration of this call and is wiped on
/// every exit path.
pub fn encrypt_with_password(
    plaintext: &[u8],
    password: &Credential,
    params: &KdfParams,
) -> VitrineResult<PasswordEnvelope> {
    let salt = key_derivation::generate_salt();
    let key = key_derivation::derive_key(password, &salt, params)?;
    let cipher = encryption::seal(plaintext, key.as_bytes())?;

    Ok(PasswordEnvelope {
        kdf: params.clone(),
        salt: salt.to_vec(),
        cipher,
    })
}

/// Decrypt a password envelope
///
/// Re-derives the key from the envelope's own salt and parameters. Every
/// failure past the empty-password check reports as the single opaque
/// `WrongPasswordOrCorrupted`: callers cannot tell a mistyped password from
/// tampered or damaged data, and must not be able to.
pub fn decrypt_with_password(
    envelope: &PasswordEnvelope,
    password: &Credential,
) -> VitrineResult<Vec<u8>> {
    if password.is_empty() {
        return Err(VitrineError::invalid_input("password must not be empty"));
    }

    let key = key_derivation::derive_key(password, &envelope.salt, &envelope.kdf)
        .map_err(|_| VitrineError::WrongPasswordOrCorrupted)?;

    encryption::open(&envelope.cipher, key.as_bytes())
        .map_err(|_| VitrineError::WrongPasswordOrCorrupted)
}
