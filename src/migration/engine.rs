//! Storage-engine seam for the encryption migration
//!
//! The migrator never touches database internals; it drives an engine
//! through this trait. The shipped `SealedFileEngine` encrypts the whole
//! file under AES-256-GCM, which the tests also run against. An
//! SQLCipher-style engine in the app shell implements the same two
//! operations with an attach-and-export rekey.

use std::fs;
use std::path::Path;

use crate::crypto::{self, CipherEnvelope};
use crate::error::{VitrineError, VitrineResult};

use super::SQLITE_MAGIC;

/// What the migrator needs from a database engine
pub trait StorageEngine {
    /// Write an encrypted copy of the plaintext database at `src` to `dst`
    fn export_encrypted(&self, src: &Path, dst: &Path, key: &[u8]) -> VitrineResult<()>;

    /// Open the encrypted file with the key and smoke-read it
    ///
    /// Returns a size indicator for logging. Any failure to open or read is
    /// an error; the migrator treats it as a failed migration.
    fn verify(&self, path: &Path, key: &[u8]) -> VitrineResult<u64>;
}

/// Whole-file AEAD engine
///
/// The encrypted database on disk is a packed cipher blob (nonce followed
/// by ciphertext) of the original file bytes.
#[derive(Debug, Default)]
pub struct SealedFileEngine;

impl StorageEngine for SealedFileEngine {
    fn export_encrypted(&self, src: &Path, dst: &Path, key: &[u8]) -> VitrineResult<()> {
        let plaintext = fs::read(src)?;
        let envelope = crypto::seal(&plaintext, key)?;
        fs::write(dst, envelope.to_blob())?;
        Ok(())
    }

    fn verify(&self, path: &Path, key: &[u8]) -> VitrineResult<u64> {
        let blob = fs::read(path)?;
        let envelope = CipherEnvelope::from_blob(&blob)?;
        let plaintext = crypto::open(&envelope, key)?;

        if plaintext.len() < SQLITE_MAGIC.len() || plaintext[..SQLITE_MAGIC.len()] != SQLITE_MAGIC
        {
            return Err(VitrineError::Crypto(
                "decrypted database does not start with the SQLite header".into(),
            ));
        }

        Ok(plaintext.len() as u64)
    }
}
