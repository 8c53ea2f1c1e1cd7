//! Backup manifest
//!
//! The manifest is always the first entry of a backup archive. Its schema
//! version gates whether the rest of the archive is parsed at all, and for
//! encrypted backups it carries everything needed to rebuild the password
//! envelope around the records ciphertext.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::encryption::b64;
use crate::crypto::{CipherAlgorithm, CipherEnvelope, KdfParams, PasswordEnvelope, ALGORITHM_ID};
use crate::error::{VitrineError, VitrineResult};

/// The only archive schema version this codec reads or writes
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Decryption parameters for the records section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionParams {
    /// Always `"Argon2id+AES-256-GCM"`
    pub algorithm: String,
    pub kdf: KdfParams,
    #[serde(with = "b64")]
    pub salt: Vec<u8>,
    #[serde(with = "b64")]
    pub nonce: Vec<u8>,
}

impl EncryptionParams {
    /// Split a password envelope into manifest parameters and the raw
    /// ciphertext bytes that become the records entry
    pub fn from_envelope(envelope: PasswordEnvelope) -> (Self, Vec<u8>) {
        let PasswordEnvelope { kdf, salt, cipher } = envelope;
        (
            Self {
                algorithm: ALGORITHM_ID.to_string(),
                kdf,
                salt,
                nonce: cipher.nonce,
            },
            cipher.ciphertext,
        )
    }

    /// Rebuild the password envelope around the records ciphertext
    pub fn to_envelope(&self, ciphertext: Vec<u8>) -> VitrineResult<PasswordEnvelope> {
        if self.algorithm != ALGORITHM_ID {
            return Err(VitrineError::malformed(format!(
                "unsupported encryption algorithm: {}",
                self.algorithm
            )));
        }

        Ok(PasswordEnvelope {
            kdf: self.kdf.clone(),
            salt: self.salt.clone(),
            cipher: CipherEnvelope {
                algorithm: CipherAlgorithm::Aes256Gcm,
                nonce: self.nonce.clone(),
                ciphertext,
            },
        })
    }
}

/// First entry of every backup archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupManifest {
    pub schema_version: String,
    pub exported_at: DateTime<Utc>,
    pub record_count: u32,
    pub photo_count: u32,
    pub encrypted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_params: Option<EncryptionParams>,
}

impl BackupManifest {
    /// Manifest for an unencrypted backup
    pub fn new_plain(record_count: u32, photo_count: u32) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            exported_at: Utc::now(),
            record_count,
            photo_count,
            encrypted: false,
            encryption_params: None,
        }
    }

    /// Manifest for a password-encrypted backup
    pub fn new_encrypted(record_count: u32, photo_count: u32, params: EncryptionParams) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            exported_at: Utc::now(),
            record_count,
            photo_count,
            encrypted: true,
            encryption_params: Some(params),
        }
    }

    /// Gate everything after the manifest on the schema version
    pub fn check_schema(&self) -> VitrineResult<()> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(VitrineError::IncompatibleSchema {
                found: self.schema_version.clone(),
                supported: SCHEMA_VERSION,
            });
        }
        Ok(())
    }
}
