//! Backup export and import
//!
//! Ties the pieces together: the record store hands over the collection,
//! the crypto layer seals it when a password is given, and the archive
//! codec streams it to or from a `.tar.gz` container.
//!
//! # Archive layout
//!
//! - `manifest.json`: schema version, counts, and (for protected
//!   archives) the decryption parameters — always the first entry
//! - `records.json`: the collection as a JSON array, or its ciphertext
//! - `attachments/<name>`: photo bytes, one entry each
//!
//! # Import safety
//!
//! Imports treat the archive as hostile input. The declared file size is
//! gated before anything is read, entry paths are validated, decompressed
//! output is metered against size and ratio caps, and no attachment is
//! persisted until the records section has decrypted successfully.

pub mod csv;

use std::io::{Read, Write};

use tracing::info;

use crate::archive::{
    read_archive, ArchiveWriter, BackupManifest, EncryptionParams, ImportLimits, Section,
};
use crate::crypto::{decrypt_with_password, encrypt_with_password, Credential, KdfParams};
use crate::error::{VitrineError, VitrineResult};
use crate::repository::{ImportMode, RecordStore};

/// What an export produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub record_count: u32,
    pub photo_count: u32,
    pub encrypted: bool,
}

/// What an import changed, plus anything it passed over
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub records_imported: u32,
    pub records_skipped: u32,
    pub photos_imported: u32,
    /// Non-fatal problems: skipped entries and individual bad records
    pub warnings: Vec<String>,
}

/// Exports and imports backup archives against a record store
pub struct BackupService {
    limits: ImportLimits,
    kdf_params: KdfParams,
}

impl Default for BackupService {
    fn default() -> Self {
        Self::new()
    }
}

impl BackupService {
    pub fn new() -> Self {
        Self {
            limits: ImportLimits::default(),
            kdf_params: KdfParams::default(),
        }
    }

    /// Override the import limits or key derivation cost
    pub fn with_options(limits: ImportLimits, kdf_params: KdfParams) -> Self {
        Self { limits, kdf_params }
    }

    /// Write the whole collection as a backup archive
    ///
    /// With a password the records section is sealed and the manifest
    /// carries the parameters needed to open it again; attachments travel
    /// as-is either way. Exporting an empty collection is an error.
    pub fn export_archive<S: RecordStore, W: Write>(
        &self,
        store: &S,
        sink: W,
        password: Option<&Credential>,
    ) -> VitrineResult<ExportSummary> {
        let payload = store.export_all()?;
        if payload.record_count == 0 {
            return Err(VitrineError::invalid_input(
                "collection is empty, nothing to export",
            ));
        }

        let (manifest, records) = match password {
            Some(password) => {
                let envelope =
                    encrypt_with_password(&payload.records_json, password, &self.kdf_params)?;
                let (params, ciphertext) = EncryptionParams::from_envelope(envelope);
                (
                    BackupManifest::new_encrypted(
                        payload.record_count,
                        payload.photo_count,
                        params,
                    ),
                    ciphertext,
                )
            }
            None => (
                BackupManifest::new_plain(payload.record_count, payload.photo_count),
                payload.records_json,
            ),
        };

        let mut writer = ArchiveWriter::new(sink, &manifest)?;
        writer.add_records(&records)?;
        for attachment in &payload.attachments {
            writer.add_attachment(&attachment.name, &attachment.bytes)?;
        }
        writer.finish()?;

        info!(
            records = payload.record_count,
            photos = payload.photo_count,
            encrypted = manifest.encrypted,
            "exported backup archive"
        );

        Ok(ExportSummary {
            record_count: payload.record_count,
            photo_count: payload.photo_count,
            encrypted: manifest.encrypted,
        })
    }

    /// Read a backup archive into the store
    ///
    /// `declared_len` is the archive file size as reported before reading;
    /// it is checked against the source limit up front. A protected
    /// archive needs its password before any record or attachment is
    /// applied; the wrong one fails with nothing persisted.
    pub fn import_archive<S: RecordStore, R: Read>(
        &self,
        store: &mut S,
        source: R,
        declared_len: u64,
        password: Option<&Credential>,
        mode: ImportMode,
    ) -> VitrineResult<ImportSummary> {
        let mut records_imported = 0u32;
        let mut records_skipped = 0u32;
        let mut photos_imported = 0u32;
        let mut warnings = Vec::new();

        let outcome = read_archive(source, declared_len, &self.limits, |section| {
            match section {
                Section::Records(manifest, bytes) => {
                    let plaintext = open_records(manifest, bytes, password)?;
                    let stats = store.import_records(&plaintext, mode)?;
                    records_imported = stats.imported;
                    records_skipped = stats.skipped;
                    warnings.extend(stats.errors);
                }
                Section::Attachment { name, bytes } => {
                    store.store_attachment(&name, &bytes)?;
                    photos_imported += 1;
                }
            }
            Ok(())
        })?;

        if !outcome.saw_records {
            return Err(VitrineError::malformed("archive has no records section"));
        }

        for skipped in &outcome.skipped {
            warnings.push(skipped.describe());
        }

        info!(
            records = records_imported,
            photos = photos_imported,
            warnings = warnings.len(),
            "imported backup archive"
        );

        Ok(ImportSummary {
            records_imported,
            records_skipped,
            photos_imported,
            warnings,
        })
    }
}

/// Recover the plaintext records payload, whatever the manifest says
fn open_records(
    manifest: &BackupManifest,
    bytes: Vec<u8>,
    password: Option<&Credential>,
) -> VitrineResult<Vec<u8>> {
    if !manifest.encrypted {
        return Ok(bytes);
    }

    let password = password.ok_or(VitrineError::PasswordRequired)?;
    let params = manifest.encryption_params.as_ref().ok_or_else(|| {
        VitrineError::malformed("manifest says encrypted but has no encryption parameters")
    })?;
    let envelope = params.to_envelope(bytes)?;
    decrypt_with_password(&envelope, password)
}
