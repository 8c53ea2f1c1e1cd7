//! Backup archive format: manifest, hostile-input guard, and codec

pub mod codec;
pub mod guard;
pub mod manifest;

pub use codec::{
    read_archive, ArchiveWriter, ReadOutcome, Section, ATTACHMENTS_DIR, MANIFEST_PATH,
    RECORDS_PATH,
};
pub use guard::{validate_entry_path, ImportGuard, ImportLimits, SkipReason, SkippedEntry};
pub use manifest::{BackupManifest, EncryptionParams, SCHEMA_VERSION};
