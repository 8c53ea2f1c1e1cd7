//! One-time plaintext-to-encrypted database migration
//!
//! Existing installs carry a plaintext SQLite database; new installs are
//! encrypted from day one. On startup the app runs `migrate_if_needed`,
//! which detects the database state from its header and, for plaintext
//! files, performs a fail-safe conversion: backup first, encrypt into a
//! temp file, verify, then swap. At no point can both the original and the
//! only good copy be lost, and the plaintext backup is kept until the user
//! explicitly deletes it.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{VitrineError, VitrineResult};
use crate::keystore::SecretStore;

pub mod engine;

pub use engine::{SealedFileEngine, StorageEngine};

/// First 16 bytes of every plaintext SQLite database file
pub const SQLITE_MAGIC: [u8; 16] = *b"SQLite format 3\0";

/// What the header inspection concluded about the database file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseEncryptionStatus {
    /// No file, or an empty one, at the database path
    NoDatabase,
    /// The file begins with the SQLite header and needs migrating
    Plaintext,
    /// The file does not begin with the SQLite header; assumed encrypted
    Encrypted,
    /// The file is too short to carry a header, or unreadable
    Corrupted(String),
}

/// How a `migrate_if_needed` call ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Nothing to migrate; the app starts with a fresh encrypted database
    NoDatabase,
    /// The database is already encrypted; no file was touched
    AlreadyEncrypted,
    /// The migration ran to completion; the plaintext backup remains on disk
    Migrated { backup: PathBuf },
}

/// Inspect the database file header
///
/// Anything that is not the SQLite header is assumed to be an already
/// encrypted database. A wrong guess in that direction is recoverable (the
/// engine refuses to open garbage and the file is left alone); guessing
/// the other way would destroy data.
pub fn detect_status(path: &Path) -> DatabaseEncryptionStatus {
    if !path.exists() {
        return DatabaseEncryptionStatus::NoDatabase;
    }

    let len = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) => return DatabaseEncryptionStatus::Corrupted(e.to_string()),
    };

    if len == 0 {
        return DatabaseEncryptionStatus::NoDatabase;
    }
    if len < SQLITE_MAGIC.len() as u64 {
        return DatabaseEncryptionStatus::Corrupted(format!(
            "file is {} bytes, shorter than a database header",
            len
        ));
    }

    let mut header = [0u8; 16];
    match fs::File::open(path).and_then(|mut f| f.read_exact(&mut header)) {
        Ok(()) => {
            if header == SQLITE_MAGIC {
                DatabaseEncryptionStatus::Plaintext
            } else {
                DatabaseEncryptionStatus::Encrypted
            }
        }
        Err(e) => DatabaseEncryptionStatus::Corrupted(e.to_string()),
    }
}

/// Drives the one-time encryption migration for a database file
pub struct Migrator<E: StorageEngine> {
    db_path: PathBuf,
    secrets: SecretStore,
    engine: E,
}

impl<E: StorageEngine> Migrator<E> {
    pub fn new(db_path: impl Into<PathBuf>, secrets: SecretStore, engine: E) -> Self {
        Self {
            db_path: db_path.into(),
            secrets,
            engine,
        }
    }

    /// Path of the database this migrator manages
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Detect the database state and migrate if it is plaintext
    ///
    /// Safe to call on every startup: once the database is encrypted this
    /// returns `AlreadyEncrypted` without touching any file.
    pub fn migrate_if_needed(&self) -> VitrineResult<MigrationOutcome> {
        if !self.db_path.exists() {
            debug!("no database file; nothing to migrate");
            return Ok(MigrationOutcome::NoDatabase);
        }

        match detect_status(&self.db_path) {
            DatabaseEncryptionStatus::NoDatabase => {
                // Zero-length leftover from an interrupted create.
                warn!("database file is empty; removing it and its sidecars");
                self.remove_database_files()?;
                Ok(MigrationOutcome::NoDatabase)
            }
            DatabaseEncryptionStatus::Encrypted => {
                debug!("database is already encrypted");
                Ok(MigrationOutcome::AlreadyEncrypted)
            }
            DatabaseEncryptionStatus::Corrupted(reason) => {
                warn!(%reason, "database file unusable; removing it for a fresh start");
                self.remove_database_files()?;
                Ok(MigrationOutcome::NoDatabase)
            }
            DatabaseEncryptionStatus::Plaintext => {
                info!("plaintext database detected; starting encryption migration");
                let backup = self.migrate_plaintext()?;
                info!(backup = %backup.display(), "database encryption migration complete");
                Ok(MigrationOutcome::Migrated { backup })
            }
        }
    }

    /// Delete a plaintext backup left behind by a successful migration
    ///
    /// Backups are never removed automatically; the app calls this after
    /// the user confirms the encrypted database works. Returns `false` when
    /// nothing was deleted.
    pub fn delete_backup(&self, backup: &Path) -> bool {
        match fs::remove_file(backup) {
            Ok(()) => {
                info!(backup = %backup.display(), "plaintext backup deleted");
                true
            }
            Err(e) => {
                warn!(backup = %backup.display(), error = %e, "could not delete plaintext backup");
                false
            }
        }
    }

    fn migrate_plaintext(&self) -> VitrineResult<PathBuf> {
        let timestamp = Utc::now().timestamp_millis();
        let backup = self.sibling(&format!("_plaintext_backup_{}", timestamp))?;
        let temp = self.sibling(&format!("_encrypted_temp_{}", timestamp))?;

        // Step 1: plaintext backup. An existing file at the backup path is
        // never overwritten.
        if backup.exists() {
            return Err(VitrineError::migration_failed(format!(
                "backup path already exists: {}",
                backup.display()
            )));
        }
        fs::copy(&self.db_path, &backup).map_err(|e| {
            VitrineError::migration_failed(format!("could not create plaintext backup: {}", e))
        })?;
        info!(backup = %backup.display(), "plaintext backup created");

        // Steps 2-5 leave the original in place until the final swap.
        if let Err(e) = self.encrypt_and_swap(&temp, &backup) {
            let _ = fs::remove_file(&temp);
            warn!(error = %e, "migration failed; original database and backup preserved");
            return Err(VitrineError::migration_failed(format!(
                "{} (plaintext backup kept at {})",
                e,
                backup.display()
            )));
        }

        Ok(backup)
    }

    fn encrypt_and_swap(&self, temp: &Path, backup: &Path) -> VitrineResult<()> {
        let secret = self.secrets.get_or_create()?;

        self.engine
            .export_encrypted(&self.db_path, temp, secret.as_bytes())?;
        debug!(temp = %temp.display(), "encrypted copy written");

        let size = self.engine.verify(temp, secret.as_bytes())?;
        debug!(bytes = size, "encrypted copy verified");

        fs::remove_file(&self.db_path)?;
        if let Err(e) = fs::rename(temp, &self.db_path) {
            // Put the plaintext back so the app still has its database.
            let _ = fs::copy(backup, &self.db_path);
            return Err(e.into());
        }

        self.remove_sidecars();
        Ok(())
    }

    fn remove_database_files(&self) -> VitrineResult<()> {
        if self.db_path.exists() {
            fs::remove_file(&self.db_path)?;
        }
        self.remove_sidecars();
        Ok(())
    }

    // SQLite leaves -wal and -shm files next to the database; they hold
    // plaintext pages and must not outlive the migration.
    fn remove_sidecars(&self) {
        for suffix in ["-wal", "-shm"] {
            if let Ok(sidecar) = self.sibling(suffix) {
                if sidecar.exists() {
                    let _ = fs::remove_file(&sidecar);
                }
            }
        }
    }

    fn sibling(&self, suffix: &str) -> VitrineResult<PathBuf> {
        let name = self
            .db_path
            .file_name()
            .ok_or_else(|| VitrineError::invalid_input("database path has no file name"))?;
        let mut name = name.to_os_string();
        name.push(suffix);
        Ok(self.db_path.with_file_name(name))
    }
}
