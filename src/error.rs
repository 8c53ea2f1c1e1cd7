//! Custom error types for vitrine-core
//!
//! This module defines the error hierarchy for the data layer using thiserror
//! for ergonomic error definitions.

use thiserror::Error;

/// The main error type for vitrine-core operations
#[derive(Error, Debug)]
pub enum VitrineError {
    /// A caller supplied malformed input (bad lengths, empty password,
    /// unparseable fields). Raised before any cryptographic work happens.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal cryptographic failures (cipher construction, key derivation)
    #[error("Encryption error: {0}")]
    Crypto(String),

    /// AEAD tag verification failed: the key is wrong or the data was
    /// tampered with. No plaintext is ever released on this path.
    #[error("Authentication failed: wrong key or tampered data")]
    AuthenticationFailed,

    /// Password-based decryption failed. Deliberately opaque: callers must
    /// not be able to tell a wrong password apart from corrupted data.
    #[error("Wrong password or corrupted data")]
    WrongPasswordOrCorrupted,

    /// The archive is encrypted and no password was supplied
    #[error("This backup is encrypted and requires a password")]
    PasswordRequired,

    /// The archive was produced by an incompatible schema version
    #[error("Unsupported backup schema version {found} (supported: {supported})")]
    IncompatibleSchema {
        found: String,
        supported: &'static str,
    },

    /// An import limit was exceeded (source size, decompressed total,
    /// compression ratio). The whole import is aborted.
    #[error("Resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),

    /// The archive structure itself is broken or hostile
    #[error("Malformed archive: {0}")]
    ArchiveMalformed(String),

    /// Device secret storage errors
    #[error("Keystore error: {0}")]
    Keystore(String),

    /// Database encryption migration failed; the original database and its
    /// plaintext backup are preserved.
    #[error("Migration failed: {reason}")]
    MigrationFailed { reason: String },

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),
}

impl VitrineError {
    /// Create an invalid-input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a resource-limit error
    pub fn limit_exceeded(msg: impl Into<String>) -> Self {
        Self::ResourceLimitExceeded(msg.into())
    }

    /// Create a malformed-archive error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::ArchiveMalformed(msg.into())
    }

    /// Create a migration-failure error
    pub fn migration_failed(reason: impl Into<String>) -> Self {
        Self::MigrationFailed {
            reason: reason.into(),
        }
    }

    /// Check if this is the opaque wrong-password error
    pub fn is_wrong_password(&self) -> bool {
        matches!(self, Self::WrongPasswordOrCorrupted)
    }

    /// Check if this is a resource-limit error
    pub fn is_limit_exceeded(&self) -> bool {
        matches!(self, Self::ResourceLimitExceeded(_))
    }
}

// Implement From traits for common error types

impl From<std::io::Error> for VitrineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for VitrineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<csv::Error> for VitrineError {
    fn from(err: csv::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type alias for vitrine-core operations
pub type VitrineResult<T> = Result<T, VitrineError>;
