//! vitrine-core - Data layer for the Vitrine collection catalog
//!
//! This library provides the security-sensitive plumbing for the Vitrine
//! cataloging application: password-based encryption for backups, a
//! device-secret keystore, the one-time database encryption upgrade, and
//! a backup archive format that treats imported files as hostile input.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `error`: Custom error types
//! - `crypto`: Argon2id key derivation and AES-256-GCM sealing
//! - `keystore`: Device secret storage (OS keyring backed)
//! - `migration`: Failure-safe plaintext-to-encrypted database upgrade
//! - `archive`: Backup container format, manifest, and import guard
//! - `repository`: The seam between backups and the app's record store
//! - `backup`: Export/import orchestration and spreadsheet-safe CSV
//!
//! # Example
//!
//! ```rust,ignore
//! use vitrine_core::backup::BackupService;
//! use vitrine_core::crypto::Credential;
//! use vitrine_core::repository::ImportMode;
//!
//! let service = BackupService::new();
//! let password = Credential::new("correct horse battery staple");
//! service.export_archive(&store, file, Some(&password))?;
//! ```

pub mod archive;
pub mod backup;
pub mod crypto;
pub mod error;
pub mod keystore;
pub mod migration;
pub mod repository;

pub use error::{VitrineError, VitrineResult};
