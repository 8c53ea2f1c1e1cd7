//! Cryptographic primitives for vitrine-core
//!
//! Provides AES-256-GCM authenticated encryption with Argon2id key
//! derivation, plus the password-envelope composition used by encrypted
//! backups.

pub mod encryption;
pub mod key_derivation;
pub mod password;
pub mod secure;

pub use encryption::{open, seal, CipherAlgorithm, CipherEnvelope, NONCE_LEN, TAG_LEN};
pub use key_derivation::{
    derive_key, generate_salt, verify_password, DerivedKey, KdfParams, KEY_LEN, SALT_LEN,
};
pub use password::{
    decrypt_with_password, encrypt_with_password, PasswordEnvelope, ALGORITHM_ID,
};
pub use secure::Credential;
