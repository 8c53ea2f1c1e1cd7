//! AES-256-GCM encryption/decryption
//!
//! Provides authenticated encryption for data at rest using AES-256-GCM.
//! Each encryption operation generates a unique nonce, and the GCM tag
//! travels appended to the ciphertext.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use serde::{Deserialize, Serialize};

use crate::error::{VitrineError, VitrineResult};

use super::key_derivation::KEY_LEN;

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_LEN: usize = 12;

/// Size of the GCM authentication tag in bytes
pub const TAG_LEN: usize = 16;

/// Serde helper: raw bytes as base64 strings on the wire
pub(crate) mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// The cipher used for an envelope
///
/// Closed set: decoding an unknown algorithm tag fails at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CipherAlgorithm {
    #[serde(rename = "AES-256-GCM")]
    Aes256Gcm,
}

/// An authenticated ciphertext with its nonce and algorithm tag
///
/// `ciphertext` always ends with the 16-byte GCM tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CipherEnvelope {
    pub algorithm: CipherAlgorithm,
    #[serde(with = "b64")]
    pub nonce: Vec<u8>,
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
}

impl CipherEnvelope {
    /// Pack the envelope into a single blob: nonce followed by ciphertext
    pub fn to_blob(&self) -> Vec<u8> {
        let mut blob = Vec::with_capacity(self.nonce.len() + self.ciphertext.len());
        blob.extend_from_slice(&self.nonce);
        blob.extend_from_slice(&self.ciphertext);
        blob
    }

    /// Split a packed blob back into an envelope
    ///
    /// The first 12 bytes are the nonce; everything after is ciphertext.
    /// A blob too short to hold a nonce and a tag is rejected.
    pub fn from_blob(blob: &[u8]) -> VitrineResult<Self> {
        if blob.len() < NONCE_LEN + TAG_LEN {
            return Err(VitrineError::invalid_input(format!(
                "encrypted blob too short: {} bytes",
                blob.len()
            )));
        }
        Ok(Self {
            algorithm: CipherAlgorithm::Aes256Gcm,
            nonce: blob[..NONCE_LEN].to_vec(),
            ciphertext: blob[NONCE_LEN..].to_vec(),
        })
    }
}

/// Encrypt plaintext using AES-256-GCM with a fresh random nonce
///
/// The key must be exactly 32 bytes; anything else is rejected before any
/// cryptographic work.
pub fn seal(plaintext: &[u8], key: &[u8]) -> VitrineResult<CipherEnvelope> {
    if key.len() != KEY_LEN {
        return Err(VitrineError::invalid_input(format!(
            "key must be {} bytes, got {}",
            KEY_LEN,
            key.len()
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| VitrineError::Crypto(format!("Failed to create cipher: {}", e)))?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| VitrineError::Crypto(format!("Encryption failed: {}", e)))?;

    Ok(CipherEnvelope {
        algorithm: CipherAlgorithm::Aes256Gcm,
        nonce: nonce_bytes.to_vec(),
        ciphertext,
    })
}

/// Decrypt an envelope, verifying the authentication tag
///
/// Fails closed: a wrong key or any modified byte yields
/// `AuthenticationFailed` and no plaintext. Structural problems (bad key,
/// nonce, or ciphertext lengths) are `InvalidInput` and are caught before
/// the cipher is constructed.
pub fn open(envelope: &CipherEnvelope, key: &[u8]) -> VitrineResult<Vec<u8>> {
    if key.len() != KEY_LEN {
        return Err(VitrineError::invalid_input(format!(
            "key must be {} bytes, got {}",
            KEY_LEN,
            key.len()
        )));
    }
    if envelope.nonce.len() != NONCE_LEN {
        return Err(VitrineError::invalid_input(format!(
            "nonce must be {} bytes, got {}",
            NONCE_LEN,
            envelope.nonce.len()
        )));
    }
    if envelope.ciphertext.len() < TAG_LEN {
        return Err(VitrineError::invalid_input(format!(
            "ciphertext too short to carry a tag: {} bytes",
            envelope.ciphertext.len()
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| VitrineError::Crypto(format!("Failed to create cipher: {}", e)))?;

    let nonce = Nonce::from_slice(&envelope.nonce);
    cipher
        .decrypt(nonce, envelope.ciphertext.as_ref())
        .map_err(|_| VitrineError::AuthenticationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; KEY_LEN] {
        [7u8; KEY_LEN]
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let key = test_key();
        let plaintext = b"Hello, World!";

        let envelope = seal(plaintext, &key).unwrap();
        let decrypted = open(&envelope, &key).unwrap();

        assert_eq!(plaintext, decrypted.as_slice());
    }

    #[test]
    fn test_ciphertext_carries_tag() {
        let key = test_key();
        let envelope = seal(b"data", &key).unwrap();
        assert_eq!(envelope.ciphertext.len(), 4 + TAG_LEN);
    }

    #[test]
    fn test_different_nonces() {
        let key = test_key();
        let plaintext = b"Hello, World!";

        let envelope1 = seal(plaintext, &key).unwrap();
        let envelope2 = seal(plaintext, &key).unwrap();

        // Same plaintext must produce different nonces and ciphertext
        assert_ne!(envelope1.nonce, envelope2.nonce);
        assert_ne!(envelope1.ciphertext, envelope2.ciphertext);
    }

    #[test]
    fn test_wrong_key_fails_closed() {
        let envelope = seal(b"Hello, World!", &test_key()).unwrap();
        let result = open(&envelope, &[8u8; KEY_LEN]);
        assert!(matches!(result, Err(VitrineError::AuthenticationFailed)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = test_key();
        let mut envelope = seal(b"Hello, World!", &key).unwrap();
        envelope.ciphertext[0] ^= 0xFF;

        let result = open(&envelope, &key);
        assert!(matches!(result, Err(VitrineError::AuthenticationFailed)));
    }

    #[test]
    fn test_tampered_tag_fails() {
        let key = test_key();
        let mut envelope = seal(b"Hello, World!", &key).unwrap();
        let last = envelope.ciphertext.len() - 1;
        envelope.ciphertext[last] ^= 0x01;

        let result = open(&envelope, &key);
        assert!(matches!(result, Err(VitrineError::AuthenticationFailed)));
    }

    #[test]
    fn test_empty_plaintext() {
        let key = test_key();
        let envelope = seal(b"", &key).unwrap();
        assert_eq!(envelope.ciphertext.len(), TAG_LEN);

        let decrypted = open(&envelope, &key).unwrap();
        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_large_plaintext() {
        let key = test_key();
        let plaintext: Vec<u8> = (0..10000).map(|i| (i % 256) as u8).collect();

        let envelope = seal(&plaintext, &key).unwrap();
        let decrypted = open(&envelope, &key).unwrap();

        assert_eq!(plaintext, decrypted);
    }

    #[test]
    fn test_wrong_key_length_rejected() {
        assert!(matches!(
            seal(b"data", &[0u8; 16]),
            Err(VitrineError::InvalidInput(_))
        ));

        let envelope = seal(b"data", &test_key()).unwrap();
        assert!(matches!(
            open(&envelope, &[0u8; 31]),
            Err(VitrineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_wrong_nonce_length_rejected() {
        let key = test_key();
        let mut envelope = seal(b"data", &key).unwrap();
        envelope.nonce.truncate(8);

        let result = open(&envelope, &key);
        assert!(matches!(result, Err(VitrineError::InvalidInput(_))));
    }

    #[test]
    fn test_short_ciphertext_rejected() {
        let key = test_key();
        let envelope = CipherEnvelope {
            algorithm: CipherAlgorithm::Aes256Gcm,
            nonce: vec![0u8; NONCE_LEN],
            ciphertext: vec![0u8; TAG_LEN - 1],
        };

        let result = open(&envelope, &key);
        assert!(matches!(result, Err(VitrineError::InvalidInput(_))));
    }

    #[test]
    fn test_blob_roundtrip() {
        let key = test_key();
        let envelope = seal(b"packed payload", &key).unwrap();

        let blob = envelope.to_blob();
        assert_eq!(&blob[..NONCE_LEN], envelope.nonce.as_slice());

        let unpacked = CipherEnvelope::from_blob(&blob).unwrap();
        assert_eq!(unpacked, envelope);
        assert_eq!(open(&unpacked, &key).unwrap(), b"packed payload");
    }

    #[test]
    fn test_blob_too_short_rejected() {
        let result = CipherEnvelope::from_blob(&[0u8; NONCE_LEN + TAG_LEN - 1]);
        assert!(matches!(result, Err(VitrineError::InvalidInput(_))));
    }

    #[test]
    fn test_envelope_serde() {
        let key = test_key();
        let envelope = seal(b"wire format", &key).unwrap();

        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains("\"algorithm\":\"AES-256-GCM\""));

        let parsed: CipherEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, envelope);
        assert_eq!(open(&parsed, &key).unwrap(), b"wire format");
    }

    #[test]
    fn test_unknown_algorithm_rejected_at_parse() {
        let json = r#"{"algorithm":"ROT13","nonce":"AAAAAAAAAAAAAAAA","ciphertext":"AAAA"}"#;
        let result: Result<CipherEnvelope, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
