//! Device secret provisioning
//!
//! The local database is encrypted under a per-device secret that the user
//! never sees. The secret lives in the OS credential store and is created
//! exactly once; every caller observes the same 32 bytes for the lifetime
//! of the install.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::info;
use zeroize::Zeroize;

use crate::crypto::KEY_LEN;
use crate::error::{VitrineError, VitrineResult};

/// Default keyring service name
pub const KEYRING_SERVICE: &str = "vitrine";

/// Default keyring account under which the secret is stored
pub const KEYRING_ACCOUNT: &str = "device-secret";

/// The per-device database secret (256 bits)
///
/// Cloning is cheap; every copy wipes its own bytes on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceSecret {
    bytes: [u8; KEY_LEN],
}

impl DeviceSecret {
    /// Get the secret bytes
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl Drop for DeviceSecret {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

// Never print the secret in Debug output
impl fmt::Debug for DeviceSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSecret").finish_non_exhaustive()
    }
}

/// Where the encoded secret persists (OS keyring in production; memory in
/// tests)
///
/// The persisted encoding is lowercase hex of the 32 secret bytes.
pub trait SecretBackend: Send + Sync {
    /// Load the stored encoding, or `None` if no secret exists yet
    fn load(&self) -> VitrineResult<Option<String>>;

    /// Persist the encoding
    fn store(&self, encoded: &str) -> VitrineResult<()>;
}

/// OS credential-store backend using the `keyring` crate
pub struct KeyringBackend {
    service: String,
    account: String,
}

impl KeyringBackend {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn entry(&self) -> VitrineResult<keyring::Entry> {
        keyring::Entry::new(&self.service, &self.account)
            .map_err(|e| VitrineError::Keystore(e.to_string()))
    }
}

impl Default for KeyringBackend {
    fn default() -> Self {
        Self::new(KEYRING_SERVICE, KEYRING_ACCOUNT)
    }
}

impl SecretBackend for KeyringBackend {
    fn load(&self) -> VitrineResult<Option<String>> {
        match self.entry()?.get_password() {
            Ok(encoded) => Ok(Some(encoded)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(VitrineError::Keystore(e.to_string())),
        }
    }

    fn store(&self, encoded: &str) -> VitrineResult<()> {
        self.entry()?
            .set_password(encoded)
            .map_err(|e| VitrineError::Keystore(e.to_string()))
    }
}

/// In-memory backend for tests and ephemeral sessions
#[derive(Default)]
pub struct MemorySecretBackend {
    slot: Mutex<Option<String>>,
    stores: AtomicUsize,
}

impl MemorySecretBackend {
    /// How many times `store` has been called
    pub fn store_count(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }
}

impl SecretBackend for MemorySecretBackend {
    fn load(&self) -> VitrineResult<Option<String>> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| VitrineError::Keystore("secret slot lock poisoned".into()))?;
        Ok(slot.clone())
    }

    fn store(&self, encoded: &str) -> VitrineResult<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| VitrineError::Keystore("secret slot lock poisoned".into()))?;
        *slot = Some(encoded.to_string());
        self.stores.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// A shared backend handle works wherever a backend does
impl<B: SecretBackend + ?Sized> SecretBackend for std::sync::Arc<B> {
    fn load(&self) -> VitrineResult<Option<String>> {
        (**self).load()
    }

    fn store(&self, encoded: &str) -> VitrineResult<()> {
        (**self).store(encoded)
    }
}

/// Caches the device secret and serializes first-time generation
pub struct SecretStore {
    backend: Box<dyn SecretBackend>,
    cache: Mutex<Option<DeviceSecret>>,
}

impl SecretStore {
    /// Create a store over any backend
    pub fn new(backend: impl SecretBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            cache: Mutex::new(None),
        }
    }

    /// Create a store over the default OS keyring location
    pub fn with_keyring() -> Self {
        Self::new(KeyringBackend::default())
    }

    /// Return the device secret, creating and persisting it on first use
    ///
    /// The cache lock covers the whole load-or-generate sequence, so
    /// concurrent first calls still perform exactly one generation and one
    /// store. A present-but-undecodable stored value is an error, never a
    /// silent regeneration.
    pub fn get_or_create(&self) -> VitrineResult<DeviceSecret> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| VitrineError::Keystore("secret cache lock poisoned".into()))?;

        if let Some(secret) = cache.as_ref() {
            return Ok(secret.clone());
        }

        if let Some(encoded) = self.backend.load()? {
            let secret = decode_secret(&encoded)?;
            *cache = Some(secret.clone());
            return Ok(secret);
        }

        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        let secret = DeviceSecret { bytes };

        self.backend.store(&hex::encode(secret.as_bytes()))?;
        info!("generated new device secret");

        *cache = Some(secret.clone());
        Ok(secret)
    }
}

fn decode_secret(encoded: &str) -> VitrineResult<DeviceSecret> {
    let decoded = hex::decode(encoded)
        .map_err(|e| VitrineError::Keystore(format!("stored secret is not valid hex: {}", e)))?;

    if decoded.len() != KEY_LEN {
        return Err(VitrineError::Keystore(format!(
            "stored secret has {} bytes, expected {}",
            decoded.len(),
            KEY_LEN
        )));
    }

    let mut bytes = [0u8; KEY_LEN];
    bytes.copy_from_slice(&decoded);
    Ok(DeviceSecret { bytes })
}
