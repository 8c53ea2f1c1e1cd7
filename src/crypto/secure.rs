//! Secure memory handling for sensitive data
//!
//! Provides a password buffer that zeros its memory on drop so credentials
//! do not linger on the heap after use.

use std::fmt;

use zeroize::Zeroize;

/// A password supplied by the user
///
/// The bytes are wiped when the value is dropped, and neither `Debug` nor
/// `Display` ever print the contents.
pub struct Credential {
    inner: Vec<u8>,
}

impl Credential {
    /// Create a new Credential from anything string-like
    pub fn new(s: impl Into<String>) -> Self {
        let mut s = s.into();
        let inner = s.as_bytes().to_vec();
        s.zeroize();
        Self { inner }
    }

    /// Get the password bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.inner
    }

    /// Get the length in bytes
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

impl From<String> for Credential {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Credential {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// Don't print the contents in Debug output
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("len", &self.inner.len())
            .finish()
    }
}

// Don't print the contents in Display output
impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED {} bytes]", self.inner.len())
    }
}
