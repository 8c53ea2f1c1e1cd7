//! Hostile-input limits for backup import
//!
//! Backup archives come from user-chosen files, so every header field is
//! attacker controlled. The guard bounds the declared source size up
//! front, validates entry paths before anything is read, and meters real
//! byte counts while the stream decompresses: per-entry size, cumulative
//! decompressed total, and the running decompressed-to-compressed ratio.

use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::error::{VitrineError, VitrineResult};

/// Import limits
///
/// The defaults fit a phone-sized collection with room to spare; callers
/// with unusual needs can override individual fields.
#[derive(Debug, Clone)]
pub struct ImportLimits {
    /// Largest accepted archive file (compressed), in bytes
    pub max_source_bytes: u64,
    /// Largest accepted single entry (decompressed), in bytes
    pub max_entry_bytes: u64,
    /// Cap on total decompressed output, in bytes
    pub max_total_bytes: u64,
    /// Cap on the decompressed:compressed ratio
    pub max_ratio: u64,
}

impl Default for ImportLimits {
    fn default() -> Self {
        Self {
            max_source_bytes: 100 * 1024 * 1024,
            max_entry_bytes: 10 * 1024 * 1024,
            max_total_bytes: 500 * 1024 * 1024,
            max_ratio: 100,
        }
    }
}

/// Why an entry was passed over without failing the whole import
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The entry path failed validation
    UnsafePath,
    /// The entry declares more bytes than the per-entry limit
    TooLarge { declared: u64 },
    /// An attachment appeared before the records section
    OutOfOrder,
}

/// A non-fatal rejection, reported back in the import summary
#[derive(Debug, Clone)]
pub struct SkippedEntry {
    pub path: String,
    pub reason: SkipReason,
}

impl SkippedEntry {
    /// Human-readable line for the import summary
    pub fn describe(&self) -> String {
        match &self.reason {
            SkipReason::UnsafePath => format!("skipped entry with unsafe path: {}", self.path),
            SkipReason::TooLarge { declared } => {
                format!("skipped oversized entry {} ({} bytes)", self.path, declared)
            }
            SkipReason::OutOfOrder => {
                format!("skipped attachment before records section: {}", self.path)
            }
        }
    }
}

/// Wraps the raw archive source and counts compressed bytes actually pulled
pub struct CountingReader<R> {
    inner: R,
    count: Arc<AtomicU64>,
}

impl<R: Read> CountingReader<R> {
    /// Returns the reader and a handle on its byte counter
    pub fn new(inner: R) -> (Self, Arc<AtomicU64>) {
        let count = Arc::new(AtomicU64::new(0));
        (
            Self {
                inner,
                count: count.clone(),
            },
            count,
        )
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// Validate and normalize an archive entry path
///
/// Backslashes normalize to forward slashes first. Absolute paths, drive
/// letters, `..` segments, and empty or `.` segments are all rejected.
/// Returns the normalized relative path, or `None` for anything unsafe.
pub fn validate_entry_path(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }

    let normalized = raw.replace('\\', "/");
    if normalized.starts_with('/') || normalized.contains(':') {
        return None;
    }

    let mut segments = Vec::new();
    for segment in normalized.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return None;
        }
        segments.push(segment);
    }

    Some(segments.join("/"))
}

/// Meters one import stream against the limits
pub struct ImportGuard {
    limits: ImportLimits,
    compressed: Arc<AtomicU64>,
    decompressed: u64,
    skipped: Vec<SkippedEntry>,
}

impl ImportGuard {
    /// Up-front gate on the declared size of the archive file itself
    pub fn check_source_size(declared: u64, limits: &ImportLimits) -> VitrineResult<()> {
        if declared > limits.max_source_bytes {
            return Err(VitrineError::limit_exceeded(format!(
                "backup file declares {} bytes, limit is {}",
                declared, limits.max_source_bytes
            )));
        }
        Ok(())
    }

    pub fn new(limits: ImportLimits, compressed: Arc<AtomicU64>) -> Self {
        Self {
            limits,
            compressed,
            decompressed: 0,
            skipped: Vec::new(),
        }
    }

    /// Decide whether an entry may be read at all
    ///
    /// Returns the normalized path for admitted entries. Rejections are
    /// recorded as skips and the entry must be drained, not stored.
    pub fn admit(&mut self, raw_path: &str, declared_size: u64) -> Option<String> {
        let Some(path) = validate_entry_path(raw_path) else {
            warn!(path = raw_path, "skipping entry with unsafe path");
            self.skipped.push(SkippedEntry {
                path: raw_path.to_string(),
                reason: SkipReason::UnsafePath,
            });
            return None;
        };

        if declared_size > self.limits.max_entry_bytes {
            warn!(path = %path, declared = declared_size, "skipping oversized entry");
            self.skipped.push(SkippedEntry {
                path,
                reason: SkipReason::TooLarge {
                    declared: declared_size,
                },
            });
            return None;
        }

        Some(path)
    }

    /// Record an attachment that arrived before the records section
    pub fn skip_out_of_order(&mut self, path: &str) {
        warn!(path, "skipping attachment before records section");
        self.skipped.push(SkippedEntry {
            path: path.to_string(),
            reason: SkipReason::OutOfOrder,
        });
    }

    /// Account for decompressed bytes, aborting on the total or ratio caps
    pub fn consume(&mut self, n: u64) -> VitrineResult<()> {
        self.decompressed += n;

        if self.decompressed > self.limits.max_total_bytes {
            return Err(VitrineError::limit_exceeded(format!(
                "decompressed size exceeds {} bytes",
                self.limits.max_total_bytes
            )));
        }

        let compressed = self.compressed.load(Ordering::Relaxed);
        if compressed > 0
            && self.decompressed > compressed.saturating_mul(self.limits.max_ratio)
        {
            return Err(VitrineError::limit_exceeded(format!(
                "compression ratio exceeds {}:1",
                self.limits.max_ratio
            )));
        }

        Ok(())
    }

    /// Read an admitted entry completely, metering every chunk
    ///
    /// The buffer never grows past the per-entry limit even if the header
    /// understated the size.
    pub fn read_entry<R: Read>(
        &mut self,
        reader: &mut R,
        declared_size: u64,
    ) -> VitrineResult<Vec<u8>> {
        let capacity = declared_size.min(self.limits.max_entry_bytes) as usize;
        let mut buf = Vec::with_capacity(capacity);
        let mut chunk = [0u8; 8192];

        loop {
            let n = reader.read(&mut chunk)?;
            if n == 0 {
                return Ok(buf);
            }
            self.consume(n as u64)?;
            if (buf.len() + n) as u64 > self.limits.max_entry_bytes {
                return Err(VitrineError::limit_exceeded(format!(
                    "entry grew past {} bytes",
                    self.limits.max_entry_bytes
                )));
            }
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Skips recorded so far
    pub fn skipped(&self) -> &[SkippedEntry] {
        &self.skipped
    }

    /// Consume the guard, yielding the skip list for the import summary
    pub fn into_skipped(self) -> Vec<SkippedEntry> {
        self.skipped
    }
}
