//! Backup archive reader and writer
//!
//! The container is a gzip-compressed tar stream. Entry order is part of
//! the format: `manifest.json` always comes first, `records.json` second,
//! attachments after. On import the manifest's schema version gates
//! everything else, and the guard validates paths and meters every byte
//! before it is buffered.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder, Header};

use crate::error::{VitrineError, VitrineResult};

use super::guard::{CountingReader, ImportGuard, ImportLimits, SkippedEntry};
use super::manifest::BackupManifest;

/// Entry name of the manifest (always the first entry)
pub const MANIFEST_PATH: &str = "manifest.json";

/// Entry name of the records section (plaintext JSON or raw ciphertext)
pub const RECORDS_PATH: &str = "records.json";

/// Directory prefix for attachment entries
pub const ATTACHMENTS_DIR: &str = "attachments/";

/// Streams a backup archive in canonical entry order
pub struct ArchiveWriter<W: Write> {
    builder: Builder<GzEncoder<W>>,
}

impl<W: Write> ArchiveWriter<W> {
    /// Start an archive; the manifest is written immediately as the first
    /// entry
    pub fn new(sink: W, manifest: &BackupManifest) -> VitrineResult<Self> {
        let encoder = GzEncoder::new(sink, Compression::default());
        let mut builder = Builder::new(encoder);
        let manifest_json = serde_json::to_vec_pretty(manifest)?;
        append_entry(&mut builder, MANIFEST_PATH, &manifest_json)?;
        Ok(Self { builder })
    }

    /// Write the records section
    pub fn add_records(&mut self, bytes: &[u8]) -> VitrineResult<()> {
        append_entry(&mut self.builder, RECORDS_PATH, bytes)
    }

    /// Write one attachment under `attachments/`
    pub fn add_attachment(&mut self, name: &str, bytes: &[u8]) -> VitrineResult<()> {
        let path = format!("{}{}", ATTACHMENTS_DIR, name);
        append_entry(&mut self.builder, &path, bytes)
    }

    /// Flush the archive and gzip trailers and hand the sink back
    pub fn finish(self) -> VitrineResult<W> {
        let encoder = self.builder.into_inner()?;
        Ok(encoder.finish()?)
    }
}

fn append_entry<W: Write>(builder: &mut Builder<W>, path: &str, bytes: &[u8]) -> VitrineResult<()> {
    let mut header = Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(chrono::Utc::now().timestamp().max(0) as u64);
    header.set_cksum();
    builder.append_data(&mut header, path, bytes)?;
    Ok(())
}

/// One logical section of the archive, in stream order
pub enum Section<'a> {
    /// The records payload; ciphertext when the manifest says encrypted
    Records(&'a BackupManifest, Vec<u8>),
    /// One attachment, delivered only after the records section
    Attachment { name: String, bytes: Vec<u8> },
}

/// What a guarded read saw
#[derive(Debug)]
pub struct ReadOutcome {
    pub manifest: BackupManifest,
    pub saw_records: bool,
    pub skipped: Vec<SkippedEntry>,
}

/// Read a backup archive, enforcing structure and limits
///
/// `declared_len` is the archive file size as reported by the file system
/// or transfer layer; it is gated before a single byte is read. The
/// handler receives the records section first and attachments after —
/// attachments that arrive before the records section are recorded as
/// skips and never delivered. Unknown entries are drained but ignored.
pub fn read_archive<R: Read>(
    source: R,
    declared_len: u64,
    limits: &ImportLimits,
    mut handle: impl FnMut(Section<'_>) -> VitrineResult<()>,
) -> VitrineResult<ReadOutcome> {
    ImportGuard::check_source_size(declared_len, limits)?;

    let (counting, compressed) = CountingReader::new(source);
    let decoder = GzDecoder::new(counting);
    let mut archive = Archive::new(decoder);
    let mut guard = ImportGuard::new(limits.clone(), compressed);

    let mut entries = archive.entries()?;

    // The manifest must be the literal first entry; anything else means
    // the archive was not produced by this codec.
    let manifest = {
        let mut entry = entries
            .next()
            .ok_or_else(|| VitrineError::malformed("archive is empty"))??;
        let raw_path = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        if raw_path != MANIFEST_PATH {
            return Err(VitrineError::malformed(format!(
                "first entry must be {}, found {}",
                MANIFEST_PATH, raw_path
            )));
        }

        let declared = entry.size();
        if declared > limits.max_entry_bytes {
            return Err(VitrineError::malformed(format!(
                "manifest entry declares {} bytes",
                declared
            )));
        }

        let bytes = guard.read_entry(&mut entry, declared)?;
        let manifest: BackupManifest = serde_json::from_slice(&bytes)
            .map_err(|e| VitrineError::malformed(format!("manifest is not valid JSON: {}", e)))?;
        manifest.check_schema()?;
        manifest
    };

    let mut saw_records = false;
    for entry in entries {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            // Directories and friends normally carry no data, but their
            // bytes still count if they do.
            drain_entry(&mut guard, &mut entry)?;
            continue;
        }

        let declared = entry.size();
        let raw_path = String::from_utf8_lossy(&entry.path_bytes()).into_owned();

        let Some(path) = guard.admit(&raw_path, declared) else {
            drain_entry(&mut guard, &mut entry)?;
            continue;
        };

        if path == RECORDS_PATH {
            if saw_records {
                return Err(VitrineError::malformed("duplicate records section"));
            }
            saw_records = true;
            let bytes = guard.read_entry(&mut entry, declared)?;
            handle(Section::Records(&manifest, bytes))?;
        } else if let Some(name) = path.strip_prefix(ATTACHMENTS_DIR) {
            if !saw_records {
                guard.skip_out_of_order(&path);
                drain_entry(&mut guard, &mut entry)?;
                continue;
            }
            let bytes = guard.read_entry(&mut entry, declared)?;
            handle(Section::Attachment {
                name: name.to_string(),
                bytes,
            })?;
        } else {
            drain_entry(&mut guard, &mut entry)?;
        }
    }

    Ok(ReadOutcome {
        manifest,
        saw_records,
        skipped: guard.into_skipped(),
    })
}

// Entries the guard rejected (or the reader ignores) still have to be
// streamed past, and their bytes still count against the caps.
fn drain_entry<R: Read>(guard: &mut ImportGuard, entry: &mut R) -> VitrineResult<()> {
    let mut chunk = [0u8; 8192];
    loop {
        let n = entry.read(&mut chunk)?;
        if n == 0 {
            return Ok(());
        }
        guard.consume(n as u64)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::guard::SkipReason;
    use crate::archive::manifest::SCHEMA_VERSION;
    use rand::RngCore;
    use std::io::Cursor;

    /// Handcrafted tar.gz builder for hostile archives; writes header
    /// names directly so path validation in `tar::Builder` cannot get in
    /// the way.
    fn raw_archive(entries: &[(&[u8], &[u8])]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = Builder::new(encoder);
        for (name, bytes) in entries {
            let mut header = Header::new_gnu();
            {
                let gnu = header.as_gnu_mut().unwrap();
                gnu.name[..name.len()].copy_from_slice(name);
            }
            header.set_size(bytes.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, *bytes).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn manifest_json(schema: &str) -> Vec<u8> {
        let mut manifest = BackupManifest::new_plain(1, 1);
        manifest.schema_version = schema.to_string();
        serde_json::to_vec(&manifest).unwrap()
    }

    #[derive(Debug)]
    struct Collected {
        records: Option<Vec<u8>>,
        attachments: Vec<(String, Vec<u8>)>,
    }

    fn collect_all(
        archive: &[u8],
        limits: &ImportLimits,
    ) -> VitrineResult<(ReadOutcome, Collected)> {
        let declared = archive.len() as u64;
        let mut collected = Collected {
            records: None,
            attachments: Vec::new(),
        };
        let outcome = read_archive(Cursor::new(archive), declared, limits, |section| {
            match section {
                Section::Records(_, bytes) => collected.records = Some(bytes),
                Section::Attachment { name, bytes } => collected.attachments.push((name, bytes)),
            }
            Ok(())
        })?;
        Ok((outcome, collected))
    }

    #[test]
    fn test_writer_reader_roundtrip() {
        let manifest = BackupManifest::new_plain(2, 2);
        let mut writer = ArchiveWriter::new(Vec::new(), &manifest).unwrap();
        writer.add_records(b"[{\"id\":\"a\"},{\"id\":\"b\"}]").unwrap();
        writer.add_attachment("photo-1.jpg", b"jpeg bytes").unwrap();
        writer.add_attachment("photo-2.jpg", b"more jpeg bytes").unwrap();
        let archive = writer.finish().unwrap();

        let (outcome, collected) = collect_all(&archive, &ImportLimits::default()).unwrap();

        assert_eq!(outcome.manifest.schema_version, SCHEMA_VERSION);
        assert_eq!(outcome.manifest.record_count, 2);
        assert!(outcome.saw_records);
        assert!(outcome.skipped.is_empty());
        assert_eq!(
            collected.records.unwrap(),
            b"[{\"id\":\"a\"},{\"id\":\"b\"}]"
        );
        assert_eq!(
            collected.attachments,
            vec![
                ("photo-1.jpg".to_string(), b"jpeg bytes".to_vec()),
                ("photo-2.jpg".to_string(), b"more jpeg bytes".to_vec()),
            ]
        );
    }

    #[test]
    fn test_source_size_gated_before_reading() {
        let limits = ImportLimits {
            max_source_bytes: 10,
            ..ImportLimits::default()
        };
        let err = read_archive(Cursor::new(Vec::new()), 11, &limits, |_| {
            panic!("nothing should be delivered")
        })
        .unwrap_err();
        assert!(err.is_limit_exceeded());
    }

    #[test]
    fn test_first_entry_must_be_manifest() {
        let archive = raw_archive(&[(b"records.json", b"[]")]);
        let err = collect_all(&archive, &ImportLimits::default()).unwrap_err();
        assert!(matches!(err, VitrineError::ArchiveMalformed(_)));
    }

    #[test]
    fn test_empty_archive_is_malformed() {
        let archive = raw_archive(&[]);
        let err = collect_all(&archive, &ImportLimits::default()).unwrap_err();
        assert!(matches!(err, VitrineError::ArchiveMalformed(_)));
    }

    #[test]
    fn test_garbage_manifest_is_malformed() {
        let archive = raw_archive(&[(b"manifest.json", b"{ not json")]);
        let err = collect_all(&archive, &ImportLimits::default()).unwrap_err();
        assert!(matches!(err, VitrineError::ArchiveMalformed(_)));
    }

    #[test]
    fn test_schema_gate_fires_before_any_section() {
        let manifest = manifest_json("9.9.9");
        let archive = raw_archive(&[
            (b"manifest.json", manifest.as_slice()),
            (b"records.json", b"[{\"id\":\"a\"}]"),
        ]);

        let declared = archive.len() as u64;
        let mut deliveries = 0;
        let err = read_archive(
            Cursor::new(&archive),
            declared,
            &ImportLimits::default(),
            |_| {
                deliveries += 1;
                Ok(())
            },
        )
        .unwrap_err();

        assert!(matches!(
            err,
            VitrineError::IncompatibleSchema { ref found, .. } if found == "9.9.9"
        ));
        assert_eq!(deliveries, 0);
    }

    #[test]
    fn test_traversal_entry_skipped_and_never_delivered() {
        let manifest = manifest_json(SCHEMA_VERSION);
        let archive = raw_archive(&[
            (b"manifest.json", manifest.as_slice()),
            (b"records.json", b"[]"),
            (b"../../etc/passwd", b"pwned"),
        ]);

        let (outcome, collected) = collect_all(&archive, &ImportLimits::default()).unwrap();

        assert!(collected.attachments.is_empty());
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].path, "../../etc/passwd");
        assert_eq!(outcome.skipped[0].reason, SkipReason::UnsafePath);
    }

    #[test]
    fn test_drive_letter_entry_skipped() {
        let manifest = manifest_json(SCHEMA_VERSION);
        let archive = raw_archive(&[
            (b"manifest.json", manifest.as_slice()),
            (b"records.json", b"[]"),
            (b"C:\\evil.txt", b"pwned"),
        ]);

        let (outcome, collected) = collect_all(&archive, &ImportLimits::default()).unwrap();
        assert!(collected.attachments.is_empty());
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].reason, SkipReason::UnsafePath);
    }

    #[test]
    fn test_oversized_entry_skipped_non_fatally() {
        let manifest = manifest_json(SCHEMA_VERSION);
        let big = vec![0x42u8; 256];
        let archive = raw_archive(&[
            (b"manifest.json", manifest.as_slice()),
            (b"records.json", b"[]"),
            (b"attachments/huge.bin", big.as_slice()),
        ]);

        let limits = ImportLimits {
            max_entry_bytes: 192,
            ..ImportLimits::default()
        };
        let (outcome, collected) = collect_all(&archive, &limits).unwrap();

        assert!(collected.records.is_some());
        assert!(collected.attachments.is_empty());
        assert_eq!(outcome.skipped.len(), 1);
        assert!(matches!(
            outcome.skipped[0].reason,
            SkipReason::TooLarge { declared: 256 }
        ));
    }

    #[test]
    fn test_attachment_before_records_is_skipped() {
        let manifest = manifest_json(SCHEMA_VERSION);
        let archive = raw_archive(&[
            (b"manifest.json", manifest.as_slice()),
            (b"attachments/early.jpg", b"too soon"),
            (b"records.json", b"[]"),
        ]);

        let (outcome, collected) = collect_all(&archive, &ImportLimits::default()).unwrap();

        assert!(collected.records.is_some());
        assert!(collected.attachments.is_empty());
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].reason, SkipReason::OutOfOrder);
    }

    #[test]
    fn test_unknown_entries_are_ignored() {
        let manifest = manifest_json(SCHEMA_VERSION);
        let archive = raw_archive(&[
            (b"manifest.json", manifest.as_slice()),
            (b"records.json", b"[]"),
            (b"notes.txt", b"stray file"),
        ]);

        let (outcome, collected) = collect_all(&archive, &ImportLimits::default()).unwrap();
        assert!(collected.records.is_some());
        assert!(collected.attachments.is_empty());
        assert!(outcome.skipped.is_empty());
    }

    #[test]
    fn test_duplicate_records_section_is_malformed() {
        let manifest = manifest_json(SCHEMA_VERSION);
        let archive = raw_archive(&[
            (b"manifest.json", manifest.as_slice()),
            (b"records.json", b"[]"),
            (b"records.json", b"[]"),
        ]);

        let err = collect_all(&archive, &ImportLimits::default()).unwrap_err();
        assert!(matches!(err, VitrineError::ArchiveMalformed(_)));
    }

    #[test]
    fn test_decompression_bomb_aborts_import() {
        // 2 MiB of zeros squeezes far below 1% of its size in gzip; the
        // running ratio trips long before the entry finishes.
        let manifest = manifest_json(SCHEMA_VERSION);
        let zeros = vec![0u8; 2 * 1024 * 1024];
        let archive = raw_archive(&[
            (b"manifest.json", manifest.as_slice()),
            (b"records.json", zeros.as_slice()),
        ]);
        assert!(archive.len() < 16 * 1024);

        let err = collect_all(&archive, &ImportLimits::default()).unwrap_err();
        assert!(err.is_limit_exceeded());
    }

    #[test]
    fn test_cumulative_total_aborts_import() {
        // Incompressible payloads keep the ratio near 1:1 so only the
        // running total can trip.
        let mut rng = rand::thread_rng();
        let mut records = vec![0u8; 1024];
        rng.fill_bytes(&mut records);
        let mut attachment = vec![0u8; 2048];
        rng.fill_bytes(&mut attachment);

        let manifest = manifest_json(SCHEMA_VERSION);
        let archive = raw_archive(&[
            (b"manifest.json", manifest.as_slice()),
            (b"records.json", records.as_slice()),
            (b"attachments/a.bin", attachment.as_slice()),
        ]);

        let limits = ImportLimits {
            max_total_bytes: 2048,
            ..ImportLimits::default()
        };
        let err = collect_all(&archive, &limits).unwrap_err();
        assert!(err.is_limit_exceeded());
    }
}
