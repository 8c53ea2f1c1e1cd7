//! Storage seam between the backup service and the app's record store
//!
//! The service only needs three things from the store: hand over
//! everything for export, take a records payload back in, and persist
//! attachment bytes. `MemoryRecordStore` implements the trait over plain
//! JSON values and backs the service tests.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::error::{VitrineError, VitrineResult};

/// How imported records combine with what is already stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Keep existing records; incoming records with a known id are skipped
    Merge,
    /// Drop the existing collection first
    Replace,
}

/// One exported attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Everything the store hands over for an export
#[derive(Debug, Clone)]
pub struct ExportPayload {
    /// The full record collection as a JSON array
    pub records_json: Vec<u8>,
    pub record_count: u32,
    pub photo_count: u32,
    pub attachments: Vec<Attachment>,
}

/// Per-record outcome of an import
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub imported: u32,
    pub skipped: u32,
    pub errors: Vec<String>,
}

/// What the backup service needs from the app's storage layer
pub trait RecordStore {
    /// Snapshot the whole collection for export
    fn export_all(&self) -> VitrineResult<ExportPayload>;

    /// Apply a records payload (a JSON array) to the store
    ///
    /// Individual bad records are reported in the stats, not raised; a
    /// payload that is not a JSON array at all is an error.
    fn import_records(&mut self, records_json: &[u8], mode: ImportMode)
        -> VitrineResult<ImportStats>;

    /// Persist one attachment, overwriting any previous one with the name
    fn store_attachment(&mut self, name: &str, bytes: &[u8]) -> VitrineResult<()>;
}

/// In-memory store over raw JSON records, keyed by their `id` field
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Vec<Value>,
    attachments: BTreeMap<String, Vec<u8>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record, for building fixtures
    pub fn insert(&mut self, record: Value) {
        self.records.push(record);
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn attachment(&self, name: &str) -> Option<&[u8]> {
        self.attachments.get(name).map(Vec::as_slice)
    }

    pub fn records(&self) -> &[Value] {
        &self.records
    }
}

fn record_id(record: &Value) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

impl RecordStore for MemoryRecordStore {
    fn export_all(&self) -> VitrineResult<ExportPayload> {
        let records_json = serde_json::to_vec(&self.records)?;
        let attachments = self
            .attachments
            .iter()
            .map(|(name, bytes)| Attachment {
                name: name.clone(),
                bytes: bytes.clone(),
            })
            .collect::<Vec<_>>();
        Ok(ExportPayload {
            records_json,
            record_count: self.records.len() as u32,
            photo_count: attachments.len() as u32,
            attachments,
        })
    }

    fn import_records(
        &mut self,
        records_json: &[u8],
        mode: ImportMode,
    ) -> VitrineResult<ImportStats> {
        let incoming: Vec<Value> = serde_json::from_slice(records_json)
            .map_err(|e| VitrineError::invalid_input(format!("records payload: {}", e)))?;

        if mode == ImportMode::Replace {
            self.records.clear();
            self.attachments.clear();
        }

        let mut known: BTreeSet<String> = self
            .records
            .iter()
            .filter_map(|r| record_id(r).map(str::to_string))
            .collect();

        let mut stats = ImportStats::default();
        for (index, record) in incoming.into_iter().enumerate() {
            let Some(id) = record_id(&record).map(str::to_string) else {
                stats
                    .errors
                    .push(format!("record {} has no id field", index));
                continue;
            };
            if known.contains(&id) {
                stats.skipped += 1;
                continue;
            }
            known.insert(id);
            self.records.push(record);
            stats.imported += 1;
        }

        Ok(stats)
    }

    fn store_attachment(&mut self, name: &str, bytes: &[u8]) -> VitrineResult<()> {
        self.attachments.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }
}
