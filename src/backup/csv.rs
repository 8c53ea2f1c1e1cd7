//! Spreadsheet-safe CSV export
//!
//! Spreadsheet applications execute cells that start with a formula
//! character, so a crafted record name like `=HYPERLINK(...)` would run
//! the moment an exported file is opened. Every field that reaches a CSV
//! file is sanitized first: all leading formula characters are stripped,
//! interior ones stay.

use std::io::Write;

use csv::Writer;

use crate::error::VitrineResult;

/// Characters a spreadsheet treats as the start of a formula
const FORMULA_CHARS: [char; 6] = ['=', '+', '-', '@', '\t', '\r'];

/// Strip all leading formula characters from a field
///
/// `"=1+1"` becomes `"1+1"`, `"=+@-cmd"` becomes `"cmd"`. Interior
/// occurrences are left alone.
pub fn sanitize_field(value: &str) -> String {
    value.trim_start_matches(&FORMULA_CHARS[..]).to_string()
}

/// Sanitize a field and apply standard CSV quoting
///
/// For callers assembling CSV lines by hand; `write_csv` quotes through
/// the writer instead.
pub fn escape_field(value: &str) -> String {
    let clean = sanitize_field(value);
    if clean.contains(',') || clean.contains('"') || clean.contains('\n') {
        format!("\"{}\"", clean.replace('"', "\"\""))
    } else {
        clean
    }
}

/// Write a header row and data rows, sanitizing every cell
pub fn write_csv<W: Write>(sink: W, headers: &[&str], rows: &[Vec<String>]) -> VitrineResult<()> {
    let mut writer = Writer::from_writer(sink);
    writer.write_record(headers.iter().map(|h| sanitize_field(h)))?;
    for row in rows {
        writer.write_record(row.iter().map(|cell| sanitize_field(cell)))?;
    }
    writer.flush()?;
    Ok(())
}
