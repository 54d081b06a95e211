use serde::Serialize;
use std::io::Write;

use crate::store::UrlRecord;

/// One frontier record as written to a JSONL export.
#[derive(Debug, Clone, Serialize)]
pub struct ExportRecord {
    pub url: String,
    /// Hex SHA-256 of the normalized URL
    pub hash: String,
    pub completed: bool,
}

impl From<UrlRecord> for ExportRecord {
    fn from(record: UrlRecord) -> Self {
        Self {
            url: record.url,
            hash: record.hash,
            completed: record.completed,
        }
    }
}

/// Write records as JSON Lines, optionally only those still pending.
///
/// Returns the number of lines written.
pub fn export_to_jsonl<W: Write, I: IntoIterator<Item = ExportRecord>>(
    records: I,
    pending_only: bool,
    writer: &mut W,
) -> Result<usize, Box<dyn std::error::Error>> {
    let mut written = 0;
    for record in records {
        if pending_only && record.completed {
            continue;
        }
        serde_json::to_writer(&mut *writer, &record)?;
        writer.write_all(b"\n")?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}
