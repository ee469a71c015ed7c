//! Manifest CSV reading and writing.
//!
//! Inbound headers are normalised before the required-column check, so
//! `Biobank ID` and `biobank_id` name the same column. Outbound manifests
//! are always written in the descriptor's column order.

use std::collections::HashMap;

use genomic_core::manifest::{missing_columns, normalize_header};
use genomic_core::{ManifestKind, PipelineError};

/// One data row of an inbound manifest, keyed by normalised column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: HashMap<String, String>,
}

impl Row {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (normalize_header(k), v.to_string()))
                .collect(),
        }
    }

    /// Trimmed cell value; blank cells read as absent.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values
            .get(column)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn owned(&self, column: &str) -> Option<String> {
        self.get(column).map(str::to_string)
    }
}

/// A parsed inbound manifest.
#[derive(Debug, Clone, Default)]
pub struct ManifestTable {
    pub header: Vec<String>,
    pub rows: Vec<Row>,
}

fn invalid(file_name: &str, reason: impl Into<String>) -> PipelineError {
    PipelineError::InvalidStructure {
        file: file_name.to_string(),
        reason: reason.into(),
    }
}

/// Parse `text` as a manifest of `kind`.
///
/// A header without every required column, or a malformed CSV record,
/// yields [`PipelineError::InvalidStructure`]. Blank lines are skipped.
pub fn read_manifest(kind: ManifestKind, file_name: &str, text: &str) -> Result<ManifestTable, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let header: Vec<String> = reader
        .headers()
        .map_err(|e| invalid(file_name, e.to_string()))?
        .iter()
        .map(normalize_header)
        .collect();

    let missing = missing_columns(kind, &header);
    if !missing.is_empty() {
        return Err(invalid(file_name, format!("missing columns: {}", missing.join(", "))));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| invalid(file_name, e.to_string()))?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let values = header
            .iter()
            .cloned()
            .zip(record.iter().map(str::to_string))
            .collect();
        rows.push(Row { values });
    }

    Ok(ManifestTable { header, rows })
}

/// One outbound row; unset columns are written empty.
#[derive(Debug, Clone, Default)]
pub struct OutboundRow {
    cells: HashMap<&'static str, String>,
}

impl OutboundRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, column: &'static str, value: impl Into<String>) -> Self {
        self.cells.insert(column, value.into());
        self
    }

    pub fn set_opt(self, column: &'static str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }
}

/// Render rows under the fixed header of `kind`.
pub fn write_manifest(kind: ManifestKind, rows: &[OutboundRow]) -> Result<String, PipelineError> {
    let columns = kind.descriptor().columns;
    let mut writer = csv::Writer::from_writer(Vec::new());
    let csv_err = |e: csv::Error| PipelineError::Dependency(format!("csv: {e}"));

    writer.write_record(columns).map_err(csv_err)?;
    for row in rows {
        writer
            .write_record(columns.iter().map(|c| row.get(c).unwrap_or("")))
            .map_err(csv_err)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| PipelineError::Dependency(format!("csv: {e}")))?;
    String::from_utf8(bytes).map_err(|e| PipelineError::Dependency(format!("csv: {e}")))
}
