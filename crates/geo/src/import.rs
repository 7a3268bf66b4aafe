//! # Tabular Data Import
//!
//! Validates an uploaded table and overwrites the on-disk CSV it replaces.
//! CSV is always accepted; spreadsheets need the `spreadsheet` feature.
//! Overwrites are a plain write with no backup.
//!
//! ## Table of Contents
//! 1. UploadedTable — Parsed upload
//! 2. Parsing by extension
//! 3. validate_and_store — Main entry point

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::parcels::read_csv_records;

// ============================================================================
// 1. UploadedTable — Parsed upload
// ============================================================================

/// Header plus data rows of an uploaded file
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl UploadedTable {
    /// Data rows, header excluded
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Serialize back to CSV bytes
    pub fn to_csv(&self) -> Result<Vec<u8>, ImportError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(&self.headers)
            .map_err(|e| ImportError::Parse(e.to_string()))?;
        for row in &self.rows {
            writer
                .write_record(row)
                .map_err(|e| ImportError::Parse(e.to_string()))?;
        }
        writer
            .into_inner()
            .map_err(|e| ImportError::Parse(e.to_string()))
    }
}

/// Accepted upload
#[derive(Debug, Clone, Serialize)]
pub struct ImportOutcome {
    /// Filename as uploaded
    pub filename: String,
    /// Data rows written
    pub rows: usize,
    /// File that was overwritten
    pub target: PathBuf,
    pub accepted_at: DateTime<Utc>,
}

// ============================================================================
// 2. Parsing by extension
// ============================================================================

/// Parse raw upload bytes, choosing the reader from the filename extension
pub fn parse_upload(bytes: &[u8], filename: &str) -> Result<UploadedTable, ImportError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "csv" => parse_csv(bytes),
        #[cfg(feature = "spreadsheet")]
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => parse_spreadsheet(bytes),
        _ => Err(ImportError::UnsupportedFormat(filename.to_string())),
    }
}

fn parse_csv(bytes: &[u8]) -> Result<UploadedTable, ImportError> {
    let (headers, rows) = read_csv_records(bytes).map_err(|e| ImportError::Parse(e.to_string()))?;
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(ImportError::Parse("missing header row".to_string()));
    }
    Ok(UploadedTable { headers, rows })
}

/// First worksheet; first row is the header
#[cfg(feature = "spreadsheet")]
fn parse_spreadsheet(bytes: &[u8]) -> Result<UploadedTable, ImportError> {
    use calamine::{open_workbook_auto_from_rs, Data, Reader};

    let cursor = std::io::Cursor::new(bytes.to_vec());
    let mut workbook =
        open_workbook_auto_from_rs(cursor).map_err(|e| ImportError::Parse(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ImportError::Parse("workbook has no sheets".to_string()))?
        .map_err(|e| ImportError::Parse(e.to_string()))?;

    let cell_text = |cell: &Data| match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    };

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .ok_or_else(|| ImportError::Parse("sheet is empty".to_string()))?
        .iter()
        .map(cell_text)
        .collect();
    let rows = rows.map(|r| r.iter().map(cell_text).collect()).collect();
    Ok(UploadedTable { headers, rows })
}

// ============================================================================
// 3. validate_and_store — Main entry point
// ============================================================================

/// Parse `bytes`, require exactly `expected_rows` data rows, then overwrite
/// `target` with the table as CSV. Nothing is written on failure.
pub fn validate_and_store(
    bytes: &[u8],
    filename: &str,
    target: &Path,
    expected_rows: usize,
) -> Result<ImportOutcome, ImportError> {
    let table = parse_upload(bytes, filename)?;
    if table.row_count() != expected_rows {
        tracing::warn!(
            "Rejected upload {}: {} rows, expected {}",
            filename,
            table.row_count(),
            expected_rows
        );
        return Err(ImportError::RowCount {
            expected: expected_rows,
            actual: table.row_count(),
        });
    }

    let csv = table.to_csv()?;
    std::fs::write(target, csv).map_err(|e| ImportError::Io(target.to_path_buf(), e))?;

    tracing::info!(
        "Accepted upload {} ({} rows) into {}",
        filename,
        table.row_count(),
        target.display()
    );

    Ok(ImportOutcome {
        filename: filename.to_string(),
        rows: table.row_count(),
        target: target.to_path_buf(),
        accepted_at: Utc::now(),
    })
}

/// Errors from upload validation
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to parse upload: {0}")]
    Parse(String),

    #[error("Expected {expected} rows, got {actual}")]
    RowCount { expected: usize, actual: usize },

    #[error("Failed to write {0}: {1}")]
    Io(PathBuf, std::io::Error),
}

impl ImportError {
    /// Short message safe to show to the person who uploaded the file
    pub fn user_message(&self) -> String {
        match self {
            ImportError::RowCount { expected, .. } => {
                format!("The uploaded file must have exactly {} rows.", expected)
            }
            _ => "There was an error processing this file.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn csv_with_rows(n: usize) -> String {
        let mut out = String::from("fid,ALTPARNO,%cover22\n");
        for i in 0..n {
            out.push_str(&format!("{},P-{},0.2\n", i, i));
        }
        out
    }

    #[test]
    fn test_exact_row_count_overwrites_target() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("cata_data.csv");
        std::fs::write(&target, "old").unwrap();

        let upload = csv_with_rows(419);
        let outcome = validate_and_store(upload.as_bytes(), "new.csv", &target, 419).unwrap();

        assert_eq!(outcome.rows, 419);
        assert_eq!(outcome.filename, "new.csv");
        let written = std::fs::read_to_string(&target).unwrap();
        assert_eq!(written, upload);
    }

    #[test]
    fn test_wrong_row_count_leaves_target() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("cata_data.csv");
        std::fs::write(&target, "old").unwrap();

        for n in [418, 420] {
            let err = validate_and_store(csv_with_rows(n).as_bytes(), "new.csv", &target, 419).unwrap_err();
            assert!(matches!(err, ImportError::RowCount { expected: 419, actual } if actual == n));
            assert_eq!(err.user_message(), "The uploaded file must have exactly 419 rows.");
        }
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "old");
    }

    #[test]
    fn test_unsupported_and_unparseable() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("cata_data.csv");

        let err = validate_and_store(b"hello", "notes.txt", &target, 1).unwrap_err();
        assert!(matches!(err, ImportError::UnsupportedFormat(_)));
        assert_eq!(err.user_message(), "There was an error processing this file.");

        let ragged = "a,b\n1,2,3\n";
        let err = validate_and_store(ragged.as_bytes(), "ragged.csv", &target, 1).unwrap_err();
        assert!(matches!(err, ImportError::Parse(_)));
        assert!(!target.exists());
    }

    #[cfg(feature = "spreadsheet")]
    #[test]
    fn test_garbage_spreadsheet_is_parse_error() {
        let err = parse_upload(b"not a workbook", "data.xlsx").unwrap_err();
        assert!(matches!(err, ImportError::Parse(_)));
    }
}
