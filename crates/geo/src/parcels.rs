//! # Parcel Attribute Table
//!
//! In-memory parcel table loaded from CSV. Columns are classified on load:
//! a column whose non-empty cells all parse as numbers is numeric (empty cells
//! become NaN), anything else is kept as text. `fid` is the primary key.
//!
//! ## Table of Contents
//! 1. Parcel — One row
//! 2. ParcelTable — Rows plus schema
//! 3. CSV loading
//! 4. Conservation join
//! 5. Land-cover labels

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Primary key column
pub const FID_COLUMN: &str = "fid";
/// Alternate parcel number column
pub const ALTPARNO_COLUMN: &str = "ALTPARNO";

// ============================================================================
// 1. Parcel — One row
// ============================================================================

/// A single parcel row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parcel {
    /// Primary key
    pub fid: i64,
    /// Alternate parcel number
    pub altparno: String,
    /// Numeric attributes, indexed like `ParcelTable::numeric_fields`
    numeric: Vec<f64>,
    /// Text attributes, indexed like `ParcelTable::text_fields`
    text: Vec<String>,
    /// Conservation attributes joined by `fid`
    pub conservation: BTreeMap<String, String>,
}

impl Parcel {
    /// Numeric value by column index
    pub fn numeric(&self, index: usize) -> f64 {
        self.numeric.get(index).copied().unwrap_or(f64::NAN)
    }
}

// ============================================================================
// 2. ParcelTable — Rows plus schema
// ============================================================================

/// Parcel attribute table keyed by `fid`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParcelTable {
    numeric_fields: Vec<String>,
    text_fields: Vec<String>,
    parcels: Vec<Parcel>,
    index: HashMap<i64, usize>,
}

impl ParcelTable {
    /// Numeric column names, in file order
    pub fn numeric_fields(&self) -> &[String] {
        &self.numeric_fields
    }

    /// Text column names (excluding `fid` and `ALTPARNO`)
    pub fn text_fields(&self) -> &[String] {
        &self.text_fields
    }

    /// Index of a numeric column
    pub fn field_index(&self, field: &str) -> Option<usize> {
        self.numeric_fields.iter().position(|f| f == field)
    }

    pub fn has_numeric_field(&self, field: &str) -> bool {
        self.field_index(field).is_some()
    }

    /// Whether any column (key, numeric or text) has this name
    pub fn has_field(&self, field: &str) -> bool {
        field == FID_COLUMN
            || field == ALTPARNO_COLUMN
            || self.has_numeric_field(field)
            || self.text_fields.iter().any(|f| f == field)
    }

    pub fn len(&self) -> usize {
        self.parcels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parcels.is_empty()
    }

    pub fn parcels(&self) -> &[Parcel] {
        &self.parcels
    }

    pub fn get(&self, fid: i64) -> Option<&Parcel> {
        self.index.get(&fid).map(|&i| &self.parcels[i])
    }

    pub fn contains(&self, fid: i64) -> bool {
        self.index.contains_key(&fid)
    }

    /// Numeric value of one parcel's field
    pub fn value(&self, fid: i64, field: &str) -> Option<f64> {
        let idx = self.field_index(field)?;
        self.get(fid).map(|p| p.numeric(idx))
    }

    /// Text value of one parcel's field
    pub fn text_value(&self, fid: i64, field: &str) -> Option<&str> {
        let idx = self.text_fields.iter().position(|f| f == field)?;
        self.get(fid).and_then(|p| p.text.get(idx)).map(String::as_str)
    }

    /// Overwrite one numeric value in place
    pub fn set_value(&mut self, fid: i64, field: &str, value: f64) -> Result<(), ParcelError> {
        let idx = self
            .field_index(field)
            .ok_or_else(|| ParcelError::MissingColumn(field.to_string()))?;
        let row = *self.index.get(&fid).ok_or(ParcelError::UnknownParcel(fid))?;
        self.parcels[row].numeric[idx] = value;
        Ok(())
    }

    /// Whole numeric column in row order
    pub fn column(&self, field: &str) -> Option<Vec<f64>> {
        let idx = self.field_index(field)?;
        Some(self.parcels.iter().map(|p| p.numeric(idx)).collect())
    }

    /// All parcel ids in row order
    pub fn fids(&self) -> Vec<i64> {
        self.parcels.iter().map(|p| p.fid).collect()
    }

    /// All alternate parcel numbers in row order
    pub fn altparnos(&self) -> Vec<String> {
        self.parcels.iter().map(|p| p.altparno.clone()).collect()
    }

    /// Look up a parcel by its alternate number
    pub fn find_by_altparno(&self, altparno: &str) -> Option<&Parcel> {
        self.parcels.iter().find(|p| p.altparno == altparno)
    }

    /// Numeric columns whose name contains `marker` (the slider fields)
    pub fn cover_fields(&self, marker: &str) -> Vec<String> {
        self.numeric_fields
            .iter()
            .filter(|f| f.contains(marker))
            .cloned()
            .collect()
    }

    // ========================================================================
    // 3. CSV loading
    // ========================================================================

    /// Load a parcel table from a CSV file
    pub fn load_csv(path: &Path) -> Result<Self, ParcelError> {
        let file = std::fs::File::open(path)
            .map_err(|e| ParcelError::Io(path.to_path_buf(), e))?;
        let table = Self::from_csv_reader(file)?;
        tracing::info!(
            "Loaded {} parcels ({} numeric columns) from {}",
            table.len(),
            table.numeric_fields.len(),
            path.display()
        );
        Ok(table)
    }

    /// Parse a parcel table from any CSV reader
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, ParcelError> {
        let (headers, rows) = read_csv_records(reader)?;
        Self::from_records(headers, rows)
    }

    /// Build a table from a header row and string records
    pub fn from_records(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, ParcelError> {
        let fid_col = headers
            .iter()
            .position(|h| h == FID_COLUMN)
            .ok_or_else(|| ParcelError::MissingColumn(FID_COLUMN.to_string()))?;
        let alt_col = headers.iter().position(|h| h == ALTPARNO_COLUMN);

        // Classify remaining columns
        let mut numeric_cols = Vec::new();
        let mut text_cols = Vec::new();
        for (col, name) in headers.iter().enumerate() {
            if col == fid_col || Some(col) == alt_col {
                continue;
            }
            let numeric = rows.iter().all(|row| {
                let cell = row.get(col).map(|c| c.trim()).unwrap_or("");
                cell.is_empty() || cell.parse::<f64>().is_ok()
            });
            if numeric {
                numeric_cols.push(col);
            } else {
                text_cols.push(col);
            }
        }

        let mut table = ParcelTable {
            numeric_fields: numeric_cols.iter().map(|&c| headers[c].clone()).collect(),
            text_fields: text_cols.iter().map(|&c| headers[c].clone()).collect(),
            parcels: Vec::with_capacity(rows.len()),
            index: HashMap::with_capacity(rows.len()),
        };

        for (line, row) in rows.iter().enumerate() {
            let cell = |col: usize| row.get(col).map(|c| c.trim()).unwrap_or("");
            let fid = parse_fid(cell(fid_col)).ok_or_else(|| ParcelError::InvalidFid {
                row: line + 1,
                value: cell(fid_col).to_string(),
            })?;
            if table.index.insert(fid, table.parcels.len()).is_some() {
                return Err(ParcelError::DuplicateFid(fid));
            }
            table.parcels.push(Parcel {
                fid,
                altparno: alt_col.map(|c| cell(c).to_string()).unwrap_or_default(),
                numeric: numeric_cols
                    .iter()
                    .map(|&c| cell(c).parse::<f64>().unwrap_or(f64::NAN))
                    .collect(),
                text: text_cols.iter().map(|&c| cell(c).to_string()).collect(),
                conservation: BTreeMap::new(),
            });
        }

        Ok(table)
    }

    // ========================================================================
    // 4. Conservation join
    // ========================================================================

    /// Left-join a conservation CSV file on `fid`
    pub fn join_conservation_csv(&mut self, path: &Path, columns: &[String]) -> Result<usize, ParcelError> {
        let file = std::fs::File::open(path)
            .map_err(|e| ParcelError::Io(path.to_path_buf(), e))?;
        let joined = self.join_conservation(file, columns)?;
        tracing::info!(
            "Joined conservation data for {}/{} parcels from {}",
            joined,
            self.len(),
            path.display()
        );
        Ok(joined)
    }

    /// Left-join conservation records from a CSV reader. Returns the number of
    /// parcels that matched a conservation row.
    pub fn join_conservation<R: Read>(&mut self, reader: R, columns: &[String]) -> Result<usize, ParcelError> {
        let (headers, rows) = read_csv_records(reader)?;
        let fid_col = headers
            .iter()
            .position(|h| h == FID_COLUMN)
            .ok_or_else(|| ParcelError::MissingColumn(FID_COLUMN.to_string()))?;
        let wanted = columns
            .iter()
            .map(|name| {
                headers
                    .iter()
                    .position(|h| h == name)
                    .map(|col| (name.clone(), col))
                    .ok_or_else(|| ParcelError::MissingColumn(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut joined = 0;
        for row in &rows {
            let Some(fid) = row.get(fid_col).and_then(|c| parse_fid(c.trim())) else {
                continue;
            };
            let Some(&idx) = self.index.get(&fid) else {
                continue;
            };
            let parcel = &mut self.parcels[idx];
            for (name, col) in &wanted {
                let value = row.get(*col).map(|c| c.trim().to_string()).unwrap_or_default();
                parcel.conservation.insert(name.clone(), value);
            }
            joined += 1;
        }
        Ok(joined)
    }
}

/// Read a CSV into a header row and string records
pub(crate) fn read_csv_records<R: Read>(reader: R) -> Result<(Vec<String>, Vec<Vec<String>>), ParcelError> {
    let mut reader = csv::ReaderBuilder::new().flexible(false).from_reader(reader);
    let headers = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect::<Vec<_>>();
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(str::to_string).collect());
    }
    Ok((headers, rows))
}

/// Parse a parcel id, accepting integral floats such as `12.0`
pub fn parse_fid(value: &str) -> Option<i64> {
    if let Ok(fid) = value.parse::<i64>() {
        return Some(fid);
    }
    let float = value.parse::<f64>().ok()?;
    // i64::MAX as f64 rounds up to 2^63, which is already out of range
    let in_range = float >= i64::MIN as f64 && float < i64::MAX as f64;
    if float.is_finite() && float.fract() == 0.0 && in_range {
        Some(float as i64)
    } else {
        None
    }
}

// ============================================================================
// 5. Land-cover labels
// ============================================================================

/// NLCD class name for a `%coverNN` column
pub fn land_cover_label(column: &str) -> Option<&'static str> {
    let code = column.trim_start_matches(|c: char| !c.is_ascii_digit());
    let label = match code {
        "11" => "Open Water",
        "21" => "Developed, Open Space",
        "22" => "Developed, Low Intensity",
        "23" => "Developed, Medium Intensity",
        "24" => "Developed, High Intensity",
        "31" => "Barren Land (Rock/Sand/Clay)",
        "41" => "Deciduous Forest",
        "42" => "Evergreen Forest",
        "43" => "Mixed Forest",
        "52" => "Shrub/Scrub",
        "71" => "Grassland/Herbaceous",
        "81" => "Pasture/Hay",
        "82" => "Cultivated Crops",
        "90" => "Woody Wetlands",
        "95" => "Emergent Herbaceous Wetlands",
        _ => return None,
    };
    Some(label)
}

/// Errors from loading parcel tables
#[derive(Debug, thiserror::Error)]
pub enum ParcelError {
    #[error("Failed to read {0}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing column '{0}'")]
    MissingColumn(String),

    #[error("Row {row}: invalid fid '{value}'")]
    InvalidFid { row: usize, value: String },

    #[error("Duplicate fid {0}")]
    DuplicateFid(i64),

    #[error("Parcel {0} not found")]
    UnknownParcel(i64),
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
fid,ALTPARNO,%cover22,%cover41,slope,owner
1,A-1,0.2,0.6,0.05,Smith
2,A-2,,0.1,0.10,Jones
3,A-3,0.8,0.0,0.02,Lee
";

    #[test]
    fn test_columns_are_classified() {
        let table = ParcelTable::from_csv_reader(CSV.as_bytes()).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.numeric_fields(), &["%cover22", "%cover41", "slope"]);
        assert_eq!(table.text_fields(), &["owner"]);
        assert_eq!(table.cover_fields("%cover"), vec!["%cover22", "%cover41"]);
        assert!(table.value(2, "%cover22").unwrap().is_nan());
        assert_eq!(table.text_value(3, "owner"), Some("Lee"));
        assert_eq!(table.find_by_altparno("A-2").map(|p| p.fid), Some(2));
        assert!(table.has_field("fid"));
    }

    #[test]
    fn test_float_fids_are_coerced() {
        let table = ParcelTable::from_csv_reader("fid,ALTPARNO\n7.0,X\n".as_bytes()).unwrap();
        assert!(table.contains(7));
        assert_eq!(parse_fid("3.5"), None);
        assert_eq!(parse_fid("7.0"), Some(7));
        assert_eq!(parse_fid("1e300"), None);
        assert_eq!(parse_fid("-1e300"), None);
        assert_eq!(parse_fid("9.3e18"), None);
    }

    #[test]
    fn test_duplicate_fid_rejected() {
        let err = ParcelTable::from_csv_reader("fid,ALTPARNO\n1,A\n1,B\n".as_bytes()).unwrap_err();
        assert!(matches!(err, ParcelError::DuplicateFid(1)));
    }

    #[test]
    fn test_missing_fid_column() {
        let err = ParcelTable::from_csv_reader("id,ALTPARNO\n1,A\n".as_bytes()).unwrap_err();
        assert!(matches!(err, ParcelError::MissingColumn(ref c) if c == "fid"));
    }

    #[test]
    fn test_set_value_targets_one_row() {
        let mut table = ParcelTable::from_csv_reader(CSV.as_bytes()).unwrap();
        table.set_value(1, "%cover41", 0.8).unwrap();
        assert_eq!(table.value(1, "%cover41"), Some(0.8));
        assert_eq!(table.value(2, "%cover41"), Some(0.1));
        assert!(matches!(table.set_value(9, "%cover41", 0.1), Err(ParcelError::UnknownParcel(9))));
        assert!(matches!(table.set_value(1, "nope", 0.1), Err(ParcelError::MissingColumn(_))));
    }

    #[test]
    fn test_conservation_left_join() {
        let mut table = ParcelTable::from_csv_reader(CSV.as_bytes()).unwrap();
        let conservation = "fid,easement,priority\n1,yes,high\n3,no,low\n99,yes,low\n";
        let joined = table
            .join_conservation(conservation.as_bytes(), &["easement".to_string()])
            .unwrap();
        assert_eq!(joined, 2);
        assert_eq!(table.get(1).unwrap().conservation.get("easement").map(String::as_str), Some("yes"));
        assert!(table.get(2).unwrap().conservation.is_empty());
        assert!(!table.get(3).unwrap().conservation.contains_key("priority"));

        let err = table
            .join_conservation(conservation.as_bytes(), &["missing".to_string()])
            .unwrap_err();
        assert!(matches!(err, ParcelError::MissingColumn(_)));
    }

    #[test]
    fn test_land_cover_labels() {
        assert_eq!(land_cover_label("%cover41"), Some("Deciduous Forest"));
        assert_eq!(land_cover_label("%cover95"), Some("Emergent Herbaceous Wetlands"));
        assert_eq!(land_cover_label("slope"), None);
    }
}
