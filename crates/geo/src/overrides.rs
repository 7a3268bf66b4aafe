//! # Cover Overrides
//!
//! Slider edits are applied on top of the base parcel table. `apply_overrides`
//! edits a table in place; `OverrideSet` keeps edits apart from the base table
//! so each session recomputes from (base, overrides) without touching shared
//! state.
//!
//! ## Table of Contents
//! 1. In-place application
//! 2. OverrideSet — Versioned per-session edits
//! 3. Sliders

use serde::Serialize;
use std::collections::BTreeMap;

use crate::parcels::{land_cover_label, ParcelError, ParcelTable};

// ============================================================================
// 1. In-place application
// ============================================================================

/// Slider values of `None` or `0.0` mean "no edit"
pub fn is_truthy(value: Option<f64>) -> bool {
    matches!(value, Some(v) if v != 0.0)
}

/// Set truthy `(field, value)` pairs on the row of `parcel_id`.
///
/// Only slider fields (numeric columns containing `cover_marker`) can be
/// edited. Returns the number of fields written. Falsy values leave the
/// stored value unchanged.
pub fn apply_overrides(
    table: &mut ParcelTable,
    cover_marker: &str,
    parcel_id: i64,
    pairs: &[(String, Option<f64>)],
) -> Result<usize, OverrideError> {
    check_pairs(table, cover_marker, parcel_id, pairs)?;
    write_truthy(table, parcel_id, pairs)
}

fn write_truthy(
    table: &mut ParcelTable,
    parcel_id: i64,
    pairs: &[(String, Option<f64>)],
) -> Result<usize, OverrideError> {
    let mut written = 0;
    for (field, value) in pairs {
        let Some(v) = value.filter(|&v| is_truthy(Some(v))) else {
            continue;
        };
        table.set_value(parcel_id, field, v).map_err(|e| match e {
            ParcelError::UnknownParcel(fid) => OverrideError::UnknownParcel(fid),
            _ => OverrideError::UnknownField(field.clone()),
        })?;
        written += 1;
    }
    Ok(written)
}

fn check_pairs(
    table: &ParcelTable,
    cover_marker: &str,
    parcel_id: i64,
    pairs: &[(String, Option<f64>)],
) -> Result<(), OverrideError> {
    if !table.contains(parcel_id) {
        return Err(OverrideError::UnknownParcel(parcel_id));
    }
    let cover_fields = table.cover_fields(cover_marker);
    if let Some((field, _)) = pairs.iter().find(|(f, _)| !cover_fields.contains(f)) {
        return Err(OverrideError::UnknownField(field.clone()));
    }
    Ok(())
}

// ============================================================================
// 2. OverrideSet — Versioned per-session edits
// ============================================================================

/// Cover edits keyed by parcel then field. `version` increases on every change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OverrideSet {
    values: BTreeMap<i64, BTreeMap<String, f64>>,
    version: u64,
}

impl OverrideSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of parcels with at least one edit
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, parcel_id: i64, field: &str) -> Option<f64> {
        self.values.get(&parcel_id).and_then(|m| m.get(field)).copied()
    }

    /// Record truthy pairs for `parcel_id`, validated against the slider
    /// fields of `base`
    pub fn set(
        &mut self,
        base: &ParcelTable,
        cover_marker: &str,
        parcel_id: i64,
        pairs: &[(String, Option<f64>)],
    ) -> Result<usize, OverrideError> {
        check_pairs(base, cover_marker, parcel_id, pairs)?;
        let mut written = 0;
        for (field, value) in pairs {
            let Some(v) = value.filter(|&v| is_truthy(Some(v))) else {
                continue;
            };
            self.values
                .entry(parcel_id)
                .or_default()
                .insert(field.clone(), v);
            written += 1;
        }
        if written > 0 {
            self.version += 1;
        }
        Ok(written)
    }

    /// Drop all edits of one parcel
    pub fn reset_parcel(&mut self, parcel_id: i64) -> bool {
        let removed = self.values.remove(&parcel_id).is_some();
        if removed {
            self.version += 1;
        }
        removed
    }

    /// Drop every edit
    pub fn clear(&mut self) {
        if !self.values.is_empty() {
            self.values.clear();
            self.version += 1;
        }
    }

    /// Copy `base` and apply every edit to the copy
    pub fn apply_to(&self, base: &ParcelTable) -> Result<ParcelTable, OverrideError> {
        let mut table = base.clone();
        for (&parcel_id, fields) in &self.values {
            let pairs: Vec<(String, Option<f64>)> =
                fields.iter().map(|(f, &v)| (f.clone(), Some(v))).collect();
            write_truthy(&mut table, parcel_id, &pairs)?;
        }
        Ok(table)
    }
}

// ============================================================================
// 3. Sliders
// ============================================================================

pub const SLIDER_MIN: f64 = 0.0;
pub const SLIDER_MAX: f64 = 1.0;
pub const SLIDER_STEP: f64 = 0.2;

/// One land-cover slider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SliderSpec {
    pub field: String,
    pub label: Option<&'static str>,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub value: f64,
}

/// Current slider values: the parcel's covers, or zeros without a selection
pub fn slider_values(
    table: &ParcelTable,
    cover_fields: &[String],
    parcel_id: Option<i64>,
) -> Result<Vec<f64>, OverrideError> {
    let Some(parcel_id) = parcel_id else {
        return Ok(vec![0.0; cover_fields.len()]);
    };
    if !table.contains(parcel_id) {
        return Err(OverrideError::UnknownParcel(parcel_id));
    }
    cover_fields
        .iter()
        .map(|field| {
            table
                .value(parcel_id, field)
                .ok_or_else(|| OverrideError::UnknownField(field.clone()))
        })
        .collect()
}

/// Slider descriptions for every cover field of `table`
pub fn slider_specs(
    table: &ParcelTable,
    cover_marker: &str,
    parcel_id: Option<i64>,
) -> Result<Vec<SliderSpec>, OverrideError> {
    let fields = table.cover_fields(cover_marker);
    let values = slider_values(table, &fields, parcel_id)?;
    Ok(fields
        .into_iter()
        .zip(values)
        .map(|(field, value)| SliderSpec {
            label: land_cover_label(&field),
            field,
            min: SLIDER_MIN,
            max: SLIDER_MAX,
            step: SLIDER_STEP,
            value,
        })
        .collect())
}

/// Errors from applying cover overrides
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OverrideError {
    #[error("Parcel {0} not found")]
    UnknownParcel(i64),

    #[error("Unknown cover field '{0}'")]
    UnknownField(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ParcelTable {
        ParcelTable::from_csv_reader(
            "fid,ALTPARNO,%cover22,%cover41,slope\n1,A,0.2,0.6,0.1\n2,B,0.4,0.2,0.3\n".as_bytes(),
        )
        .unwrap()
    }

    fn pair(field: &str, value: Option<f64>) -> (String, Option<f64>) {
        (field.to_string(), value)
    }

    #[test]
    fn test_falsy_values_leave_row_unchanged() {
        let mut t = table();
        let written = apply_overrides(&mut t, "%cover", 1, &[pair("%cover22", None), pair("%cover41", Some(0.0))]).unwrap();
        assert_eq!(written, 0);
        assert_eq!(t, table());
    }

    #[test]
    fn test_truthy_value_touches_only_target_row() {
        let mut t = table();
        let written = apply_overrides(&mut t, "%cover", 1, &[pair("%cover22", Some(0.8))]).unwrap();
        assert_eq!(written, 1);
        assert_eq!(t.value(1, "%cover22"), Some(0.8));
        assert_eq!(t.value(1, "%cover41"), Some(0.6));
        assert_eq!(t.value(2, "%cover22"), Some(0.4));
    }

    #[test]
    fn test_unknown_parcel_and_field() {
        let mut t = table();
        assert_eq!(
            apply_overrides(&mut t, "%cover", 9, &[pair("%cover22", Some(0.8))]),
            Err(OverrideError::UnknownParcel(9))
        );
        assert_eq!(
            apply_overrides(&mut t, "%cover", 1, &[pair("%cover99", Some(0.8))]),
            Err(OverrideError::UnknownField("%cover99".to_string()))
        );
        assert_eq!(t, table());
    }

    #[test]
    fn test_only_slider_fields_are_editable() {
        let mut t = table();
        assert_eq!(
            apply_overrides(&mut t, "%cover", 1, &[pair("slope", Some(0.9))]),
            Err(OverrideError::UnknownField("slope".to_string()))
        );
        let mut set = OverrideSet::new();
        assert_eq!(
            set.set(&t, "%cover", 1, &[pair("%cover22", Some(0.5)), pair("slope", Some(0.9))]),
            Err(OverrideError::UnknownField("slope".to_string()))
        );
        assert!(set.is_empty());
        assert_eq!(t, table());
    }

    #[test]
    fn test_override_set_keeps_base_untouched() {
        let base = table();
        let mut set = OverrideSet::new();
        assert_eq!(set.set(&base, "%cover", 2, &[pair("%cover41", Some(1.0)), pair("%cover22", None)]).unwrap(), 1);
        assert_eq!(set.version(), 1);

        let edited = set.apply_to(&base).unwrap();
        assert_eq!(edited.value(2, "%cover41"), Some(1.0));
        assert_eq!(edited.value(2, "%cover22"), Some(0.4));
        assert_eq!(base.value(2, "%cover41"), Some(0.2));

        assert!(set.reset_parcel(2));
        assert_eq!(set.version(), 2);
        assert_eq!(set.apply_to(&base).unwrap(), base);
        assert!(!set.reset_parcel(2));
        assert_eq!(set.version(), 2);
    }

    #[test]
    fn test_falsy_set_does_not_bump_version() {
        let base = table();
        let mut set = OverrideSet::new();
        set.set(&base, "%cover", 1, &[pair("%cover22", Some(0.0))]).unwrap();
        assert_eq!(set.version(), 0);
        assert!(set.is_empty());
    }

    #[test]
    fn test_slider_reset_values() {
        let t = table();
        let fields = t.cover_fields("%cover");
        assert_eq!(slider_values(&t, &fields, None).unwrap(), vec![0.0, 0.0]);
        assert_eq!(slider_values(&t, &fields, Some(2)).unwrap(), vec![0.4, 0.2]);
        assert_eq!(slider_values(&t, &fields, Some(5)), Err(OverrideError::UnknownParcel(5)));

        let specs = slider_specs(&t, "%cover", Some(1)).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1].field, "%cover41");
        assert_eq!(specs[1].label, Some("Deciduous Forest"));
        assert_eq!(specs[1].step, 0.2);
        assert_eq!(specs[1].value, 0.6);
    }
}
