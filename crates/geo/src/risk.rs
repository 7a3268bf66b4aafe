//! # Risk Engine
//!
//! Scores every parcel against the configured threshold rules, sums the
//! derived risks into a cumulative risk and min-max normalizes it across the
//! whole table. Recomputed from scratch for every request.
//!
//! ## Table of Contents
//! 1. Rule evaluation
//! 2. Normalization
//! 3. RiskReport — Per-parcel results
//! 4. compute_risk — Main entry point

use serde::Serialize;
use std::collections::HashMap;

use crate::config::ThresholdRule;
use crate::parcels::ParcelTable;

// ============================================================================
// 1. Rule evaluation
// ============================================================================

/// Risk value for one field value. First threshold whose `check` is strictly
/// greater than `value` wins; everything else (including NaN) gets the default.
pub fn evaluate_rule(rule: &ThresholdRule, value: f64) -> f64 {
    rule.thresholds
        .iter()
        .find(|t| value < t.check)
        .map(|t| t.value)
        .unwrap_or(rule.default)
}

/// Whether a rule's checks ascend and its values never decrease, default
/// included. A rule that fails this can score a larger cover lower.
pub fn rule_is_monotonic(rule: &ThresholdRule) -> bool {
    let checks_ascend = rule.thresholds.windows(2).all(|w| w[0].check < w[1].check);
    let values_ascend = rule
        .thresholds
        .iter()
        .map(|t| t.value)
        .chain(std::iter::once(rule.default))
        .collect::<Vec<_>>()
        .windows(2)
        .all(|w| w[0] <= w[1]);
    checks_ascend && values_ascend
}

// ============================================================================
// 2. Normalization
// ============================================================================

/// How cumulative risk was scaled onto [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Normalization {
    /// Regular min-max scaling
    Scaled { min: f64, max: f64 },
    /// Every parcel has the same cumulative risk; no scale exists
    Degenerate { value: f64 },
    /// No parcels
    Empty,
}

/// Min-max scale `values` onto [0, 1].
///
/// Fails with `DegenerateRange` when all values are equal instead of
/// dividing by zero, and with `UnboundedRange` when the spread overflows.
pub fn min_max_normalize(values: &[f64]) -> Result<Vec<f64>, RiskError> {
    let (min, max) = min_max(values).ok_or(RiskError::EmptyInput)?;
    let range = max - min;
    if !range.is_finite() {
        return Err(RiskError::UnboundedRange { min, max });
    }
    if range == 0.0 {
        return Err(RiskError::DegenerateRange { value: min });
    }
    Ok(values.iter().map(|v| (v - min) / range).collect())
}

fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    let mut iter = values.iter().copied().filter(|v| !v.is_nan());
    let first = iter.next()?;
    Some(iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
}

// ============================================================================
// 3. RiskReport — Per-parcel results
// ============================================================================

/// Risk results for one parcel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParcelRisk {
    pub fid: i64,
    /// One derived risk per rule, in rule order
    pub sub_scores: Vec<f64>,
    /// Sum of `sub_scores`
    pub cumulative: f64,
    /// Cumulative risk scaled onto [0, 1]; `None` when normalization is degenerate
    pub normalized: Option<f64>,
}

/// Risk results for a whole table
#[derive(Debug, Clone)]
pub struct RiskReport {
    risk_fields: Vec<String>,
    rows: Vec<ParcelRisk>,
    index: HashMap<i64, usize>,
    normalization: Normalization,
}

impl RiskReport {
    /// Derived field names, in rule order
    pub fn risk_fields(&self) -> &[String] {
        &self.risk_fields
    }

    /// Per-parcel results in table row order
    pub fn rows(&self) -> &[ParcelRisk] {
        &self.rows
    }

    pub fn get(&self, fid: i64) -> Option<&ParcelRisk> {
        self.index.get(&fid).map(|&i| &self.rows[i])
    }

    pub fn normalization(&self) -> Normalization {
        self.normalization
    }

    pub fn is_degenerate(&self) -> bool {
        matches!(self.normalization, Normalization::Degenerate { .. })
    }

    /// One derived risk of one parcel
    pub fn sub_score(&self, fid: i64, risk_field: &str) -> Option<f64> {
        let col = self.risk_fields.iter().position(|f| f == risk_field)?;
        self.get(fid).and_then(|r| r.sub_scores.get(col).copied())
    }

    /// Cumulative risks in row order
    pub fn cumulative(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.cumulative).collect()
    }
}

// ============================================================================
// 4. compute_risk — Main entry point
// ============================================================================

/// Score every parcel of `table` against `rules`
pub fn compute_risk(table: &ParcelTable, rules: &[ThresholdRule]) -> Result<RiskReport, RiskError> {
    let columns = rules
        .iter()
        .map(|rule| {
            table
                .field_index(&rule.column)
                .ok_or_else(|| RiskError::MissingField {
                    rule: rule.id().to_string(),
                    field: rule.column.clone(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows: Vec<ParcelRisk> = table
        .parcels()
        .iter()
        .map(|parcel| {
            let sub_scores: Vec<f64> = rules
                .iter()
                .zip(&columns)
                .map(|(rule, &col)| evaluate_rule(rule, parcel.numeric(col)))
                .collect();
            ParcelRisk {
                fid: parcel.fid,
                cumulative: sub_scores.iter().sum(),
                sub_scores,
                normalized: None,
            }
        })
        .collect();

    let cumulative: Vec<f64> = rows.iter().map(|r| r.cumulative).collect();
    let normalization = match min_max_normalize(&cumulative) {
        Ok(scaled) => {
            for (row, value) in rows.iter_mut().zip(scaled) {
                row.normalized = Some(value);
            }
            let (min, max) = min_max(&cumulative).unwrap_or((0.0, 0.0));
            Normalization::Scaled { min, max }
        }
        Err(RiskError::DegenerateRange { value }) => {
            tracing::warn!(
                "All {} parcels share cumulative risk {}; normalized risk is undefined",
                rows.len(),
                value
            );
            Normalization::Degenerate { value }
        }
        Err(RiskError::EmptyInput) => Normalization::Empty,
        Err(e) => return Err(e),
    };

    let index = rows.iter().enumerate().map(|(i, r)| (r.fid, i)).collect();

    Ok(RiskReport {
        risk_fields: rules.iter().map(|r| r.new_column.clone()).collect(),
        rows,
        index,
        normalization,
    })
}

/// Errors from the risk engine
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RiskError {
    #[error("Rule '{rule}' references missing field '{field}'")]
    MissingField { rule: String, field: String },

    #[error("Cannot normalize: every value equals {value}")]
    DegenerateRange { value: f64 },

    #[error("Cannot normalize: range {min}..{max} is not finite")]
    UnboundedRange { min: f64, max: f64 },

    #[error("Cannot normalize an empty set of values")]
    EmptyInput,
}
