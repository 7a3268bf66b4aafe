//! Selected-parcel info table: covers, derived risks and conservation values.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::parcels::ParcelTable;
use crate::risk::RiskReport;

/// A named numeric cell; NaN becomes `None`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedValue {
    pub name: String,
    pub value: Option<f64>,
}

impl NamedValue {
    fn new(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value: if value.is_nan() { None } else { Some(value) },
        }
    }
}

/// One row of the parcel info table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParcelSummary {
    pub fid: i64,
    pub altparno: String,
    pub covers: Vec<NamedValue>,
    pub risks: Vec<NamedValue>,
    pub cum_risk: f64,
    pub cum_risk_normalized: Option<f64>,
    pub conservation: BTreeMap<String, String>,
}

/// Info table for the selection. No selection gives an empty table.
pub fn parcel_summary(
    table: &ParcelTable,
    report: &RiskReport,
    cover_fields: &[String],
    conservation_columns: &[String],
    parcel_id: Option<i64>,
) -> Result<Vec<ParcelSummary>, SummaryError> {
    let Some(fid) = parcel_id else {
        return Ok(Vec::new());
    };
    let parcel = table.get(fid).ok_or(SummaryError::UnknownParcel(fid))?;
    let risk = report.get(fid).ok_or(SummaryError::UnknownParcel(fid))?;

    let covers = cover_fields
        .iter()
        .filter_map(|field| table.field_index(field).map(|idx| NamedValue::new(field, parcel.numeric(idx))))
        .collect();
    let risks = report
        .risk_fields()
        .iter()
        .zip(&risk.sub_scores)
        .map(|(name, &value)| NamedValue::new(name, value))
        .collect();
    let conservation = conservation_columns
        .iter()
        .filter_map(|c| parcel.conservation.get(c).map(|v| (c.clone(), v.clone())))
        .collect();

    Ok(vec![ParcelSummary {
        fid,
        altparno: parcel.altparno.clone(),
        covers,
        risks,
        cum_risk: risk.cumulative,
        cum_risk_normalized: risk.normalized,
        conservation,
    }])
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SummaryError {
    #[error("Parcel {0} not found")]
    UnknownParcel(i64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Threshold, ThresholdRule};
    use crate::risk::compute_risk;

    #[test]
    fn test_summary_for_selection() {
        let mut table = ParcelTable::from_csv_reader(
            "fid,ALTPARNO,%cover22,%cover41\n1,A,0.3,\n2,B,0.7,0.5\n".as_bytes(),
        )
        .unwrap();
        table
            .join_conservation("fid,easement\n1,yes\n".as_bytes(), &["easement".to_string()])
            .unwrap();
        let rules = vec![ThresholdRule {
            id: None,
            column: "%cover22".to_string(),
            new_column: "risk22".to_string(),
            thresholds: vec![Threshold { check: 0.5, value: 1.0 }],
            default: 2.0,
        }];
        let report = compute_risk(&table, &rules).unwrap();
        let covers = table.cover_fields("%cover");
        let columns = vec!["easement".to_string()];

        assert!(parcel_summary(&table, &report, &covers, &columns, None).unwrap().is_empty());

        let rows = parcel_summary(&table, &report, &covers, &columns, Some(1)).unwrap();
        let row = &rows[0];
        assert_eq!(row.altparno, "A");
        assert_eq!(row.covers[0], NamedValue { name: "%cover22".to_string(), value: Some(0.3) });
        assert_eq!(row.covers[1].value, None);
        assert_eq!(row.risks[0].value, Some(1.0));
        assert_eq!(row.cum_risk, 1.0);
        assert_eq!(row.cum_risk_normalized, Some(0.0));
        assert_eq!(row.conservation.get("easement").map(String::as_str), Some("yes"));

        assert_eq!(
            parcel_summary(&table, &report, &covers, &columns, Some(3)),
            Err(SummaryError::UnknownParcel(3))
        );
    }
}
