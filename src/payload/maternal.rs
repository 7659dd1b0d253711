//! Maternal vitals record: six numeric fields read from one CSV row.

use serde::{Deserialize, Serialize};

use super::parse_float_prefix;
use crate::csv::RawCsvTable;
use crate::error::UploadError;

/// Required columns, in the order errors list them.
pub const REQUIRED_FIELDS: [&str; 6] = [
    "Age",
    "SystolicBP",
    "DiastolicBP",
    "BS",
    "BodyTemp",
    "HeartRate",
];

/// Body of a maternal prediction request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[allow(non_snake_case)]
pub struct MaternalRecord {
    pub Age: f64,
    pub SystolicBP: f64,
    pub DiastolicBP: f64,
    pub BS: f64,
    pub BodyTemp: f64,
    pub HeartRate: f64,
}

impl MaternalRecord {
    /// `(field, value)` pairs in column order.
    pub fn fields(&self) -> [(&'static str, f64); 6] {
        [
            ("Age", self.Age),
            ("SystolicBP", self.SystolicBP),
            ("DiastolicBP", self.DiastolicBP),
            ("BS", self.BS),
            ("BodyTemp", self.BodyTemp),
            ("HeartRate", self.HeartRate),
        ]
    }
}

/// Read the vitals from data row `index`.
///
/// Each field is looked up by its exact header first, then by its lowercase
/// spelling (`heartrate`). Missing or non-numeric values are collected and
/// reported together.
pub fn extract_maternal_record(table: &RawCsvTable, index: usize) -> Result<MaternalRecord, UploadError> {
    let row = table
        .row_map(index)
        .ok_or_else(|| UploadError::input(crate::csv::INSUFFICIENT_ROWS))?;

    let lookup = |field: &str| -> Option<f64> {
        let exact = row.get(field).copied().filter(|v| !v.is_empty());
        let lower = field.to_ascii_lowercase();
        let value = exact.or_else(|| row.get(lower.as_str()).copied())?;
        parse_float_prefix(value)
    };

    let values: Vec<Option<f64>> = REQUIRED_FIELDS.iter().map(|&f| lookup(f)).collect();

    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .zip(&values)
        .filter(|(_, v)| v.is_none())
        .map(|(f, _)| *f)
        .collect();
    if !missing.is_empty() {
        return Err(UploadError::input(format!(
            "Missing or invalid values for: {}",
            missing.join(", ")
        )));
    }

    let v: Vec<f64> = values.into_iter().flatten().collect();
    Ok(MaternalRecord {
        Age: v[0],
        SystolicBP: v[1],
        DiastolicBP: v[2],
        BS: v[3],
        BodyTemp: v[4],
        HeartRate: v[5],
    })
}

/// Read every data row; used by the series upload.
pub fn extract_all(table: &RawCsvTable) -> Result<Vec<MaternalRecord>, UploadError> {
    (0..table.len())
        .map(|i| {
            extract_maternal_record(table, i).map_err(|e| match e {
                UploadError::Input(msg) if table.len() > 1 => {
                    UploadError::Input(format!("Row {}: {msg}", i + 1))
                }
                other => other,
            })
        })
        .collect()
}
