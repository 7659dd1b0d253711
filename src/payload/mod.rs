//! Payload builder: turns a parsed CSV table into the JSON bodies the
//! prediction services expect.
//!
//! - [`build_cohort_payload`]: diabetes/glucose cohort payload
//! - [`maternal`]: single maternal vitals record
//! - [`cardiovascular`]: cardiovascular patient list
//!
//! Cell coercion mirrors what the upstream services were written against:
//! a cell is a number if it reads as one, a boolean if it says
//! `true`/`false`, otherwise it stays a string. Empty cells become `null`.

pub mod cardiovascular;
pub mod maternal;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::csv::RawCsvTable;
use crate::error::UploadError;

/// Horizons (days) every cohort patient is scored for.
pub const RISK_HORIZONS: [u32; 5] = [7, 14, 30, 60, 90];

/// Flag columns normalized to `0`/`1`.
pub const FLAG_FIELDS: [&str; 4] = ["missed_insulin", "exercise_flag", "illness_flag", "is_weekend"];

/// Percentage columns that may arrive as fractions.
pub const PERCENT_FIELDS: [&str; 2] = ["pct_hypo", "pct_hyper"];

const DEFAULT_INSULIN_ADHERENCE: f64 = 1.0;
const DEFAULT_SLEEP_QUALITY: f64 = 0.8;
const DEFAULT_INSULIN_DOSE: f64 = 30.0;

/// One loosely-typed row of a diabetes upload, in column order.
pub type PatientRecord = Map<String, Value>;

// ---------------------------------------------------------------------------
// Cell coercion
// ---------------------------------------------------------------------------

/// A single CSV cell after coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Number(f64),
    Bool(bool),
    Text(String),
}

impl CellValue {
    /// Convert to JSON. Integral numbers serialize as integers so that
    /// `30` round-trips as `30`, not `30.0`. Non-finite numbers become `null`.
    pub fn into_value(self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Number(n) => number_value(n),
            Self::Bool(b) => Value::Bool(b),
            Self::Text(s) => Value::String(s),
        }
    }

    /// Read a JSON value back into a cell. Arrays and objects never come
    /// out of the CSV reader and are treated as text.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => n.as_f64().map(Self::Number).unwrap_or(Self::Null),
            Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }
}

/// JSON number for `n`, integer-typed when it is integral.
pub fn number_value(n: f64) -> Value {
    if !n.is_finite() {
        return Value::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return Value::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Coerce a trimmed CSV cell.
pub fn coerce_cell(raw: &str) -> CellValue {
    if raw.is_empty() {
        return CellValue::Null;
    }
    if let Some(n) = parse_number(raw) {
        return CellValue::Number(n);
    }
    if raw.eq_ignore_ascii_case("true") {
        return CellValue::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return CellValue::Bool(false);
    }
    CellValue::Text(raw.to_string())
}

/// Strict numeric parse of a whole cell: decimal, exponent or `0x`/`0b`/`0o`
/// integer literals. `inf`/`nan` spellings are text.
pub fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    for (prefix, radix) in [("0x", 16), ("0b", 2), ("0o", 8)] {
        if let Some(digits) = s.get(..2).filter(|p| p.eq_ignore_ascii_case(prefix)).and(s.get(2..))
            && !digits.is_empty()
        {
            return u64::from_str_radix(digits, radix).ok().map(|v| v as f64);
        }
    }

    if s.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Lenient numeric parse that reads the longest numeric prefix
/// (`"98.6F"` → `98.6`). Returns `None` when no digits lead the cell.
pub fn parse_float_prefix(raw: &str) -> Option<f64> {
    let s = raw.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;

    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => seen_digit = true,
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end += 1;
    }
    if !seen_digit {
        return None;
    }

    // Optional exponent, only if it is complete.
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > digits_start {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().ok().filter(|n| n.is_finite())
}

// ---------------------------------------------------------------------------
// Demographics
// ---------------------------------------------------------------------------

/// Patient details entered alongside a diabetes upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Demographics {
    pub name: String,
    pub age: u32,
    pub gender: String,
    /// Kilograms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    /// Centimetres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

/// Body-mass index from kilograms and centimetres, rounded to one decimal.
pub fn bmi(weight_kg: f64, height_cm: f64) -> Option<f64> {
    if weight_kg <= 0.0 || height_cm <= 0.0 {
        return None;
    }
    let height_m = height_cm / 100.0;
    Some((weight_kg / (height_m * height_m) * 10.0).round() / 10.0)
}

/// Name, age and gender must all be present before anything is sent.
pub fn validate_demographics(demographics: &Demographics) -> Result<(), UploadError> {
    if demographics.name.trim().is_empty()
        || demographics.age == 0
        || demographics.gender.trim().is_empty()
    {
        return Err(UploadError::input(
            "Please fill in all required patient information (Name, Age, Gender)",
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Cohort payload
// ---------------------------------------------------------------------------

/// Per-patient context the glucose model conditions on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientContexts {
    pub insulin_adherence: Value,
    pub sleep_quality: Value,
    pub insulin_dose: Value,
}

/// One patient's entry in a [`CohortPayload`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientPayload {
    pub patient_id: Value,
    pub name: String,
    pub age: u32,
    pub gender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    pub analysis_timestamp: String,
    pub data: Vec<PatientRecord>,
    pub contexts: PatientContexts,
    pub risk_horizons: Vec<u32>,
}

/// Body of a glucose prediction request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CohortPayload {
    pub patients: Vec<PatientPayload>,
}

impl CohortPayload {
    pub fn is_cohort(&self) -> bool {
        self.patients.len() > 1
    }

    /// Total number of rows across all patients.
    pub fn record_count(&self) -> usize {
        self.patients.iter().map(|p| p.data.len()).sum()
    }
}

/// Zip headers with one row, coercing each cell.
pub fn row_to_record(headers: &[String], row: &[String]) -> PatientRecord {
    headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            let cell = row.get(i).map(String::as_str).unwrap_or("");
            (header.clone(), coerce_cell(cell).into_value())
        })
        .collect()
}

/// Build the cohort payload for a diabetes upload.
///
/// Rows are grouped by their `patient_id` column. Without that column every
/// row belongs to one group keyed by the patient's name: one upload is
/// assumed to describe one person. Groups keep first-seen order.
pub fn build_cohort_payload(
    headers: &[String],
    rows: &[Vec<String>],
    demographics: &Demographics,
    timestamp: DateTime<Utc>,
) -> CohortPayload {
    let mut groups: Vec<(String, Value, Vec<PatientRecord>)> = Vec::new();

    for row in rows {
        let mut record = row_to_record(headers, row);

        let patient_id = match record.get("patient_id") {
            Some(Value::Null) | None => Value::String(demographics.name.clone()),
            Some(id) => id.clone(),
        };
        record.insert("patient_id".to_string(), patient_id.clone());
        normalize_record(&mut record);

        let key = group_key(&patient_id);
        match groups.iter_mut().find(|(k, _, _)| *k == key) {
            Some((_, _, data)) => data.push(record),
            None => groups.push((key, patient_id, vec![record])),
        }
    }

    let analysis_timestamp = timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);

    let patients = groups
        .into_iter()
        .map(|(_, patient_id, data)| {
            let contexts = contexts_from(data.last());
            PatientPayload {
                patient_id,
                name: demographics.name.clone(),
                age: demographics.age,
                gender: demographics.gender.clone(),
                weight: demographics.weight,
                height: demographics.height,
                analysis_timestamp: analysis_timestamp.clone(),
                data,
                contexts,
                risk_horizons: RISK_HORIZONS.to_vec(),
            }
        })
        .collect();

    CohortPayload { patients }
}

/// Convenience wrapper over [`build_cohort_payload`] for a parsed table.
pub fn build_from_table(
    table: &RawCsvTable,
    demographics: &Demographics,
    timestamp: DateTime<Utc>,
) -> CohortPayload {
    build_cohort_payload(&table.headers, &table.rows, demographics, timestamp)
}

fn group_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Apply flag and percentage normalization in place.
///
/// The four flag fields and two percentage fields are always present on a
/// normalized record, even when the upload had no such column.
pub fn normalize_record(record: &mut PatientRecord) {
    for field in FLAG_FIELDS {
        let cell = record.get(field).map(CellValue::from_value).unwrap_or(CellValue::Null);
        record.insert(field.to_string(), normalize_flag(&cell));
    }
    for field in PERCENT_FIELDS {
        let cell = record.get(field).map(CellValue::from_value).unwrap_or(CellValue::Null);
        record.insert(field.to_string(), normalize_percent(&cell));
    }
}

/// Booleans and numbers map onto `0`/`1`; missing is `0`. Text that did not
/// coerce to a number or boolean has no flag meaning and becomes `null`.
pub fn normalize_flag(cell: &CellValue) -> Value {
    match cell {
        CellValue::Null => Value::from(0),
        CellValue::Bool(b) => Value::from(u8::from(*b)),
        CellValue::Number(n) => Value::from(u8::from(*n != 0.0)),
        CellValue::Text(_) => Value::Null,
    }
}

/// Values at or below `1` are read as fractions and scaled to percent.
///
/// `0.5` therefore always means 50%, never 0.5%.
pub fn normalize_percent(cell: &CellValue) -> Value {
    match cell {
        CellValue::Null => Value::from(0),
        CellValue::Number(n) if *n <= 1.0 => number_value(to_percent(*n)),
        CellValue::Number(n) => number_value(*n),
        CellValue::Bool(b) => Value::from(u8::from(*b)),
        CellValue::Text(_) => Value::Null,
    }
}

/// Scale a fraction to percent, dropping binary float noise
/// (`0.2 * 100.0` is `20.000000000000004`).
fn to_percent(fraction: f64) -> f64 {
    (fraction * 100.0 * 1e9).round() / 1e9
}

fn contexts_from(last: Option<&PatientRecord>) -> PatientContexts {
    let pick = |field: &str, default: f64| -> Value {
        match last.and_then(|r| r.get(field)) {
            Some(v) if is_truthy(v) => v.clone(),
            _ => number_value(default),
        }
    };
    PatientContexts {
        insulin_adherence: pick("insulin_adherence", DEFAULT_INSULIN_ADHERENCE),
        sleep_quality: pick("sleep_quality", DEFAULT_SLEEP_QUALITY),
        insulin_dose: pick("insulin_dose", DEFAULT_INSULIN_DOSE),
    }
}

/// Truthiness of a JSON value in the sense the upstream payload contract
/// uses for defaults: `null`, `false`, `0` and `""` are falsy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn demo() -> Demographics {
        Demographics {
            name: "Amy Lee".to_string(),
            age: 42,
            gender: "female".to_string(),
            weight: Some(70.0),
            height: None,
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn coerce_cell_types() {
        assert_eq!(coerce_cell(""), CellValue::Null);
        assert_eq!(coerce_cell("42"), CellValue::Number(42.0));
        assert_eq!(coerce_cell("-0.25"), CellValue::Number(-0.25));
        assert_eq!(coerce_cell("1e3"), CellValue::Number(1000.0));
        assert_eq!(coerce_cell("0x1F"), CellValue::Number(31.0));
        assert_eq!(coerce_cell("TRUE"), CellValue::Bool(true));
        assert_eq!(coerce_cell("false"), CellValue::Bool(false));
        assert_eq!(coerce_cell("nan"), CellValue::Text("nan".to_string()));
        assert_eq!(coerce_cell("inf"), CellValue::Text("inf".to_string()));
        assert_eq!(coerce_cell("12abc"), CellValue::Text("12abc".to_string()));
    }

    #[test]
    fn multibyte_cells_stay_text() {
        for cell in ["€100", "→ fasting", "µg", "0é1", "€"] {
            assert_eq!(coerce_cell(cell), CellValue::Text(cell.to_string()));
            assert_eq!(parse_float_prefix(cell), None);
        }
        assert_eq!(parse_float_prefix("5µg"), Some(5.0));

        let table = crate::csv::parse_csv("patient_id,glucose,note\n€1,110,→ fasting\n€1,µg,after lunch").unwrap();
        let payload = build_from_table(&table, &demo(), ts());

        assert_eq!(payload.patients.len(), 1);
        let patient = &payload.patients[0];
        assert_eq!(patient.patient_id, json!("€1"));
        assert_eq!(patient.data[0]["note"], json!("→ fasting"));
        assert_eq!(patient.data[1]["glucose"], json!("µg"));
    }

    #[test]
    fn integral_numbers_serialize_as_integers() {
        assert_eq!(CellValue::Number(30.0).into_value(), json!(30));
        assert_eq!(CellValue::Number(98.6).into_value(), json!(98.6));
        assert_eq!(number_value(f64::NAN), Value::Null);
    }

    #[test]
    fn float_prefix_parsing() {
        assert_eq!(parse_float_prefix("98.6F"), Some(98.6));
        assert_eq!(parse_float_prefix(" 120"), Some(120.0));
        assert_eq!(parse_float_prefix("-3.5e2x"), Some(-350.0));
        assert_eq!(parse_float_prefix("7e"), Some(7.0));
        assert_eq!(parse_float_prefix("abc"), None);
        assert_eq!(parse_float_prefix(""), None);
        assert_eq!(parse_float_prefix("."), None);
    }

    #[test]
    fn percent_normalization_boundaries() {
        assert_eq!(normalize_percent(&CellValue::Number(0.2)), json!(20));
        assert_eq!(normalize_percent(&CellValue::Number(20.0)), json!(20));
        assert_eq!(normalize_percent(&CellValue::Number(1.0)), json!(100));
        assert_eq!(normalize_percent(&CellValue::Null), json!(0));
        assert_eq!(normalize_percent(&CellValue::Text("n/a".into())), Value::Null);
    }

    #[test]
    fn flag_normalization() {
        assert_eq!(normalize_flag(&CellValue::Bool(true)), json!(1));
        assert_eq!(normalize_flag(&CellValue::Bool(false)), json!(0));
        assert_eq!(normalize_flag(&CellValue::Number(1.0)), json!(1));
        assert_eq!(normalize_flag(&CellValue::Number(0.0)), json!(0));
        assert_eq!(normalize_flag(&CellValue::Number(3.0)), json!(1));
        assert_eq!(normalize_flag(&CellValue::Null), json!(0));
    }

    #[test]
    fn groups_rows_by_patient_id() {
        let headers = strings(&["patient_id", "glucose", "missed_insulin"]);
        let rows = vec![
            strings(&["1", "110", "true"]),
            strings(&["2", "140", "false"]),
            strings(&["1", "120", ""]),
        ];
        let payload = build_cohort_payload(&headers, &rows, &demo(), ts());

        assert_eq!(payload.patients.len(), 2);
        assert!(payload.is_cohort());
        assert_eq!(payload.patients[0].patient_id, json!(1));
        assert_eq!(payload.patients[0].data.len(), 2);
        assert_eq!(payload.patients[0].data[0]["missed_insulin"], json!(1));
        assert_eq!(payload.patients[0].data[1]["missed_insulin"], json!(0));
        assert_eq!(payload.patients[1].patient_id, json!(2));
        assert_eq!(payload.record_count(), 3);
    }

    #[test]
    fn missing_id_column_collapses_to_one_patient() {
        let headers = strings(&["glucose", "pct_hypo", "pct_hyper"]);
        let rows = vec![strings(&["110", "0.2", "20"]), strings(&["115", "", "0.05"])];
        let payload = build_cohort_payload(&headers, &rows, &demo(), ts());

        assert_eq!(payload.patients.len(), 1);
        let patient = &payload.patients[0];
        assert_eq!(patient.patient_id, json!("Amy Lee"));
        assert_eq!(patient.data[0]["pct_hypo"], json!(20));
        assert_eq!(patient.data[0]["pct_hyper"], json!(20));
        assert_eq!(patient.data[1]["pct_hypo"], json!(0));
        assert_eq!(patient.data[1]["pct_hyper"], json!(5));
        assert_eq!(patient.data[0]["patient_id"], json!("Amy Lee"));
    }

    #[test]
    fn every_patient_gets_fixed_horizons_and_timestamp() {
        let headers = strings(&["patient_id", "glucose"]);
        let rows = vec![strings(&["a", "1"]), strings(&["b", "2"]), strings(&["c", "3"])];
        let payload = build_cohort_payload(&headers, &rows, &demo(), ts());
        for patient in &payload.patients {
            assert_eq!(patient.risk_horizons, vec![7, 14, 30, 60, 90]);
            assert_eq!(patient.analysis_timestamp, "2025-03-01T12:00:00.000Z");
        }
    }

    #[test]
    fn contexts_default_when_missing_or_zero() {
        let headers = strings(&["insulin_adherence", "sleep_quality", "insulin_dose"]);
        let rows = vec![strings(&["0.6", "0.9", "40"]), strings(&["0", "", "25"])];
        let payload = build_cohort_payload(&headers, &rows, &demo(), ts());
        let contexts = &payload.patients[0].contexts;
        assert_eq!(contexts.insulin_adherence, json!(1));
        assert_eq!(contexts.sleep_quality, json!(0.8));
        assert_eq!(contexts.insulin_dose, json!(25));
    }

    #[test]
    fn empty_cells_stay_null() {
        let headers = strings(&["glucose", "note"]);
        let rows = vec![strings(&["", "fasting"])];
        let payload = build_cohort_payload(&headers, &rows, &demo(), ts());
        let record = &payload.patients[0].data[0];
        assert_eq!(record["glucose"], Value::Null);
        assert_eq!(record["note"], json!("fasting"));
    }

    #[test]
    fn record_keeps_column_order() {
        let headers = strings(&["zeta", "patient_id", "alpha"]);
        let rows = vec![strings(&["1", "p", "2"])];
        let record = &build_cohort_payload(&headers, &rows, &demo(), ts()).patients[0].data[0];
        let keys: Vec<&str> = record.keys().map(String::as_str).take(3).collect();
        assert_eq!(keys, vec!["zeta", "patient_id", "alpha"]);
    }

    #[test]
    fn building_twice_is_identical() {
        let headers = strings(&["patient_id", "glucose", "pct_hypo"]);
        let rows = vec![strings(&["1", "110", "0.1"])];
        let a = build_cohort_payload(&headers, &rows, &demo(), ts());
        let b = build_cohort_payload(&headers, &rows, &demo(), ts());
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn optional_demographics_are_omitted() {
        let headers = strings(&["glucose"]);
        let rows = vec![strings(&["100"])];
        let value = serde_json::to_value(build_cohort_payload(&headers, &rows, &demo(), ts())).unwrap();
        let patient = &value["patients"][0];
        assert_eq!(patient["weight"], json!(70.0));
        assert!(patient.get("height").is_none());
    }

    #[test]
    fn demographics_validation_and_bmi() {
        assert!(validate_demographics(&demo()).is_ok());
        let mut missing = demo();
        missing.gender.clear();
        assert!(validate_demographics(&missing).is_err());

        assert_eq!(bmi(70.0, 170.0), Some(24.2));
        assert_eq!(bmi(70.0, 0.0), None);
        assert_eq!(bmi(0.0, 170.0), None);
    }
}
