//! Cardiovascular patient records.
//!
//! Unlike the maternal path, unreadable numbers fall back to `0` and
//! unreadable strings to a fixed default; only the first patient's core
//! vitals are validated.

use serde::{Deserialize, Serialize};

use super::parse_float_prefix;
use crate::csv::RawCsvTable;
use crate::error::UploadError;

/// Fields the first record must carry as non-zero numbers.
pub const REQUIRED_FIELDS: [&str; 5] = ["age", "systolic_bp", "diastolic_bp", "heart_rate", "cholesterol"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardiovascularRecord {
    pub patient_id: String,
    pub age: f64,
    pub gender: String,
    pub diabetes: String,
    pub hypertension: String,
    pub systolic_bp: f64,
    pub diastolic_bp: f64,
    pub heart_rate: f64,
    pub cholesterol: f64,
    pub glucose: f64,
    pub medication_adherence: f64,
    pub exercise_minutes: f64,
    pub diet_score: f64,
    pub stress_level: f64,
    pub weight_kg: f64,
    pub oxygen_saturation: f64,
    pub temperature_c: f64,
    pub sleep_hours: f64,
}

impl CardiovascularRecord {
    fn numeric(&self, field: &str) -> Option<f64> {
        Some(match field {
            "age" => self.age,
            "systolic_bp" => self.systolic_bp,
            "diastolic_bp" => self.diastolic_bp,
            "heart_rate" => self.heart_rate,
            "cholesterol" => self.cholesterol,
            _ => return None,
        })
    }
}

/// Request body for the cardiovascular endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardiovascularPayload {
    pub patients: Vec<CardiovascularRecord>,
}

/// Build one record per data row.
///
/// Rows without a `patient_id` get `P<row number>` so the same file always
/// produces the same ids.
pub fn extract_cardiovascular_records(table: &RawCsvTable) -> Result<Vec<CardiovascularRecord>, UploadError> {
    let mut records = Vec::with_capacity(table.len());

    for index in 0..table.len() {
        let Some(row) = table.row_map(index) else { continue };
        let text = |field: &str, default: &str| -> String {
            row.get(field)
                .copied()
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
                .to_string()
        };
        let num = |field: &str| -> f64 {
            row.get(field)
                .and_then(|v| parse_float_prefix(v))
                .unwrap_or(0.0)
        };

        records.push(CardiovascularRecord {
            patient_id: text("patient_id", &format!("P{}", index + 1)),
            age: num("age"),
            gender: text("gender", "Unknown"),
            diabetes: text("diabetes", "No"),
            hypertension: text("hypertension", "No"),
            systolic_bp: num("systolic_bp"),
            diastolic_bp: num("diastolic_bp"),
            heart_rate: num("heart_rate"),
            cholesterol: num("cholesterol"),
            glucose: num("glucose"),
            medication_adherence: num("medication_adherence"),
            exercise_minutes: num("exercise_minutes"),
            diet_score: num("diet_score"),
            stress_level: num("stress_level"),
            weight_kg: num("weight_kg"),
            oxygen_saturation: num("oxygen_saturation"),
            temperature_c: num("temperature_c"),
            sleep_hours: num("sleep_hours"),
        });
    }

    let Some(first) = records.first() else {
        return Err(UploadError::input("No valid patient data found in CSV"));
    };

    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|f| first.numeric(f).is_none_or(|v| v == 0.0))
        .collect();
    if !missing.is_empty() {
        return Err(UploadError::input(format!(
            "Missing or invalid values for: {}",
            missing.join(", ")
        )));
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv::parse_csv;

    const HEADER: &str = "patient_id,age,gender,systolic_bp,diastolic_bp,heart_rate,cholesterol,glucose";

    #[test]
    fn reads_all_rows_with_defaults() {
        let table = parse_csv(&format!("{HEADER}\nC1,64,M,150,95,88,240,130\n,70,,140,90,80,220,")).unwrap();
        let records = extract_cardiovascular_records(&table).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].patient_id, "C1");
        assert_eq!(records[0].cholesterol, 240.0);
        assert_eq!(records[0].diabetes, "No");
        assert_eq!(records[1].patient_id, "P2");
        assert_eq!(records[1].gender, "Unknown");
        assert_eq!(records[1].glucose, 0.0);
        assert_eq!(records[1].sleep_hours, 0.0);
    }

    #[test]
    fn first_record_must_have_core_vitals() {
        let table = parse_csv(&format!("{HEADER}\nC1,64,M,150,,88,abc,130")).unwrap();
        let err = extract_cardiovascular_records(&table).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing or invalid values for: diastolic_bp, cholesterol"
        );
    }

    #[test]
    fn later_rows_are_not_validated() {
        let table = parse_csv(&format!("{HEADER}\nC1,64,M,150,95,88,240,130\nC2,0,F,0,0,0,0,0")).unwrap();
        assert_eq!(extract_cardiovascular_records(&table).unwrap().len(), 2);
    }

    #[test]
    fn payload_wraps_patients() {
        let table = parse_csv(&format!("{HEADER}\nC1,64,M,150,95,88,240,130")).unwrap();
        let payload = CardiovascularPayload {
            patients: extract_cardiovascular_records(&table).unwrap(),
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["patients"][0]["patient_id"], "C1");
        assert_eq!(value["patients"][0]["heart_rate"], 88.0);
    }
}
