//! Local patient store: diabetes patients and their report history.
//!
//! The whole store is one JSON document, `{patients, lastUpdated}`, kept
//! under the key [`STORAGE_KEY`] of an injected [`KeyValueStore`]. Every
//! operation is read-modify-write of that document.
//!
//! - Patients are identified by name, compared case-insensitively.
//! - Reports are append-only per patient; the latest report is the last one.
//! - A document that fails to parse reads as an empty store and is logged.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::analytics::Analytics;
use crate::analytics::events::DiagnosticEvent;
use crate::payload::Demographics;

/// Key of the patient document.
pub const STORAGE_KEY: &str = "caresight_diabetes_patients";

/// Window for [`PatientStats::recent_activity`].
const RECENT_ACTIVITY_DAYS: i64 = 30;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("patient not found: {0}")]
    PatientNotFound(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("failed to encode patient document: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Key-value backends
// ---------------------------------------------------------------------------

/// String storage keyed by name.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// One `{key}.json` file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Storage(format!("failed to read {key}: {e}"))),
        }
    }

    /// Writes a sibling temp file and renames it over the target.
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| StoreError::Storage(format!("failed to create {}: {e}", self.dir.display())))?;

        let target = self.path_for(key);
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        fs::write(&tmp, value).map_err(|e| StoreError::Storage(format!("failed to write {key}: {e}")))?;
        fs::rename(&tmp, &target).map_err(|e| StoreError::Storage(format!("failed to replace {key}: {e}")))
    }
}

/// In-process store, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Storage("memory store lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Storage("memory store lock poisoned".to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Stored document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiabetesReport {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Human-readable date of the analysis, as shown in report lists.
    pub analysis_date: String,
    /// Glucose rows that went into the request.
    #[serde(default)]
    pub glucose_data: Vec<Value>,
    #[serde(default)]
    pub risk_factors: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_explanation: Option<String>,
    #[serde(default)]
    pub raw_api_response: Value,
    /// The request body sent to the prediction service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPatient {
    pub id: String,
    pub name: String,
    pub age: u32,
    pub gender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub reports: Vec<DiabetesReport>,
}

impl StoredPatient {
    pub fn latest_report(&self) -> Option<&DiabetesReport> {
        self.reports.last()
    }

    fn matches_name(&self, name: &str) -> bool {
        self.name.trim().to_lowercase() == name.trim().to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientStorageDocument {
    #[serde(default)]
    pub patients: Vec<StoredPatient>,
    pub last_updated: DateTime<Utc>,
}

/// Patient fields supplied by the caller; ids and times are assigned here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPatient {
    pub name: String,
    pub age: u32,
    pub gender: String,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
}

impl From<&Demographics> for NewPatient {
    fn from(d: &Demographics) -> Self {
        Self {
            name: d.name.clone(),
            age: d.age,
            gender: d.gender.clone(),
            weight: d.weight,
            height: d.height,
        }
    }
}

/// Report fields supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewReport {
    pub analysis_date: String,
    pub glucose_data: Vec<Value>,
    pub risk_factors: BTreeMap<String, f64>,
    pub ai_explanation: Option<String>,
    pub raw_api_response: Value,
    pub payload: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientStats {
    pub total_patients: usize,
    pub total_reports: usize,
    /// Rounded to one decimal.
    pub average_reports_per_patient: f64,
    /// Reports newer than 30 days.
    pub recent_activity: usize,
}

fn generate_id(prefix: &str, now: DateTime<Utc>) -> String {
    let suffix: String = uuid::Uuid::new_v4().simple().to_string().chars().take(9).collect();
    format!("{prefix}_{}_{suffix}", now.timestamp_millis())
}

// ---------------------------------------------------------------------------
// Patient store
// ---------------------------------------------------------------------------

pub struct PatientStore<S> {
    kv: S,
    analytics: Analytics,
}

impl PatientStore<FileStore> {
    /// File-backed store under `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self::new(FileStore::new(dir))
    }
}

impl<S: KeyValueStore> PatientStore<S> {
    pub fn new(kv: S) -> Self {
        Self {
            kv,
            analytics: Analytics::disabled(),
        }
    }

    /// Report corrupt documents to `analytics`.
    pub fn with_analytics(mut self, analytics: Analytics) -> Self {
        self.analytics = analytics;
        self
    }

    pub fn backend(&self) -> &S {
        &self.kv
    }

    fn load(&self) -> Result<Vec<StoredPatient>, StoreError> {
        let Some(text) = self.kv.get(STORAGE_KEY)? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str::<PatientStorageDocument>(&text) {
            Ok(doc) => Ok(doc.patients),
            Err(e) => {
                self.analytics.log_event(
                    DiagnosticEvent::warn("store", "load", format!("unreadable patient document: {e}"))
                        .with("key", STORAGE_KEY),
                );
                Ok(Vec::new())
            }
        }
    }

    fn save(&self, patients: Vec<StoredPatient>) -> Result<(), StoreError> {
        let doc = PatientStorageDocument {
            patients,
            last_updated: Utc::now(),
        };
        let text = serde_json::to_string(&doc)?;
        self.kv.put(STORAGE_KEY, &text)
    }

    pub fn patients(&self) -> Result<Vec<StoredPatient>, StoreError> {
        self.load()
    }

    /// Insert a patient, or update the demographics of the one with the same
    /// name. Existing reports are kept.
    pub fn save_patient(&self, patient: NewPatient) -> Result<StoredPatient, StoreError> {
        let mut patients = self.load()?;
        let now = Utc::now();

        let saved = match patients.iter_mut().find(|p| p.matches_name(&patient.name)) {
            Some(existing) => {
                existing.name = patient.name;
                existing.age = patient.age;
                existing.gender = patient.gender;
                existing.weight = patient.weight;
                existing.height = patient.height;
                existing.last_updated = now;
                existing.clone()
            }
            None => {
                let created = StoredPatient {
                    id: generate_id("patient", now),
                    name: patient.name,
                    age: patient.age,
                    gender: patient.gender,
                    weight: patient.weight,
                    height: patient.height,
                    created_at: now,
                    last_updated: now,
                    reports: Vec::new(),
                };
                patients.push(created.clone());
                created
            }
        };

        self.save(patients)?;
        Ok(saved)
    }

    pub fn add_report_to_patient(&self, patient_id: &str, report: NewReport) -> Result<DiabetesReport, StoreError> {
        let mut patients = self.load()?;
        let patient = patients
            .iter_mut()
            .find(|p| p.id == patient_id)
            .ok_or_else(|| StoreError::PatientNotFound(patient_id.to_string()))?;

        let now = Utc::now();
        let stored = DiabetesReport {
            id: generate_id("report", now),
            timestamp: now,
            analysis_date: report.analysis_date,
            glucose_data: report.glucose_data,
            risk_factors: report.risk_factors,
            ai_explanation: report.ai_explanation,
            raw_api_response: report.raw_api_response,
            payload: report.payload,
        };
        patient.reports.push(stored.clone());
        patient.last_updated = now;

        self.save(patients)?;
        Ok(stored)
    }

    pub fn get_patient_by_id(&self, id: &str) -> Result<Option<StoredPatient>, StoreError> {
        Ok(self.load()?.into_iter().find(|p| p.id == id))
    }

    /// Returns whether a patient was removed.
    pub fn delete_patient(&self, id: &str) -> Result<bool, StoreError> {
        let mut patients = self.load()?;
        let before = patients.len();
        patients.retain(|p| p.id != id);
        if patients.len() == before {
            return Ok(false);
        }
        self.save(patients)?;
        Ok(true)
    }

    /// Remove one report. Unknown ids are a no-op returning `false`.
    pub fn delete_report(&self, patient_id: &str, report_id: &str) -> Result<bool, StoreError> {
        let mut patients = self.load()?;
        let Some(patient) = patients.iter_mut().find(|p| p.id == patient_id) else {
            return Ok(false);
        };

        let before = patient.reports.len();
        patient.reports.retain(|r| r.id != report_id);
        if patient.reports.len() == before {
            return Ok(false);
        }
        patient.last_updated = Utc::now();

        self.save(patients)?;
        Ok(true)
    }

    pub fn get_patient_stats(&self, now: DateTime<Utc>) -> Result<PatientStats, StoreError> {
        Ok(compute_stats(&self.load()?, now))
    }
}

fn compute_stats(patients: &[StoredPatient], now: DateTime<Utc>) -> PatientStats {
    let total_patients = patients.len();
    let total_reports: usize = patients.iter().map(|p| p.reports.len()).sum();

    let average = if total_patients == 0 {
        0.0
    } else {
        total_reports as f64 / total_patients as f64
    };

    let cutoff = now - Duration::days(RECENT_ACTIVITY_DAYS);
    let recent_activity = patients
        .iter()
        .flat_map(|p| &p.reports)
        .filter(|r| r.timestamp > cutoff)
        .count();

    PatientStats {
        total_patients,
        total_reports,
        average_reports_per_patient: (average * 10.0).round() / 10.0,
        recent_activity,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn patient(name: &str) -> NewPatient {
        NewPatient {
            name: name.to_string(),
            age: 52,
            gender: "female".to_string(),
            weight: Some(70.0),
            height: None,
        }
    }

    fn report(note: &str) -> NewReport {
        NewReport {
            analysis_date: "2025-03-01".to_string(),
            ai_explanation: Some(note.to_string()),
            raw_api_response: json!({ "ok": true }),
            ..NewReport::default()
        }
    }

    #[test]
    fn upsert_by_case_insensitive_name_keeps_reports() {
        let store = PatientStore::new(MemoryStore::new());
        let first = store.save_patient(patient("Jane Doe")).unwrap();
        store.add_report_to_patient(&first.id, report("one")).unwrap();

        let mut renamed = patient("  jane doe ");
        renamed.age = 53;
        let second = store.save_patient(renamed).unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.age, 53);
        assert_eq!(second.reports.len(), 1);
        assert_eq!(store.patients().unwrap().len(), 1);
    }

    #[test]
    fn reports_append_in_order() {
        let store = PatientStore::new(MemoryStore::new());
        let p = store.save_patient(patient("A")).unwrap();
        store.add_report_to_patient(&p.id, report("first")).unwrap();
        let last = store.add_report_to_patient(&p.id, report("second")).unwrap();

        let loaded = store.get_patient_by_id(&p.id).unwrap().unwrap();
        assert_eq!(loaded.reports.len(), 2);
        assert_eq!(loaded.latest_report().unwrap().id, last.id);
        assert_eq!(loaded.reports[0].ai_explanation.as_deref(), Some("first"));
        assert!(last.id.starts_with("report_"));
        assert!(p.id.starts_with("patient_"));
        assert_eq!(p.id.rsplit('_').next().unwrap().len(), 9);
    }

    #[test]
    fn report_for_unknown_patient_fails() {
        let store = PatientStore::new(MemoryStore::new());
        let err = store.add_report_to_patient("patient_0_missing", report("x")).unwrap_err();
        assert!(matches!(err, StoreError::PatientNotFound(id) if id == "patient_0_missing"));
    }

    #[test]
    fn delete_report_is_idempotent() {
        let store = PatientStore::new(MemoryStore::new());
        let p = store.save_patient(patient("A")).unwrap();
        let r = store.add_report_to_patient(&p.id, report("x")).unwrap();

        assert!(store.delete_report(&p.id, &r.id).unwrap());
        assert!(!store.delete_report(&p.id, &r.id).unwrap());
        assert!(!store.delete_report("nobody", &r.id).unwrap());
        assert!(store.get_patient_by_id(&p.id).unwrap().unwrap().reports.is_empty());
    }

    #[test]
    fn delete_patient() {
        let store = PatientStore::new(MemoryStore::new());
        let a = store.save_patient(patient("A")).unwrap();
        store.save_patient(patient("B")).unwrap();

        assert!(store.delete_patient(&a.id).unwrap());
        assert!(!store.delete_patient(&a.id).unwrap());
        assert_eq!(store.patients().unwrap().len(), 1);
        assert!(store.get_patient_by_id(&a.id).unwrap().is_none());
    }

    #[test]
    fn stats_round_average_and_count_recent() {
        let now = Utc::now();
        let mut patients = Vec::new();
        for (i, count) in [1usize, 1, 2].iter().enumerate() {
            let reports = (0..*count)
                .map(|j| DiabetesReport {
                    id: format!("r{i}{j}"),
                    timestamp: if i == 2 && j == 1 { now - Duration::days(45) } else { now },
                    analysis_date: String::new(),
                    glucose_data: Vec::new(),
                    risk_factors: BTreeMap::new(),
                    ai_explanation: None,
                    raw_api_response: Value::Null,
                    payload: None,
                })
                .collect();
            patients.push(StoredPatient {
                id: format!("p{i}"),
                name: format!("P{i}"),
                age: 40,
                gender: "male".to_string(),
                weight: None,
                height: None,
                created_at: now,
                last_updated: now,
                reports,
            });
        }

        let stats = compute_stats(&patients, now);
        assert_eq!(stats.total_patients, 3);
        assert_eq!(stats.total_reports, 4);
        assert_eq!(stats.average_reports_per_patient, 1.3);
        assert_eq!(stats.recent_activity, 3);

        let empty = compute_stats(&[], now);
        assert_eq!(empty.average_reports_per_patient, 0.0);
    }

    #[test]
    fn corrupt_document_reads_empty_and_is_logged() {
        let dir = tempfile::tempdir().unwrap();
        let kv = MemoryStore::new();
        kv.put(STORAGE_KEY, "{not json").unwrap();
        let store = PatientStore::new(kv).with_analytics(Analytics::at(dir.path()));

        assert!(store.patients().unwrap().is_empty());
        let events = crate::analytics::events::read_events(&Analytics::at(dir.path()).events_path().unwrap());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].component, "store");

        store.save_patient(patient("Fresh")).unwrap();
        assert_eq!(store.patients().unwrap().len(), 1);
    }

    #[test]
    fn document_uses_camel_case_keys() {
        let store = PatientStore::new(MemoryStore::new());
        let p = store.save_patient(patient("A")).unwrap();
        store.add_report_to_patient(&p.id, report("x")).unwrap();

        let raw = store.backend().get(STORAGE_KEY).unwrap().unwrap();
        let doc: Value = serde_json::from_str(&raw).unwrap();
        assert!(doc.get("lastUpdated").is_some());
        let stored = &doc["patients"][0];
        assert!(stored.get("createdAt").is_some());
        assert!(stored["reports"][0].get("rawApiResponse").is_some());
        assert!(stored["reports"][0].get("aiExplanation").is_some());
    }

    #[test]
    fn file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileStore::new(dir.path().join("data"));
        assert_eq!(kv.get("missing").unwrap(), None);

        kv.put("k", "{\"a\":1}").unwrap();
        kv.put("k", "{\"a\":2}").unwrap();
        assert_eq!(kv.get("k").unwrap().as_deref(), Some("{\"a\":2}"));
        assert!(dir.path().join("data").join("k.json").exists());
        assert!(!dir.path().join("data").join("k.json.tmp").exists());
    }
}
