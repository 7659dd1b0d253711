use std::fs::{self, OpenOptions, create_dir_all};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Domain;

/// File name of the upload log inside the caresight home.
pub const UPLOAD_LOG_FILE: &str = "upload-log.jsonl";

// ---------------------------------------------------------------------------
// Upload log entry (JSONL analytics)
// ---------------------------------------------------------------------------

/// A single entry in the upload log (`~/.caresight/upload-log.jsonl`).
///
/// One line per upload, successful or not. Used by the reporter for
/// `caresight stats` and `GET /api/uploads/stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadLogEntry {
    pub timestamp: String,
    pub domain: Domain,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Data rows in the CSV (0 when parsing failed).
    #[serde(default)]
    pub rows: usize,
    /// Patients sent to the prediction service.
    #[serde(default)]
    pub patients: usize,
    /// Whether the cohort endpoint was used.
    #[serde(default)]
    pub cohort: bool,
    #[serde(default = "default_true")]
    pub success: bool,
    /// `UploadError::kind()` of the failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// Stage the upload stopped at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction_latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation_latency_ms: Option<u64>,
    pub total_latency_ms: u64,
    /// Whether a narrative was attached.
    #[serde(default)]
    pub recommendation: bool,
    /// Whether the result was written to the patient store.
    #[serde(default)]
    pub saved: bool,
}

fn default_true() -> bool {
    true
}

impl UploadLogEntry {
    /// Blank entry for `domain`, stamped now.
    pub fn new(domain: Domain) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            domain,
            file_name: None,
            rows: 0,
            patients: 0,
            cohort: false,
            success: false,
            error_kind: None,
            failed_stage: None,
            prediction_latency_ms: None,
            recommendation_latency_ms: None,
            total_latency_ms: 0,
            recommendation: false,
            saved: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Reading log entries
// ---------------------------------------------------------------------------

/// Read all upload log entries from `path`.
///
/// Malformed lines are skipped. A missing or unreadable file reads as empty.
pub fn read_entries(path: &Path) -> Vec<UploadLogEntry> {
    let Ok(file) = fs::File::open(path) else {
        return Vec::new();
    };

    BufReader::new(file)
        .lines()
        .map_while(Result::ok)
        .filter_map(|line| serde_json::from_str::<UploadLogEntry>(&line).ok())
        .collect()
}

/// Keep entries from the last `days` days before `now`; `None` keeps all.
pub fn filter_since_days(entries: Vec<UploadLogEntry>, days: Option<u32>, now: DateTime<Utc>) -> Vec<UploadLogEntry> {
    let Some(days) = days else {
        return entries;
    };

    let cutoff = now - chrono::Duration::days(i64::from(days));
    entries
        .into_iter()
        .filter(|e| {
            DateTime::parse_from_rfc3339(&e.timestamp)
                .map(|ts| ts.with_timezone(&Utc) >= cutoff)
                .unwrap_or(false)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// File I/O
// ---------------------------------------------------------------------------

pub fn append_entry(path: &Path, entry: &UploadLogEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let json = serde_json::to_string(entry)?;
    writeln!(file, "{json}")?;

    Ok(())
}
