//! Diagnostic event log: structured error/warn/debug records.
//!
//! Every upload stage, swallowed failure and store anomaly lands here with
//! the component and action that produced it. The upload log only records
//! outcomes; this log records what happened on the way.
//!
//! Log file: `~/.caresight/events.jsonl`

use std::fs::{self, OpenOptions, create_dir_all};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const EVENTS_LOG_FILE: &str = "events.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Error,
    Warn,
    Debug,
}

// ---------------------------------------------------------------------------
// Event entry
// ---------------------------------------------------------------------------

/// One line of the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    pub timestamp: String,
    pub level: EventLevel,
    /// Emitting component, e.g. `"pipeline"`, `"store"`.
    pub component: String,
    /// What it was doing, e.g. `"calling-api"`.
    pub action: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl DiagnosticEvent {
    pub fn new(level: EventLevel, component: &str, action: &str, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            level,
            component: component.to_string(),
            action: action.to_string(),
            message: message.into(),
            metadata: Map::new(),
        }
    }

    pub fn error(component: &str, action: &str, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Error, component, action, message)
    }

    pub fn warn(component: &str, action: &str, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Warn, component, action, message)
    }

    pub fn debug(component: &str, action: &str, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Debug, component, action, message)
    }

    /// Attach one metadata field.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

// ---------------------------------------------------------------------------
// File I/O
// ---------------------------------------------------------------------------

pub fn append_event(path: &Path, event: &DiagnosticEvent) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let json = serde_json::to_string(event)?;
    writeln!(file, "{json}")?;

    Ok(())
}

/// Read events back, skipping malformed lines.
pub fn read_events(path: &Path) -> Vec<DiagnosticEvent> {
    let Ok(file) = fs::File::open(path) else {
        return Vec::new();
    };
    BufReader::new(file)
        .lines()
        .map_while(Result::ok)
        .filter_map(|line| serde_json::from_str(&line).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_level_lowercase_and_skips_empty_metadata() {
        let event = DiagnosticEvent::warn("store", "load", "corrupt document");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["level"], "warn");
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn metadata_builder_and_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(EVENTS_LOG_FILE);

        let event = DiagnosticEvent::error("pipeline", "calling-api", "Network error: refused")
            .with("domain", "diabetes")
            .with("rows", 3);
        append_event(&path, &event).unwrap();

        let events = read_events(&path);
        assert_eq!(events, vec![event]);
        assert_eq!(events[0].metadata["rows"], 3);
    }
}
