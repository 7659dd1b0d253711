//! JSONL analytics under the caresight home: upload log, diagnostic events,
//! and the reporter that aggregates them.
//!
//! All writes are best-effort. A failed append is dropped so that logging
//! never fails an upload.

pub mod events;
pub mod logger;
pub mod reporter;

use std::path::PathBuf;

use chrono::Utc;

use crate::config::{self, LoggingConfig};
use events::{DiagnosticEvent, EVENTS_LOG_FILE};
use logger::{UPLOAD_LOG_FILE, UploadLogEntry};
use reporter::{TrendEntry, UploadStats};

/// Where analytics go. `None` disables writing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Analytics {
    dir: Option<PathBuf>,
}

impl Analytics {
    /// `~/.caresight/` when logging is enabled.
    pub fn from_config(config: &LoggingConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }
        Self {
            dir: config::caresight_home(),
        }
    }

    /// Write into `dir` instead of the caresight home.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: Some(dir.into()) }
    }

    pub fn disabled() -> Self {
        Self { dir: None }
    }

    pub fn upload_log_path(&self) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join(UPLOAD_LOG_FILE))
    }

    pub fn events_path(&self) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join(EVENTS_LOG_FILE))
    }

    pub fn log_upload(&self, entry: &UploadLogEntry) {
        if let Some(path) = self.upload_log_path() {
            let _ = logger::append_entry(&path, entry);
        }
    }

    pub fn log_event(&self, event: DiagnosticEvent) {
        if let Some(path) = self.events_path() {
            let _ = events::append_event(&path, &event);
        }
    }

    /// Upload log entries from the last `days` days (all when `None`).
    pub fn read_uploads(&self, days: Option<u32>) -> Vec<UploadLogEntry> {
        let entries = self
            .upload_log_path()
            .map(|p| logger::read_entries(&p))
            .unwrap_or_default();
        logger::filter_since_days(entries, days, Utc::now())
    }

    pub fn upload_stats(&self, days: Option<u32>) -> UploadStats {
        reporter::build_stats(&self.read_uploads(days))
    }

    pub fn upload_trends(&self, days: Option<u32>) -> Vec<TrendEntry> {
        reporter::compute_trends(&self.read_uploads(days))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Domain;

    #[test]
    fn disabled_writes_nothing() {
        let analytics = Analytics::disabled();
        analytics.log_upload(&UploadLogEntry::new(Domain::Maternal));
        analytics.log_event(DiagnosticEvent::debug("test", "noop", "ignored"));
        assert!(analytics.read_uploads(None).is_empty());
        assert_eq!(analytics.upload_stats(None).total_uploads, 0);
    }

    #[test]
    fn writes_under_dir() {
        let dir = tempfile::tempdir().unwrap();
        let analytics = Analytics::at(dir.path());

        let mut entry = UploadLogEntry::new(Domain::Cardiovascular);
        entry.success = true;
        entry.patients = 4;
        analytics.log_upload(&entry);
        analytics.log_event(DiagnosticEvent::warn("store", "load", "corrupt"));

        assert!(dir.path().join(UPLOAD_LOG_FILE).exists());
        assert_eq!(events::read_events(&dir.path().join(EVENTS_LOG_FILE)).len(), 1);

        let stats = analytics.upload_stats(Some(1));
        assert_eq!(stats.total_uploads, 1);
        assert_eq!(stats.total_patients, 4);
        assert_eq!(analytics.upload_trends(Some(7)).len(), 1);
    }

    #[test]
    fn config_switch() {
        let off = LoggingConfig { enabled: false };
        assert_eq!(Analytics::from_config(&off), Analytics::disabled());
    }
}
