//! Upload reporter: aggregation and trends over the upload log.
//!
//! Reads the JSONL upload log and provides:
//! - **Stats**: success rate, per-domain volumes and latencies, error kinds
//! - **Trends**: per-day upload counts

use std::collections::HashMap;

use serde::Serialize;

use crate::analytics::logger::UploadLogEntry;
use crate::domain::Domain;

// ---------------------------------------------------------------------------
// Aggregated stats
// ---------------------------------------------------------------------------

/// Summary statistics for `caresight stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadStats {
    pub total_uploads: usize,
    pub successful: usize,
    pub failed: usize,
    pub success_rate_pct: f64,
    pub total_patients: usize,
    /// Share of successful uploads that came back with a narrative.
    pub recommendation_rate_pct: f64,
    pub domain_stats: Vec<DomainStat>,
    /// `(error kind, count)`, most frequent first.
    pub error_kinds: Vec<(String, usize)>,
}

/// Per-domain aggregated statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainStat {
    pub domain: Domain,
    pub uploads: usize,
    pub failures: usize,
    pub rows: usize,
    pub patients: usize,
    pub cohort_uploads: usize,
    /// Mean prediction latency over entries that recorded one.
    pub avg_prediction_ms: Option<f64>,
    pub avg_total_ms: f64,
}

/// A single data point in a time-based trend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendEntry {
    pub date: String,
    pub uploads: usize,
    pub failures: usize,
    pub patients: usize,
}

fn pct(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 / whole as f64) * 100.0
    }
}

// ---------------------------------------------------------------------------
// Stats computation
// ---------------------------------------------------------------------------

pub fn build_stats(entries: &[UploadLogEntry]) -> UploadStats {
    let total_uploads = entries.len();
    let successful = entries.iter().filter(|e| e.success).count();
    let with_narrative = entries.iter().filter(|e| e.success && e.recommendation).count();

    UploadStats {
        total_uploads,
        successful,
        failed: total_uploads - successful,
        success_rate_pct: pct(successful, total_uploads),
        total_patients: entries.iter().filter(|e| e.success).map(|e| e.patients).sum(),
        recommendation_rate_pct: pct(with_narrative, successful),
        domain_stats: compute_domain_stats(entries),
        error_kinds: compute_error_kinds(entries),
    }
}

/// Group entries by domain. Returned in `Domain::ALL` order, empty domains
/// omitted.
fn compute_domain_stats(entries: &[UploadLogEntry]) -> Vec<DomainStat> {
    let mut groups: HashMap<Domain, Vec<&UploadLogEntry>> = HashMap::new();
    for entry in entries {
        groups.entry(entry.domain).or_default().push(entry);
    }

    Domain::ALL
        .iter()
        .filter_map(|domain| {
            let group = groups.get(domain)?;
            let uploads = group.len();

            let prediction: Vec<u64> = group.iter().filter_map(|e| e.prediction_latency_ms).collect();
            let avg_prediction_ms = if prediction.is_empty() {
                None
            } else {
                Some(prediction.iter().sum::<u64>() as f64 / prediction.len() as f64)
            };

            Some(DomainStat {
                domain: *domain,
                uploads,
                failures: group.iter().filter(|e| !e.success).count(),
                rows: group.iter().map(|e| e.rows).sum(),
                patients: group.iter().map(|e| e.patients).sum(),
                cohort_uploads: group.iter().filter(|e| e.cohort).count(),
                avg_prediction_ms,
                avg_total_ms: group.iter().map(|e| e.total_latency_ms).sum::<u64>() as f64 / uploads as f64,
            })
        })
        .collect()
}

fn compute_error_kinds(entries: &[UploadLogEntry]) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for kind in entries.iter().filter_map(|e| e.error_kind.as_deref()) {
        *counts.entry(kind).or_default() += 1;
    }

    let mut kinds: Vec<(String, usize)> = counts.into_iter().map(|(k, c)| (k.to_string(), c)).collect();
    kinds.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    kinds
}

// ---------------------------------------------------------------------------
// Trends
// ---------------------------------------------------------------------------

/// Daily upload counts, oldest first.
pub fn compute_trends(entries: &[UploadLogEntry]) -> Vec<TrendEntry> {
    let mut daily: HashMap<String, Vec<&UploadLogEntry>> = HashMap::new();
    for entry in entries {
        // RFC 3339: first 10 chars are YYYY-MM-DD
        let date = entry.timestamp.get(..10).unwrap_or("unknown").to_string();
        daily.entry(date).or_default().push(entry);
    }

    let mut trends: Vec<TrendEntry> = daily
        .into_iter()
        .map(|(date, group)| TrendEntry {
            date,
            uploads: group.len(),
            failures: group.iter().filter(|e| !e.success).count(),
            patients: group.iter().map(|e| e.patients).sum(),
        })
        .collect();

    trends.sort_by(|a, b| a.date.cmp(&b.date));
    trends
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
