//! Upload flows: CSV text in, outcome envelope out.
//!
//! Each `run_*_upload` walks the same stages:
//!
//! ```text
//! reading-file → parsing-csv → building-payload → calling-api
//!   → parsing-response → generating-recommendations → saving → complete
//! ```
//!
//! Input, network and API errors stop the flow at the current stage and are
//! returned inside the envelope. Recommendation and persistence failures are
//! logged and the flow carries on without them. Every run appends exactly one
//! entry to the upload log.

use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::analysis::{DiabetesPrediction, MaternalPrediction, ParsedDiabetesData, PredictionResponse};
use crate::analytics::Analytics;
use crate::analytics::events::DiagnosticEvent;
use crate::analytics::logger::UploadLogEntry;
use crate::csv::{RawCsvTable, parse_csv, validate_upload};
use crate::domain::Domain;
use crate::error::UploadError;
use crate::payload::cardiovascular::{CardiovascularPayload, extract_cardiovascular_records};
use crate::payload::maternal::{MaternalRecord, extract_all, extract_maternal_record};
use crate::payload::{Demographics, build_from_table, validate_demographics};
use crate::prediction::PredictionClient;
use crate::recommend::ollama::OllamaClient;
use crate::recommend::{Recommendation, Recommender, TextGenerator};
use crate::store::{FileStore, KeyValueStore, NewPatient, NewReport, PatientStore};

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessingStage {
    ReadingFile,
    ParsingCsv,
    BuildingPayload,
    CallingApi,
    ParsingResponse,
    GeneratingRecommendations,
    Saving,
    Complete,
    Error,
}

impl ProcessingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadingFile => "reading-file",
            Self::ParsingCsv => "parsing-csv",
            Self::BuildingPayload => "building-payload",
            Self::CallingApi => "calling-api",
            Self::ParsingResponse => "parsing-response",
            Self::GeneratingRecommendations => "generating-recommendations",
            Self::Saving => "saving",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    /// Progress percentage shown for the stage.
    pub fn progress(&self) -> u8 {
        match self {
            Self::ReadingFile => 10,
            Self::ParsingCsv => 25,
            Self::BuildingPayload => 40,
            Self::CallingApi => 60,
            Self::ParsingResponse => 80,
            Self::GeneratingRecommendations => 90,
            Self::Saving => 95,
            Self::Complete => 100,
            Self::Error => 0,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::ReadingFile => "Reading CSV file...",
            Self::ParsingCsv => "Parsing CSV data...",
            Self::BuildingPayload => "Building API payload...",
            Self::CallingApi => "Calling prediction API...",
            Self::ParsingResponse => "Processing API response...",
            Self::GeneratingRecommendations => "Generating recommendations...",
            Self::Saving => "Saving patient report...",
            Self::Complete => "Analysis complete!",
            Self::Error => "Error occurred",
        }
    }
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Result of one upload. Failures are carried in `error`, never as `Err`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UploadOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// The input as sent upstream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction: Option<PredictionResponse>,
    /// Chart-ready diabetes data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed: Option<ParsedDiabetesData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
}

impl UploadOutcome {
    pub fn failure(err: &UploadError) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
            error_kind: Some(err.kind().to_string()),
            ..Self::default()
        }
    }
}

/// One row of a maternal series upload with its prediction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesEntry {
    pub index: usize,
    /// Value of the row's `timestamp` column, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub data: MaternalRecord,
    pub prediction: MaternalPrediction,
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Collaborators of an upload. Only the prediction client and analytics are
/// required; without a recommender or store those stages are skipped.
pub struct UploadContext<'a, G = OllamaClient, S = FileStore> {
    client: &'a PredictionClient,
    analytics: &'a Analytics,
    recommender: Option<&'a Recommender<G>>,
    store: Option<&'a PatientStore<S>>,
    observer: Option<&'a dyn Fn(ProcessingStage)>,
}

impl<'a> UploadContext<'a> {
    pub fn new(client: &'a PredictionClient, analytics: &'a Analytics) -> Self {
        Self {
            client,
            analytics,
            recommender: None,
            store: None,
            observer: None,
        }
    }
}

impl<'a, G, S> UploadContext<'a, G, S> {
    pub fn with_recommender<G2>(self, recommender: &'a Recommender<G2>) -> UploadContext<'a, G2, S> {
        UploadContext {
            client: self.client,
            analytics: self.analytics,
            recommender: Some(recommender),
            store: self.store,
            observer: self.observer,
        }
    }

    pub fn with_store<S2>(self, store: &'a PatientStore<S2>) -> UploadContext<'a, G, S2> {
        UploadContext {
            client: self.client,
            analytics: self.analytics,
            recommender: self.recommender,
            store: Some(store),
            observer: self.observer,
        }
    }

    /// Called on every stage transition.
    pub fn on_stage(mut self, observer: &'a dyn Fn(ProcessingStage)) -> Self {
        self.observer = Some(observer);
        self
    }
}

// ---------------------------------------------------------------------------
// Run bookkeeping
// ---------------------------------------------------------------------------

struct Run<'c, 'a, G, S> {
    ctx: &'c UploadContext<'a, G, S>,
    stage: ProcessingStage,
    started: Instant,
    entry: UploadLogEntry,
}

impl<'c, 'a, G: TextGenerator, S: KeyValueStore> Run<'c, 'a, G, S> {
    fn start(ctx: &'c UploadContext<'a, G, S>, domain: Domain, file_name: Option<&str>) -> Self {
        let mut entry = UploadLogEntry::new(domain);
        entry.file_name = file_name.map(str::to_string);
        Self {
            ctx,
            stage: ProcessingStage::ReadingFile,
            started: Instant::now(),
            entry,
        }
    }

    fn stage(&mut self, stage: ProcessingStage) {
        self.stage = stage;
        if let Some(observer) = self.ctx.observer {
            observer(stage);
        }
        self.ctx.analytics.log_event(
            DiagnosticEvent::debug("pipeline", stage.as_str(), stage.message())
                .with("domain", self.entry.domain.as_str()),
        );
    }

    /// Log a non-fatal failure and keep going.
    fn swallow(&self, action: &str, err: &UploadError) {
        self.ctx.analytics.log_event(
            DiagnosticEvent::error("pipeline", action, err.to_string())
                .with("domain", self.entry.domain.as_str())
                .with("kind", err.kind()),
        );
    }

    /// Shared prefix of every flow: file checks and CSV parsing.
    fn read_table(&mut self, file_name: Option<&str>, csv: &str) -> Result<RawCsvTable, UploadError> {
        self.stage(ProcessingStage::ReadingFile);
        validate_upload(file_name)?;

        self.stage(ProcessingStage::ParsingCsv);
        let table = parse_csv(csv)?;
        self.entry.rows = table.len();
        Ok(table)
    }

    fn predict<T>(&mut self, call: impl FnOnce(&PredictionClient) -> Result<T, UploadError>) -> Result<T, UploadError> {
        self.stage(ProcessingStage::CallingApi);
        let start = Instant::now();
        let result = call(self.ctx.client);
        self.entry.prediction_latency_ms = Some(start.elapsed().as_millis() as u64);
        result
    }

    /// Best-effort narrative.
    fn recommend(&mut self, call: impl FnOnce(&Recommender<G>) -> Result<Recommendation, UploadError>) -> Option<String> {
        let recommender = self.ctx.recommender?;
        self.stage(ProcessingStage::GeneratingRecommendations);

        match call(recommender) {
            Ok(rec) => {
                self.entry.recommendation_latency_ms = Some(rec.latency_ms);
                self.entry.recommendation = true;
                Some(rec.text)
            }
            Err(err) => {
                self.swallow("generate-recommendations", &err);
                None
            }
        }
    }

    fn finish(mut self, result: Result<UploadOutcome, UploadError>) -> UploadOutcome {
        let outcome = match result {
            Ok(outcome) => {
                self.stage(ProcessingStage::Complete);
                self.entry.success = true;
                outcome
            }
            Err(err) => {
                self.ctx.analytics.log_event(
                    DiagnosticEvent::error("pipeline", "file-upload", err.to_string())
                        .with("domain", self.entry.domain.as_str())
                        .with("stage", self.stage.as_str())
                        .with("kind", err.kind()),
                );
                self.entry.error_kind = Some(err.kind().to_string());
                self.entry.failed_stage = Some(self.stage.as_str().to_string());
                self.stage(ProcessingStage::Error);
                UploadOutcome::failure(&err)
            }
        };

        self.entry.total_latency_ms = self.started.elapsed().as_millis() as u64;
        self.ctx.analytics.log_upload(&self.entry);
        outcome
    }
}

// ---------------------------------------------------------------------------
// Flows
// ---------------------------------------------------------------------------

/// Maternal upload: the first data row is classified.
pub fn run_maternal_upload<G: TextGenerator, S: KeyValueStore>(
    ctx: &UploadContext<'_, G, S>,
    file_name: Option<&str>,
    csv: &str,
) -> UploadOutcome {
    let mut run = Run::start(ctx, Domain::Maternal, file_name);
    let result = maternal(&mut run, file_name, csv);
    run.finish(result)
}

fn maternal<G: TextGenerator, S: KeyValueStore>(
    run: &mut Run<'_, '_, G, S>,
    file_name: Option<&str>,
    csv: &str,
) -> Result<UploadOutcome, UploadError> {
    let table = run.read_table(file_name, csv)?;

    run.stage(ProcessingStage::BuildingPayload);
    let record = extract_maternal_record(&table, 0)?;
    run.entry.patients = 1;

    let prediction = run.predict(|client| client.predict_maternal(&record))?;

    run.stage(ProcessingStage::ParsingResponse);
    let recommendations = run.recommend(|r| r.maternal(&record, &prediction));

    Ok(UploadOutcome {
        success: true,
        data: serde_json::to_value(&record).ok(),
        prediction: Some(PredictionResponse::Maternal(prediction)),
        recommendations,
        ..UploadOutcome::default()
    })
}

/// Maternal series upload: every row is classified concurrently and the
/// narrative is written for the latest row.
pub fn run_maternal_series_upload<G: TextGenerator, S: KeyValueStore>(
    ctx: &UploadContext<'_, G, S>,
    file_name: Option<&str>,
    csv: &str,
) -> UploadOutcome {
    let mut run = Run::start(ctx, Domain::Maternal, file_name);
    let result = maternal_series(&mut run, file_name, csv);
    run.finish(result)
}

fn maternal_series<G: TextGenerator, S: KeyValueStore>(
    run: &mut Run<'_, '_, G, S>,
    file_name: Option<&str>,
    csv: &str,
) -> Result<UploadOutcome, UploadError> {
    let table = run.read_table(file_name, csv)?;

    run.stage(ProcessingStage::BuildingPayload);
    let records = extract_all(&table)?;
    run.entry.patients = records.len();

    let predictions = run.predict(|client| client.predict_maternal_series(&records))?;

    run.stage(ProcessingStage::ParsingResponse);
    let timestamps = table.column("timestamp");
    let series: Vec<SeriesEntry> = records
        .iter()
        .zip(&predictions)
        .enumerate()
        .map(|(index, (record, prediction))| SeriesEntry {
            index,
            timestamp: timestamps
                .and_then(|col| table.rows.get(index).and_then(|row| row.get(col)))
                .filter(|ts| !ts.is_empty())
                .cloned(),
            data: *record,
            prediction: prediction.clone(),
        })
        .collect();

    let recommendations = match series.last() {
        Some(latest) => run.recommend(|r| r.maternal(&latest.data, &latest.prediction)),
        None => None,
    };

    Ok(UploadOutcome {
        success: true,
        data: serde_json::to_value(&series).ok(),
        prediction: Some(PredictionResponse::MaternalSeries(predictions)),
        recommendations,
        ..UploadOutcome::default()
    })
}

/// Cardiovascular upload: every row is one patient of a cohort request.
pub fn run_cardiovascular_upload<G: TextGenerator, S: KeyValueStore>(
    ctx: &UploadContext<'_, G, S>,
    file_name: Option<&str>,
    csv: &str,
) -> UploadOutcome {
    let mut run = Run::start(ctx, Domain::Cardiovascular, file_name);
    let result = cardiovascular(&mut run, file_name, csv);
    run.finish(result)
}

fn cardiovascular<G: TextGenerator, S: KeyValueStore>(
    run: &mut Run<'_, '_, G, S>,
    file_name: Option<&str>,
    csv: &str,
) -> Result<UploadOutcome, UploadError> {
    let table = run.read_table(file_name, csv)?;

    run.stage(ProcessingStage::BuildingPayload);
    let payload = CardiovascularPayload {
        patients: extract_cardiovascular_records(&table)?,
    };
    run.entry.patients = payload.patients.len();
    run.entry.cohort = true;

    let prediction = run.predict(|client| client.predict_cardiovascular(&payload))?;

    run.stage(ProcessingStage::ParsingResponse);
    let recommendations = run.recommend(|r| r.cardiovascular(&prediction));

    Ok(UploadOutcome {
        success: true,
        data: serde_json::to_value(&payload.patients).ok(),
        prediction: Some(PredictionResponse::Cardiovascular(prediction)),
        recommendations,
        ..UploadOutcome::default()
    })
}

/// Diabetes upload: glucose rows grouped into a cohort payload, analysed, and
/// saved as a report on the patient named in `demographics`.
pub fn run_diabetes_upload<G: TextGenerator, S: KeyValueStore>(
    ctx: &UploadContext<'_, G, S>,
    file_name: Option<&str>,
    csv: &str,
    demographics: &Demographics,
) -> UploadOutcome {
    let mut run = Run::start(ctx, Domain::Diabetes, file_name);
    let result = diabetes(&mut run, file_name, csv, demographics);
    run.finish(result)
}

fn diabetes<G: TextGenerator, S: KeyValueStore>(
    run: &mut Run<'_, '_, G, S>,
    file_name: Option<&str>,
    csv: &str,
    demographics: &Demographics,
) -> Result<UploadOutcome, UploadError> {
    let table = run.read_table(file_name, csv)?;

    run.stage(ProcessingStage::BuildingPayload);
    validate_demographics(demographics)?;
    let payload = build_from_table(&table, demographics, Utc::now());
    run.entry.patients = payload.patients.len();
    run.entry.cohort = payload.is_cohort();

    let analysis = run.predict(|client| client.predict_glucose(&payload))?;

    run.stage(ProcessingStage::ParsingResponse);
    let prediction = DiabetesPrediction::from_api(analysis.raw()).ok_or_else(|| UploadError::Api {
        status: 200,
        body: "Failed to parse diabetes API response".to_string(),
    })?;
    let parsed = prediction.to_parsed_data();

    let recommendations = run.recommend(|r| r.diabetes(&analysis, Some(demographics), None, None));

    let mut outcome = UploadOutcome {
        success: true,
        data: serde_json::to_value(&payload).ok(),
        parsed: Some(parsed),
        recommendations,
        ..UploadOutcome::default()
    };

    let store = run.ctx.store;
    if let Some(store) = store {
        run.stage(ProcessingStage::Saving);
        let report = NewReport {
            analysis_date: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            glucose_data: payload
                .patients
                .first()
                .map(|p| p.data.iter().cloned().map(Value::Object).collect())
                .unwrap_or_default(),
            risk_factors: prediction.risk_factors(),
            ai_explanation: outcome.recommendations.clone(),
            raw_api_response: analysis.raw().clone(),
            payload: outcome.data.clone(),
        };

        let saved = store
            .save_patient(NewPatient::from(demographics))
            .and_then(|patient| {
                store
                    .add_report_to_patient(&patient.id, report)
                    .map(|report| (patient.id, report.id))
            });

        match saved {
            Ok((patient_id, report_id)) => {
                run.entry.saved = true;
                outcome.patient_id = Some(patient_id);
                outcome.report_id = Some(report_id);
            }
            Err(err) => run.swallow("save-patient-data", &UploadError::from(err)),
        }
    }

    outcome.prediction = Some(PredictionResponse::Diabetes(analysis));
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::config::{EndpointsConfig, PredictionConfig};

    fn offline_client() -> PredictionClient {
        // Port 9 (discard) on loopback: connection refused without a network.
        let endpoints = EndpointsConfig {
            maternal_url: "http://127.0.0.1:9/api/maternal".to_string(),
            cardiovascular_url: "http://127.0.0.1:9/api/cardiovascular".to_string(),
            glucose_url: "http://127.0.0.1:9/api/glucose".to_string(),
        };
        PredictionClient::new(&PredictionConfig { timeout_ms: 2000 }, &endpoints)
    }

    #[test]
    fn stage_progress_is_monotonic_until_complete() {
        let stages = [
            ProcessingStage::ReadingFile,
            ProcessingStage::ParsingCsv,
            ProcessingStage::BuildingPayload,
            ProcessingStage::CallingApi,
            ProcessingStage::ParsingResponse,
            ProcessingStage::GeneratingRecommendations,
            ProcessingStage::Saving,
            ProcessingStage::Complete,
        ];
        for pair in stages.windows(2) {
            assert!(pair[0].progress() < pair[1].progress());
        }
        assert_eq!(ProcessingStage::Error.progress(), 0);
        assert_eq!(
            serde_json::to_value(ProcessingStage::GeneratingRecommendations).unwrap(),
            "generating-recommendations"
        );
    }

    #[test]
    fn missing_file_fails_in_envelope() {
        let client = offline_client();
        let analytics = Analytics::disabled();
        let ctx = UploadContext::new(&client, &analytics);

        let outcome = run_maternal_upload(&ctx, None, "Age\n30");
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("No file provided"));
        assert_eq!(outcome.error_kind.as_deref(), Some("input"));
    }

    #[test]
    fn input_errors_stop_before_network() {
        let client = offline_client();
        let dir = tempfile::tempdir().unwrap();
        let analytics = Analytics::at(dir.path());
        let seen = RefCell::new(Vec::new());
        let observer = |stage: ProcessingStage| seen.borrow_mut().push(stage);
        let ctx = UploadContext::new(&client, &analytics).on_stage(&observer);

        let outcome = run_cardiovascular_upload(&ctx, Some("cohort.csv"), "age,systolic_bp\n");
        assert_eq!(outcome.error.as_deref(), Some("CSV file must contain headers and at least one data row"));
        assert_eq!(
            *seen.borrow(),
            vec![ProcessingStage::ReadingFile, ProcessingStage::ParsingCsv, ProcessingStage::Error]
        );

        let log = analytics.read_uploads(None);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].failed_stage.as_deref(), Some("parsing-csv"));
        assert!(!log[0].success);
    }

    #[test]
    fn diabetes_requires_demographics() {
        let client = offline_client();
        let analytics = Analytics::disabled();
        let ctx = UploadContext::new(&client, &analytics);
        let demographics = Demographics {
            name: String::new(),
            age: 0,
            gender: String::new(),
            weight: None,
            height: None,
        };

        let outcome = run_diabetes_upload(&ctx, Some("g.csv"), "glucose\n120", &demographics);
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind.as_deref(), Some("input"));
    }

    #[test]
    fn network_failure_is_reported_at_calling_api() {
        let client = offline_client();
        let dir = tempfile::tempdir().unwrap();
        let analytics = Analytics::at(dir.path());
        let ctx = UploadContext::new(&client, &analytics);

        let csv = "Age,SystolicBP,DiastolicBP,BS,BodyTemp,HeartRate\n25,120,80,7.5,98,72";
        let outcome = run_maternal_upload(&ctx, Some("m.csv"), csv);
        assert_eq!(outcome.error_kind.as_deref(), Some("network"));
        assert!(outcome.error.unwrap().starts_with("Network error:"));

        let log = analytics.read_uploads(None);
        assert_eq!(log[0].failed_stage.as_deref(), Some("calling-api"));
        assert_eq!(log[0].rows, 1);
        assert!(log[0].prediction_latency_ms.is_some());
    }

    #[test]
    fn failure_envelope_omits_empty_fields() {
        let json = serde_json::to_value(UploadOutcome::failure(&UploadError::input("bad"))).unwrap();
        assert_eq!(json, serde_json::json!({ "success": false, "error": "bad", "error_kind": "input" }));
    }
}
