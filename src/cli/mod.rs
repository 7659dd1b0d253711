//! CLI command implementations for caresight.
//!
//! Provides subcommand handlers for:
//! - `caresight maternal|cardio|diabetes FILE`: run an upload and render it
//! - `caresight analyze RESPONSE.json`: chart data from a saved glucose response
//! - `caresight patients list|show|delete|delete-report|stats`: local store
//! - `caresight stats --days N`: upload statistics and daily trends
//! - `caresight health`: endpoints, Ollama, config and log files
//! - `caresight config show|init|set|reset`: configuration management

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use colored::Colorize;

use crate::analysis::{
    CardiovascularPrediction, DiabetesAnalysis, DiabetesPrediction, MaternalPrediction, ParsedDiabetesData,
    PredictionResponse,
};
use crate::analytics::Analytics;
use crate::analytics::reporter::{TrendEntry, UploadStats};
use crate::config::{self, CaresightConfig};
use crate::payload::Demographics;
use crate::pipeline::{
    ProcessingStage, UploadContext, UploadOutcome, run_cardiovascular_upload, run_diabetes_upload,
    run_maternal_series_upload, run_maternal_upload,
};
use crate::prediction::PredictionClient;
use crate::recommend::Recommender;
use crate::recommend::ollama::OllamaClient;
use crate::store::{FileStore, PatientStore, StoredPatient};

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl OutputFormat {
    pub fn from_str_opt(s: Option<&str>) -> Self {
        match s {
            Some("json") => Self::Json,
            Some("csv") => Self::Csv,
            _ => Self::Table,
        }
    }
}

/// Switches shared by the upload subcommands.
#[derive(Debug, Clone, Copy)]
pub struct UploadOptions {
    pub format: OutputFormat,
    /// Ask the text model for a narrative (still subject to config).
    pub recommend: bool,
    /// Save diabetes reports to the patient store.
    pub save: bool,
}

fn open_store(cfg: &CaresightConfig, analytics: &Analytics) -> Result<PatientStore<FileStore>> {
    let dir = cfg
        .storage
        .resolved_data_dir()
        .with_context(|| format!("cannot resolve data directory {}", cfg.storage.data_dir))?;
    Ok(PatientStore::open(dir).with_analytics(analytics.clone()))
}

fn read_upload(path: &Path) -> Result<(String, String)> {
    let csv = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok((name, csv))
}

// ---------------------------------------------------------------------------
// caresight maternal | cardio | diabetes
// ---------------------------------------------------------------------------

/// Build the upload context from config, run `upload`, and render the result.
fn run_upload_command(
    opts: UploadOptions,
    upload: impl FnOnce(&UploadContext<'_, OllamaClient, FileStore>) -> UploadOutcome,
) -> Result<()> {
    let cfg = config::load();
    let client = PredictionClient::from_config(&cfg);
    let analytics = Analytics::from_config(&cfg.logging);
    let recommender = (opts.recommend && cfg.recommendations.enabled)
        .then(|| Recommender::from_config(&cfg.recommendations));
    let store = if opts.save {
        Some(open_store(&cfg, &analytics)?)
    } else {
        None
    };

    let progress = |stage: ProcessingStage| {
        if opts.format == OutputFormat::Table && stage != ProcessingStage::Error {
            eprintln!("{}", format!("[{:>3}%] {}", stage.progress(), stage.message()).dimmed());
        }
    };

    let mut ctx = UploadContext::new(&client, &analytics).on_stage(&progress);
    if let Some(recommender) = &recommender {
        ctx = ctx.with_recommender(recommender);
    }
    if let Some(store) = &store {
        ctx = ctx.with_store(store);
    }

    let outcome = upload(&ctx);
    render_outcome(&outcome, opts.format)
}

pub fn run_maternal(path: &Path, series: bool, opts: UploadOptions) -> Result<()> {
    let (name, csv) = read_upload(path)?;
    run_upload_command(opts, |ctx| {
        if series {
            run_maternal_series_upload(ctx, Some(&name), &csv)
        } else {
            run_maternal_upload(ctx, Some(&name), &csv)
        }
    })
}

pub fn run_cardio(path: &Path, opts: UploadOptions) -> Result<()> {
    let (name, csv) = read_upload(path)?;
    run_upload_command(opts, |ctx| run_cardiovascular_upload(ctx, Some(&name), &csv))
}

pub fn run_diabetes(path: &Path, demographics: &Demographics, opts: UploadOptions) -> Result<()> {
    let (name, csv) = read_upload(path)?;
    run_upload_command(opts, |ctx| run_diabetes_upload(ctx, Some(&name), &csv, demographics))
}

fn render_outcome(outcome: &UploadOutcome, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
    }
    if !outcome.success {
        bail!(
            "{}",
            outcome.error.clone().unwrap_or_else(|| "upload failed".to_string())
        );
    }
    if format == OutputFormat::Json {
        return Ok(());
    }

    match &outcome.prediction {
        Some(PredictionResponse::Maternal(prediction)) => print_maternal(prediction),
        Some(PredictionResponse::MaternalSeries(predictions)) => print_maternal_series(predictions),
        Some(PredictionResponse::Cardiovascular(prediction)) => print_cardiovascular(prediction),
        Some(PredictionResponse::Diabetes(analysis)) => print_cohort_patients(analysis),
        None => {}
    }
    if let Some(parsed) = &outcome.parsed {
        print_diabetes(parsed);
    }

    if let Some(patient_id) = &outcome.patient_id {
        println!();
        println!(
            "{} Saved report {} for patient {}",
            "✓".green().bold(),
            outcome.report_id.as_deref().unwrap_or("-"),
            patient_id.bold()
        );
    }

    if let Some(text) = &outcome.recommendations {
        println!();
        println!("{}", "Recommendations".bold().cyan());
        println!("{}", "=".repeat(60));
        println!("{text}");
    }

    Ok(())
}

fn print_maternal(prediction: &MaternalPrediction) {
    println!("{}", "Maternal Risk Assessment".bold().cyan());
    println!("{}", "=".repeat(60));
    println!("  {} {}", "Prediction:".bold(), colorize_level(&prediction.prediction));
    println!();

    println!("{}", "Probabilities".bold().cyan());
    for (label, p) in prediction.probabilities.entries() {
        println!("  {:<10} {:>5.1}% {}", label, p * 100.0, bar(p, 30));
    }

    let steps = prediction.waterfall();
    if !steps.is_empty() {
        println!();
        println!("{}", "Contributing Factors (SHAP, cumulative)".bold().cyan());
        println!("  {:<14} {:>8} {:>8}", "Feature", "Value", "Total");
        for step in steps.iter().take(6) {
            let value = format!("{:>+8.3}", step.value);
            let value = if step.value > 0.0 { value.red() } else { value.green() };
            println!("  {:<14} {} {:>+8.3}", step.feature, value, step.end);
        }
    }
}

fn print_maternal_series(predictions: &[MaternalPrediction]) {
    println!("{}", "Maternal Risk Series".bold().cyan());
    println!("{}", "=".repeat(60));
    println!("  {:<6} {:<12} {:>8} {:>8} {:>8}", "Row", "Prediction", "Low", "Mid", "High");
    println!("  {}", "-".repeat(46));

    for (i, p) in predictions.iter().enumerate() {
        println!(
            "  {:<6} {:<12} {:>7.1}% {:>7.1}% {:>7.1}%",
            format!("#{}", i + 1),
            truncate(&p.prediction, 12),
            p.probabilities.low * 100.0,
            p.probabilities.mid * 100.0,
            p.probabilities.high * 100.0,
        );
    }
}

fn print_cardiovascular(prediction: &CardiovascularPrediction) {
    let stats = &prediction.cohort_statistics;
    println!("{}", "Cardiovascular Cohort Report".bold().cyan());
    println!("{}", "=".repeat(60));
    println!("  {} {}", "Patients:       ".bold(), stats.total_patients);
    println!("  {} {:.1}%", "Average risk:   ".bold(), stats.average_risk_score * 100.0);
    println!(
        "  {} {} ({:.1}%)",
        "High risk:      ".bold(),
        stats.high_risk_patients,
        stats.high_risk_percentage
    );
    println!(
        "  {} {} medium / {} low",
        "Others:         ".bold(),
        stats.medium_risk_patients,
        stats.low_risk_patients
    );

    let top = prediction.top_risk_patients(5);
    if !top.is_empty() {
        println!();
        println!("{}", "Highest-Risk Patients".bold().cyan());
        println!("  {:<12} {:>8} Level", "Patient", "Risk");
        println!("  {}", "-".repeat(30));
        for p in top {
            println!(
                "  {:<12} {:>7.1}% {}",
                truncate(&p.patient_id, 12),
                p.risk_score * 100.0,
                colorize_level(&p.risk_level)
            );
        }
    }

    let features = prediction.feature_importance();
    if !features.is_empty() {
        println!();
        println!("{}", "Feature Importance (mean |SHAP|)".bold().cyan());
        for (feature, value) in features.iter().take(8) {
            println!("  {:<22} {:>7.3}", truncate(feature, 22), value);
        }
    }
}

/// One line per patient of a cohort glucose response; nothing for a single
/// patient.
fn print_cohort_patients(analysis: &DiabetesAnalysis) {
    let patients = analysis.patient_analyses();
    if patients.is_empty() {
        return;
    }
    println!("{}", "Cohort Patients".bold().cyan());
    println!("{}", "=".repeat(60));
    println!("  {:<16} {:>8} Level", "Patient", "Risk");
    for patient in &patients {
        let id = patient.patient_id().map(|id| id.to_string()).unwrap_or_else(|| "-".to_string());
        let level = patient.overall_risk_level().unwrap_or_else(|| "unknown".to_string());
        println!(
            "  {:<16} {:>8} {}",
            truncate(&id, 16),
            patient
                .overall_risk_score()
                .map(|s| format!("{:.1}%", s * 100.0))
                .unwrap_or_else(|| "-".to_string()),
            colorize_level(&level)
        );
    }
    println!();
}

fn print_diabetes(parsed: &ParsedDiabetesData) {
    println!("{}", "Diabetes Risk Analysis".bold().cyan());
    println!("{}", "=".repeat(60));

    match &parsed.overall_risk {
        Some(overall) => println!(
            "  {} {:.1}% ({})",
            "Overall risk:".bold(),
            overall.score * 100.0,
            colorize_level(&overall.level)
        ),
        None => println!("  {} {}", "Overall risk:".bold(), "not reported".dimmed()),
    }

    if !parsed.horizon_risk_data.is_empty() {
        println!();
        println!("{}", "Risk by Horizon".bold().cyan());
        for point in &parsed.horizon_risk_data {
            println!(
                "  {:>4}d {:>6.1}% {} {}",
                point.horizon,
                point.risk * 100.0,
                bar(point.risk, 25),
                colorize_level(&point.level)
            );
        }
    }

    if !parsed.forecast_data.is_empty() {
        println!();
        println!("{}", "Glucose Forecast (mg/dL)".bold().cyan());
        println!("  {:>6} {:>8} {:>8} {:>8}", "Day", "P10", "P50", "P90");
        for point in &parsed.forecast_data {
            println!(
                "  {:>6} {:>8} {:>8} {:>8}",
                point.day,
                opt_number(point.p10),
                opt_number(point.p50),
                opt_number(point.p90)
            );
        }
    }

    if !parsed.recommendations.is_empty() {
        println!();
        println!("{}", "Model Recommendations".bold().cyan());
        for rec in &parsed.recommendations {
            println!("  - {rec}");
        }
    }
}

// ---------------------------------------------------------------------------
// caresight analyze
// ---------------------------------------------------------------------------

/// Render a saved glucose API response, optionally with a narrative.
pub fn run_analyze(path: &Path, horizon: Option<&str>, recommend: bool, format: OutputFormat) -> Result<()> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))?;
    let prediction = DiabetesPrediction::from_api(&value)
        .with_context(|| format!("{} does not contain a glucose analysis object", path.display()))?;
    let parsed = prediction.to_parsed_data();

    let narrative = if recommend {
        let cfg = config::load();
        let recommender = Recommender::from_config(&cfg.recommendations);
        let analysis = DiabetesAnalysis::from_api(value);
        Some(
            recommender
                .diabetes(&analysis, None, horizon, None)
                .context("failed to generate recommendations")?
                .text,
        )
    } else {
        None
    };

    match format {
        OutputFormat::Json => {
            let out = serde_json::json!({
                "summary": prediction.risk_summary(),
                "parsed": parsed,
                "risk_factors": prediction.risk_factors(),
                "recommendations": narrative,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Csv => {
            println!("day,p10,p50,p90");
            for p in &parsed.forecast_data {
                println!("{},{},{},{}", p.day, opt_number(p.p10), opt_number(p.p50), opt_number(p.p90));
            }
        }
        OutputFormat::Table => {
            print_diabetes(&parsed);
            let factors = prediction.risk_factors();
            if !factors.is_empty() {
                println!();
                println!("{}", "Risk Factors".bold().cyan());
                for (name, value) in &factors {
                    println!("  {:<18} {:>6.1}%", name, value * 100.0);
                }
            }
            if let Some(text) = narrative {
                println!();
                println!("{}", "Recommendations".bold().cyan());
                println!("{}", "=".repeat(60));
                println!("{text}");
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// caresight patients
// ---------------------------------------------------------------------------

fn patient_store() -> Result<PatientStore<FileStore>> {
    let cfg = config::load();
    let analytics = Analytics::from_config(&cfg.logging);
    open_store(&cfg, &analytics)
}

pub fn run_patients_list(format: OutputFormat) -> Result<()> {
    let patients = patient_store()?.patients()?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&patients)?),
        OutputFormat::Csv => {
            println!("id,name,age,gender,reports,last_updated");
            for p in &patients {
                println!(
                    "{},{},{},{},{},{}",
                    p.id,
                    p.name,
                    p.age,
                    p.gender,
                    p.reports.len(),
                    p.last_updated.to_rfc3339()
                );
            }
        }
        OutputFormat::Table => {
            if patients.is_empty() {
                println!("{}", "No saved patients yet. Run `caresight diabetes` to add one.".yellow());
                return Ok(());
            }
            println!("{}", "Saved Patients".bold().cyan());
            println!("{}", "=".repeat(72));
            println!("  {:<30} {:<18} {:>4} {:>8} Updated", "Id", "Name", "Age", "Reports");
            println!("  {}", "-".repeat(70));
            for (i, p) in patients.iter().enumerate() {
                let line = format!(
                    "  {:<30} {:<18} {:>4} {:>8} {}",
                    truncate(&p.id, 30),
                    truncate(&p.name, 18),
                    p.age,
                    p.reports.len(),
                    p.last_updated.format("%Y-%m-%d %H:%M"),
                );
                if i % 2 == 0 {
                    println!("{line}");
                } else {
                    println!("{}", line.dimmed());
                }
            }
        }
    }
    Ok(())
}

pub fn run_patients_show(id: &str, format: OutputFormat) -> Result<()> {
    let Some(patient) = patient_store()?.get_patient_by_id(id)? else {
        bail!("patient not found: {id}");
    };

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&patient)?);
        return Ok(());
    }
    print_patient(&patient);
    Ok(())
}

fn print_patient(patient: &StoredPatient) {
    println!("{}", patient.name.bold().cyan());
    println!("{}", "=".repeat(50));
    println!("  {} {}", "Id:     ".bold(), patient.id);
    println!("  {} {} / {}", "Profile:".bold(), patient.age, patient.gender);
    if let (Some(w), Some(h)) = (patient.weight, patient.height) {
        println!("  {} {w} kg / {h} cm", "Body:   ".bold());
    }
    println!("  {} {}", "Created:".bold(), patient.created_at.format("%Y-%m-%d %H:%M"));
    println!();

    if patient.reports.is_empty() {
        println!("  {}", "No reports.".dimmed());
        return;
    }
    println!("{}", "Reports (oldest first)".bold().cyan());
    for report in &patient.reports {
        let risk = report
            .raw_api_response
            .get("risk_assessment")
            .and_then(|r| r.get("overall_risk_level"))
            .and_then(|l| l.as_str())
            .unwrap_or("unknown");
        println!(
            "  {:<30} {} {} {}",
            report.id,
            report.timestamp.format("%Y-%m-%d %H:%M"),
            colorize_level(risk),
            if report.ai_explanation.is_some() {
                "(narrative)".dimmed()
            } else {
                "".normal()
            }
        );
    }
}

pub fn run_patients_delete(id: &str) -> Result<()> {
    if patient_store()?.delete_patient(id)? {
        println!("{} Deleted patient {}", "✓".green().bold(), id.bold());
    } else {
        println!("{}", format!("No patient with id {id}.").yellow());
    }
    Ok(())
}

pub fn run_patients_delete_report(id: &str, report_id: &str) -> Result<()> {
    if patient_store()?.delete_report(id, report_id)? {
        println!("{} Deleted report {}", "✓".green().bold(), report_id.bold());
    } else {
        println!("{}", format!("No report {report_id} for patient {id}.").yellow());
    }
    Ok(())
}

pub fn run_patients_stats(format: OutputFormat) -> Result<()> {
    let stats = patient_store()?.get_patient_stats(Utc::now())?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    println!("{}", "Patient Store".bold().cyan());
    println!("{}", "=".repeat(40));
    println!("  {} {}", "Patients:            ".bold(), stats.total_patients);
    println!("  {} {}", "Reports:             ".bold(), stats.total_reports);
    println!("  {} {:.1}", "Reports per patient: ".bold(), stats.average_reports_per_patient);
    println!("  {} {}", "Reports (30 days):   ".bold(), stats.recent_activity);
    Ok(())
}

// ---------------------------------------------------------------------------
// caresight stats
// ---------------------------------------------------------------------------

/// Show upload statistics and daily trends.
pub fn run_stats(format: OutputFormat, days: Option<u32>) -> Result<()> {
    let cfg = config::load();
    let analytics = Analytics::from_config(&cfg.logging);
    let stats = analytics.upload_stats(days);
    let trends = analytics.upload_trends(days);

    if stats.total_uploads == 0 {
        println!("{}", "No uploads logged yet. Run an upload to see stats.".yellow());
        return Ok(());
    }

    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({ "stats": stats, "trends": trends });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Csv => print_stats_csv(&stats),
        OutputFormat::Table => print_stats_table(&stats, &trends),
    }
    Ok(())
}

fn print_stats_table(stats: &UploadStats, trends: &[TrendEntry]) {
    println!("{}", "caresight Upload Report".bold().cyan());
    println!("{}", "=".repeat(60));
    println!();
    println!("  {} {}", "Total uploads: ".bold(), stats.total_uploads);
    println!(
        "  {} {} ({:.1}%)",
        "Successful:    ".bold(),
        stats.successful,
        stats.success_rate_pct
    );
    println!("  {} {}", "Patients:      ".bold(), stats.total_patients);
    println!("  {} {:.1}%", "With narrative:".bold(), stats.recommendation_rate_pct);
    println!();

    println!("{}", "By Domain".bold().cyan());
    println!(
        "  {:<16} {:>7} {:>8} {:>9} {:>12} {:>10}",
        "Domain", "Uploads", "Failures", "Patients", "Predict ms", "Total ms"
    );
    println!("  {}", "-".repeat(66));
    for d in &stats.domain_stats {
        println!(
            "  {:<16} {:>7} {:>8} {:>9} {:>12} {:>10.0}",
            d.domain.as_str(),
            d.uploads,
            d.failures,
            d.patients,
            d.avg_prediction_ms.map(|ms| format!("{ms:.0}")).unwrap_or_else(|| "-".to_string()),
            d.avg_total_ms,
        );
    }

    if !stats.error_kinds.is_empty() {
        println!();
        println!("{}", "Failures by Kind".bold().cyan());
        for (kind, count) in &stats.error_kinds {
            println!("  {:<16} {:>5}", kind, count);
        }
    }

    if !trends.is_empty() {
        println!();
        println!("{}", "Daily Uploads".bold().cyan());
        println!("  {:<12} {:>8} {:>9} {:>9}", "Date", "Uploads", "Failures", "Patients");
        for t in trends {
            println!("  {:<12} {:>8} {:>9} {:>9}", t.date, t.uploads, t.failures, t.patients);
        }
    }
}

fn print_stats_csv(stats: &UploadStats) {
    println!("domain,uploads,failures,rows,patients,cohort_uploads,avg_prediction_ms,avg_total_ms");
    for d in &stats.domain_stats {
        println!(
            "{},{},{},{},{},{},{},{:.1}",
            d.domain,
            d.uploads,
            d.failures,
            d.rows,
            d.patients,
            d.cohort_uploads,
            d.avg_prediction_ms.map(|ms| format!("{ms:.1}")).unwrap_or_default(),
            d.avg_total_ms,
        );
    }
}

// ---------------------------------------------------------------------------
// caresight health
// ---------------------------------------------------------------------------

/// Check endpoints, Ollama, config files and logs.
pub fn run_health() -> Result<()> {
    println!("{}", "caresight Health Check".bold().cyan());
    println!("{}", "=".repeat(40));

    let global_exists = config::global_config_file()
        .map(|p| p.exists())
        .unwrap_or(false);
    let project_exists = config::project_config_file()
        .map(|p| p.exists())
        .unwrap_or(false);
    let cfg = config::load();
    print_health_item(
        "Global config",
        global_exists,
        if global_exists {
            "~/.caresight/config.toml found"
        } else {
            "not found (run `caresight config init` to create)"
        },
    );
    print_health_item(
        "Project config",
        project_exists,
        if project_exists {
            ".caresight.toml found"
        } else {
            "none (optional)"
        },
    );

    print_health_item("Maternal API", true, &cfg.endpoints.maternal_url);
    print_health_item("Cardiovascular API", true, &cfg.endpoints.cardiovascular_url);
    print_health_item("Glucose API", true, &cfg.endpoints.glucose_url);

    let rec = &cfg.recommendations;
    print_health_item(
        "Recommendations",
        rec.enabled,
        if rec.enabled {
            "enabled"
        } else {
            "disabled (set CARESIGHT_RECOMMENDATIONS=1 to enable)"
        },
    );
    if rec.enabled {
        let client = OllamaClient::from_config(rec);
        let ollama_ok = client.is_healthy();
        let detail = if ollama_ok {
            format!("reachable at {}", client.base_url())
        } else {
            "not reachable, is Ollama running?".to_string()
        };
        print_health_item("Ollama", ollama_ok, &detail);
        print_health_item("Model", true, &rec.model);
    }

    let data_dir = cfg.storage.resolved_data_dir();
    print_health_item(
        "Data directory",
        data_dir.is_some(),
        &data_dir
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "cannot resolve home directory".to_string()),
    );

    let analytics = Analytics::from_config(&cfg.logging);
    let log_exists = analytics
        .upload_log_path()
        .map(|p| p.exists())
        .unwrap_or(false);
    print_health_item(
        "Upload log",
        log_exists,
        &if !cfg.logging.enabled {
            "logging disabled".to_string()
        } else if log_exists {
            format!("{} entries", analytics.read_uploads(None).len())
        } else {
            "no log file yet".to_string()
        },
    );

    Ok(())
}

fn print_health_item(name: &str, ok: bool, detail: &str) {
    let status = if ok {
        "✓".green().bold()
    } else {
        "✗".red().bold()
    };
    println!("  {} {:<20} {}", status, name, detail.dimmed());
}

// ---------------------------------------------------------------------------
// caresight web
// ---------------------------------------------------------------------------

pub fn run_web(addr: Option<&str>) -> Result<()> {
    let cfg = config::load();
    let addr = addr.map(str::to_string).unwrap_or_else(|| cfg.web.addr.clone());
    let app = crate::web::WebApp::from_config(cfg)?;
    crate::web::serve(&addr, &app)
}

// ---------------------------------------------------------------------------
// caresight config show | init | set | reset
// ---------------------------------------------------------------------------

/// Show the effective (merged) configuration as TOML.
pub fn run_config_show() -> Result<()> {
    let toml_str = config::show_effective_config()?;
    println!("{}", "Effective caresight Configuration".bold().cyan());
    println!("{}", "=".repeat(50));
    println!();
    println!("{toml_str}");

    let global_exists = config::global_config_file()
        .map(|p| p.exists())
        .unwrap_or(false);
    let project_exists = config::project_config_file()
        .map(|p| p.exists())
        .unwrap_or(false);
    println!("{}", "Sources (highest priority last):".dimmed());
    println!("  {} built-in defaults", "·".dimmed());
    print_source(global_exists, "~/.caresight/config.toml");
    print_source(project_exists, ".caresight.toml");
    println!("  {} {}", "·".dimmed(), "CARESIGHT_* environment variables".dimmed());

    Ok(())
}

fn print_source(exists: bool, name: &str) {
    if exists {
        println!("  {} {}", "✓".green(), name.dimmed());
    } else {
        println!("  {} {}", "·".dimmed(), format!("{name} (not found)").dimmed());
    }
}

/// Initialize a default config file at `~/.caresight/config.toml`.
pub fn run_config_init(force: bool) -> Result<()> {
    let path = config::init_config(force)?;
    println!("{} Config written to {}", "✓".green().bold(), path.display());
    println!("  {}", "Edit the file to point caresight at your prediction services.".dimmed());
    Ok(())
}

/// Set a single configuration value in the global config file.
pub fn run_config_set(key: &str, value: &str) -> Result<()> {
    config::set_config_value(key, value)?;
    println!("{} Set {} = {}", "✓".green().bold(), key.bold(), value);
    Ok(())
}

pub fn run_config_reset() -> Result<()> {
    let path = config::reset_config()?;
    println!("{} Config reset to defaults at {}", "✓".green().bold(), path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

/// Horizontal bar for a `0..=1` fraction.
fn bar(fraction: f64, width: usize) -> String {
    let filled = (fraction.clamp(0.0, 1.0) * width as f64).round() as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

fn opt_number(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.1}")).unwrap_or_else(|| "-".to_string())
}

/// Truncate a string to `max_len` characters, appending "…" if truncated.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}

/// Colorize a risk level label.
fn colorize_level(level: &str) -> colored::ColoredString {
    let lower = level.to_lowercase();
    if lower.contains("high") {
        level.red().bold()
    } else if lower.contains("mid") || lower.contains("medium") || lower.contains("moderate") {
        level.yellow()
    } else if lower.contains("low") {
        level.green()
    } else {
        level.normal()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
