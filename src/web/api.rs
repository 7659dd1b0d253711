//! JSON API handlers for the web server.
//!
//! Each handler corresponds to an API endpoint and returns an
//! [`ApiResponse`] with a JSON body.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{ApiResponse, WebApp};
use crate::analytics::reporter::{TrendEntry, UploadStats};
use crate::config::{self, CaresightConfig, EndpointsConfig};
use crate::domain::Domain;
use crate::error::UploadError;
use crate::payload::Demographics;
use crate::pipeline::{
    UploadContext, UploadOutcome, run_cardiovascular_upload, run_diabetes_upload, run_maternal_series_upload,
    run_maternal_upload,
};
use crate::recommend::TextGenerator;
use crate::store::KeyValueStore;

// ---------------------------------------------------------------------------
// JSON request / response types
// ---------------------------------------------------------------------------

/// Body of `POST /api/upload/{kind}`.
#[derive(Debug, Deserialize)]
pub(crate) struct UploadRequest {
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    csv: String,
    #[serde(default)]
    demographics: Option<Demographics>,
}

#[derive(Serialize)]
struct ConfigResponse<'a> {
    config: &'a CaresightConfig,
    toml_text: String,
}

#[derive(Serialize)]
struct HealthResponse<'a> {
    version: &'static str,
    endpoints: &'a EndpointsConfig,
    recommendations_enabled: bool,
    ollama_available: bool,
    config_exists: bool,
    upload_log_exists: bool,
}

#[derive(Serialize)]
struct UploadStatsResponse {
    days: Option<u32>,
    stats: UploadStats,
    trends: Vec<TrendEntry>,
}

#[derive(Serialize)]
struct DeleteResponse {
    deleted: bool,
}

/// Parse the `?days=N` query parameter from a URL.
fn parse_days_param(url: &str) -> Option<u32> {
    url.split('?').nth(1)?.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        if k == "days" { v.parse().ok() } else { None }
    })
}

/// HTTP status for an upload envelope.
fn outcome_status(outcome: &UploadOutcome) -> u16 {
    match outcome.error_kind.as_deref() {
        None => 200,
        Some("input") => 400,
        Some(_) => 502,
    }
}

// ---------------------------------------------------------------------------
// Prediction proxies
// ---------------------------------------------------------------------------

/// Forward `body` to `url`, returning the upstream status and body verbatim.
pub fn proxy<S>(app: &WebApp<S>, url: &str, body: &str) -> ApiResponse {
    match app.client.post_raw(url, body) {
        Ok(raw) => ApiResponse {
            status: raw.status,
            body: raw.body,
        },
        Err(e) => ApiResponse::error(500, &e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Uploads
// ---------------------------------------------------------------------------

/// `POST /api/upload/{maternal|maternal-series|cardiovascular|diabetes}`
pub fn upload<S: KeyValueStore>(app: &WebApp<S>, kind: &str, body: &str) -> Result<ApiResponse> {
    let request: UploadRequest = match serde_json::from_str(body) {
        Ok(request) => request,
        Err(e) => return Ok(ApiResponse::error(400, &format!("invalid upload request: {e}"))),
    };

    let mut ctx = UploadContext::new(&app.client, &app.analytics).with_store(&app.store);
    if let Some(recommender) = &app.recommender {
        ctx = ctx.with_recommender(recommender);
    }

    let Some(outcome) = run_upload(&ctx, kind, &request) else {
        return Ok(ApiResponse::error(404, &format!("unknown upload type: {kind}")));
    };
    ApiResponse::json(outcome_status(&outcome), &outcome)
}

fn run_upload<G: TextGenerator, S: KeyValueStore>(
    ctx: &UploadContext<'_, G, S>,
    kind: &str,
    request: &UploadRequest,
) -> Option<UploadOutcome> {
    let file_name = request.file_name.as_deref();
    let csv = request.csv.as_str();

    if kind == "maternal-series" {
        return Some(run_maternal_series_upload(ctx, file_name, csv));
    }
    Some(match Domain::parse(kind)? {
        Domain::Maternal => run_maternal_upload(ctx, file_name, csv),
        Domain::Cardiovascular => run_cardiovascular_upload(ctx, file_name, csv),
        Domain::Diabetes => match &request.demographics {
            Some(demographics) => run_diabetes_upload(ctx, file_name, csv, demographics),
            None => UploadOutcome::failure(&UploadError::input(
                "Please fill in all required patient information (Name, Age, Gender)",
            )),
        },
    })
}

// ---------------------------------------------------------------------------
// Patient store
// ---------------------------------------------------------------------------

/// `GET /api/patients`
pub fn list_patients<S: KeyValueStore>(app: &WebApp<S>) -> Result<ApiResponse> {
    let patients = app.store.patients().context("failed to load patients")?;
    ApiResponse::json(200, &patients)
}

/// `GET /api/patients/stats`
pub fn patient_stats<S: KeyValueStore>(app: &WebApp<S>) -> Result<ApiResponse> {
    let stats = app.store.get_patient_stats(Utc::now()).context("failed to load patients")?;
    ApiResponse::json(200, &stats)
}

/// `GET /api/patients/{id}`
pub fn get_patient<S: KeyValueStore>(app: &WebApp<S>, id: &str) -> Result<ApiResponse> {
    match app.store.get_patient_by_id(id).context("failed to load patients")? {
        Some(patient) => ApiResponse::json(200, &patient),
        None => Ok(ApiResponse::error(404, &format!("patient not found: {id}"))),
    }
}

/// `DELETE /api/patients/{id}`
pub fn delete_patient<S: KeyValueStore>(app: &WebApp<S>, id: &str) -> Result<ApiResponse> {
    let deleted = app.store.delete_patient(id).context("failed to delete patient")?;
    ApiResponse::json(200, &DeleteResponse { deleted })
}

/// `DELETE /api/patients/{id}/reports/{report_id}`
pub fn delete_report<S: KeyValueStore>(app: &WebApp<S>, id: &str, report_id: &str) -> Result<ApiResponse> {
    let deleted = app
        .store
        .delete_report(id, report_id)
        .context("failed to delete report")?;
    ApiResponse::json(200, &DeleteResponse { deleted })
}

// ---------------------------------------------------------------------------
// Analytics, config, health
// ---------------------------------------------------------------------------

/// `GET /api/uploads/stats?days=N`
pub fn upload_stats<S>(app: &WebApp<S>, url: &str) -> Result<ApiResponse> {
    let days = parse_days_param(url);
    let resp = UploadStatsResponse {
        days,
        stats: app.analytics.upload_stats(days),
        trends: app.analytics.upload_trends(days),
    };
    ApiResponse::json(200, &resp)
}

/// `GET /api/config`: the configuration the server was started with.
pub fn get_config<S>(app: &WebApp<S>) -> Result<ApiResponse> {
    let toml_text = toml::to_string_pretty(&app.config).context("failed to render config")?;
    ApiResponse::json(
        200,
        &ConfigResponse {
            config: &app.config,
            toml_text,
        },
    )
}

/// `GET /api/health`
pub fn get_health<S>(app: &WebApp<S>) -> Result<ApiResponse> {
    let config_exists = config::global_config_file()
        .map(|p| p.exists())
        .unwrap_or(false);
    let upload_log_exists = app
        .analytics
        .upload_log_path()
        .map(|p| p.exists())
        .unwrap_or(false);

    let resp = HealthResponse {
        version: env!("CARGO_PKG_VERSION"),
        endpoints: &app.config.endpoints,
        recommendations_enabled: app.recommender.is_some(),
        ollama_available: app
            .recommender
            .as_ref()
            .is_some_and(|r| r.generator().is_healthy()),
        config_exists,
        upload_log_exists,
    };
    ApiResponse::json(200, &resp)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_days_param_extracts_value() {
        assert_eq!(parse_days_param("/api/uploads/stats?days=7"), Some(7));
        assert_eq!(parse_days_param("/api/uploads/stats?foo=bar&days=14"), Some(14));
    }

    #[test]
    fn parse_days_param_returns_none_for_missing_or_invalid() {
        assert_eq!(parse_days_param("/api/uploads/stats"), None);
        assert_eq!(parse_days_param("/api/uploads/stats?days=abc"), None);
        assert_eq!(parse_days_param("/api/uploads/stats?days="), None);
    }

    #[test]
    fn outcome_status_by_kind() {
        let ok = UploadOutcome {
            success: true,
            ..UploadOutcome::default()
        };
        assert_eq!(outcome_status(&ok), 200);
        let input = UploadOutcome::failure(&UploadError::input("bad"));
        assert_eq!(outcome_status(&input), 400);
        let network = UploadOutcome::failure(&UploadError::Network("refused".to_string()));
        assert_eq!(outcome_status(&network), 502);
    }

    #[test]
    fn upload_request_defaults() {
        let req: UploadRequest = serde_json::from_str(r#"{"csv": "a\n1"}"#).unwrap();
        assert!(req.file_name.is_none());
        assert!(req.demographics.is_none());

        let req: UploadRequest = serde_json::from_str(
            r#"{"file_name": "g.csv", "csv": "", "demographics": {"name": "Ann", "age": 40, "gender": "female"}}"#,
        )
        .unwrap();
        assert_eq!(req.demographics.unwrap().age, 40);
    }
}
