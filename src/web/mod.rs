//! Embedded JSON server for caresight.
//!
//! A lightweight HTTP server (sync, via `tiny_http`) that plays the role of
//! the dashboard's server-side routes:
//! - proxy routes that forward request bodies to the prediction services
//! - upload routes that run the CSV pipelines
//! - the local patient store, upload stats, config and health
//!
//! Launched via `caresight web` (default: `http://127.0.0.1:3000`).

mod api;

use std::io::{Cursor, Read};

use anyhow::Result;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

use crate::analytics::Analytics;
use crate::config::CaresightConfig;
use crate::prediction::PredictionClient;
use crate::recommend::Recommender;
use crate::store::{FileStore, KeyValueStore, PatientStore};

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// Everything the handlers need, built once at startup.
pub struct WebApp<S = FileStore> {
    pub config: CaresightConfig,
    pub client: PredictionClient,
    /// `None` when recommendations are disabled.
    pub recommender: Option<Recommender>,
    pub store: PatientStore<S>,
    pub analytics: Analytics,
}

impl WebApp<FileStore> {
    pub fn from_config(config: CaresightConfig) -> Result<Self> {
        let analytics = Analytics::from_config(&config.logging);
        let data_dir = config
            .storage
            .resolved_data_dir()
            .ok_or_else(|| anyhow::anyhow!("cannot resolve data directory {}", config.storage.data_dir))?;

        Ok(Self {
            client: PredictionClient::from_config(&config),
            recommender: config
                .recommendations
                .enabled
                .then(|| Recommender::from_config(&config.recommendations)),
            store: PatientStore::open(data_dir).with_analytics(analytics.clone()),
            analytics,
            config,
        })
    }
}

// ---------------------------------------------------------------------------
// Server entry point
// ---------------------------------------------------------------------------

/// Bind `addr` and serve until the process is stopped.
pub fn serve(addr: &str, app: &WebApp) -> Result<()> {
    let server = Server::http(addr)
        .map_err(|e| anyhow::anyhow!("failed to start HTTP server on {addr}: {e}"))?;

    println!("caresight API running at http://{addr}");
    println!("Press Ctrl+C to stop.\n");

    run(&server, app);
    Ok(())
}

/// Handle requests from an already-bound server, sequentially.
///
/// Returns when the server is unblocked or its listener closes.
pub fn run<S: KeyValueStore>(server: &Server, app: &WebApp<S>) {
    for request in server.incoming_requests() {
        handle(request, app);
    }
}

fn handle<S: KeyValueStore>(mut request: Request, app: &WebApp<S>) {
    let method = request.method().clone();
    let url = request.url().to_string();

    // Read body up-front for methods that carry one
    let body = if matches!(method, Method::Put | Method::Post | Method::Patch) {
        let mut buf = String::new();
        let _ = request.as_reader().read_to_string(&mut buf);
        Some(buf)
    } else {
        None
    };

    let reply = match dispatch(app, &method, &url, body.as_deref()) {
        Ok(reply) => reply,
        Err(e) => ApiResponse::error(500, &e.to_string()),
    };
    let status = reply.status;
    let _ = request.respond(reply.into_response());

    // Brief access log
    println!("{} {} {} {}", method, url, status, chrono::Local::now().format("%H:%M:%S"));
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Route a request to its handler.
pub fn dispatch<S: KeyValueStore>(
    app: &WebApp<S>,
    method: &Method,
    url: &str,
    body: Option<&str>,
) -> Result<ApiResponse> {
    // Strip query string for path matching
    let path = url.split('?').next().unwrap_or(url);
    let body = body.unwrap_or("");

    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    let endpoints = app.client.endpoints();

    match (method, segments.as_slice()) {
        // Prediction proxies
        (&Method::Post, ["api", "maternal"]) => Ok(api::proxy(app, &endpoints.maternal_url, body)),
        (&Method::Post, ["api", "cardiovascular"]) => Ok(api::proxy(app, &endpoints.cardiovascular_url, body)),
        (&Method::Post, ["api", "glucose"]) => Ok(api::proxy(app, &endpoints.glucose_url, body)),
        (&Method::Post, ["api", "glucose", "cohort"]) => {
            let url = format!("{}/cohort", endpoints.glucose_url.trim_end_matches('/'));
            Ok(api::proxy(app, &url, body))
        }

        // Upload pipelines
        (&Method::Post, ["api", "upload", kind]) => api::upload(app, kind, body),

        // Patient store
        (&Method::Get, ["api", "patients"]) => api::list_patients(app),
        (&Method::Get, ["api", "patients", "stats"]) => api::patient_stats(app),
        (&Method::Get, ["api", "patients", id]) => api::get_patient(app, id),
        (&Method::Delete, ["api", "patients", id]) => api::delete_patient(app, id),
        (&Method::Delete, ["api", "patients", id, "reports", report_id]) => {
            api::delete_report(app, id, report_id)
        }

        // Analytics, config, health
        (&Method::Get, ["api", "uploads", "stats"]) => api::upload_stats(app, url),
        (&Method::Get, ["api", "config"]) => api::get_config(app),
        (&Method::Get, ["api", "health"]) => api::get_health(app),

        _ => Ok(ApiResponse::error(404, "not found")),
    }
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

/// A JSON reply before it is handed to `tiny_http`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn json<T: serde::Serialize>(status: u16, data: &T) -> Result<Self> {
        Ok(Self {
            status,
            body: serde_json::to_string(data)?,
        })
    }

    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: serde_json::json!({ "error": message }).to_string(),
        }
    }

    pub fn into_response(self) -> Response<Cursor<Vec<u8>>> {
        let resp = Response::from_data(self.body.into_bytes()).with_status_code(StatusCode(self.status));
        match content_type_json() {
            Some(header) => resp.with_header(header),
            None => resp,
        }
    }
}

fn content_type_json() -> Option<Header> {
    Header::from_bytes("Content-Type", "application/json; charset=utf-8").ok()
}
