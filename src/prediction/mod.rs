/// HTTP client for the upstream prediction services.
///
/// Talks to three JSON endpoints (maternal, cardiovascular, glucose) with the
/// synchronous `ureq` client. One POST per upload, no retries. Failures map
/// onto [`UploadError`]:
///
/// - transport failure (DNS, refused, timeout) → `Network`
/// - non-2xx status → `Api { status, body }` with the raw response text
/// - 2xx with an undecodable body → `Api` with the raw text
///
/// The maternal series upload is the one concurrent path: a small pool of
/// scoped threads sends one request per record, collected back in input
/// order.
use std::thread;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::analysis::{CardiovascularPrediction, DiabetesAnalysis, MaternalPrediction};
use crate::config::{CaresightConfig, EndpointsConfig, PredictionConfig};
use crate::error::UploadError;
use crate::payload::CohortPayload;
use crate::payload::cardiovascular::CardiovascularPayload;
use crate::payload::maternal::MaternalRecord;

/// Upper bound on concurrent requests for one maternal series.
pub const SERIES_WORKERS: usize = 8;

/// Raw upstream reply, used by the proxy routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// Synchronous client for the prediction endpoints.
#[derive(Debug, Clone)]
pub struct PredictionClient {
    agent: ureq::Agent,
    endpoints: EndpointsConfig,
}

impl PredictionClient {
    /// Build a client. A `timeout_ms` of `0` leaves requests unbounded.
    pub fn new(config: &PredictionConfig, endpoints: &EndpointsConfig) -> Self {
        let mut builder = ureq::AgentBuilder::new();
        if config.timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(config.timeout_ms));
        }
        Self {
            agent: builder.build(),
            endpoints: endpoints.clone(),
        }
    }

    pub fn from_config(config: &CaresightConfig) -> Self {
        Self::new(&config.prediction, &config.endpoints)
    }

    pub fn endpoints(&self) -> &EndpointsConfig {
        &self.endpoints
    }

    /// POST a JSON string and hand back whatever came back, any status.
    ///
    /// Only transport failures are errors here.
    pub fn post_raw(&self, url: &str, body: &str) -> Result<RawResponse, UploadError> {
        let result = self
            .agent
            .post(url)
            .set("Content-Type", "application/json")
            .set("Accept", "application/json")
            .send_string(body);

        let response = match result {
            Ok(resp) => resp,
            Err(ureq::Error::Status(_, resp)) => resp,
            Err(ureq::Error::Transport(t)) => return Err(UploadError::Network(t.to_string())),
        };

        let status = response.status();
        let body = response
            .into_string()
            .map_err(|e| UploadError::Network(format!("failed to read response body: {e}")))?;
        Ok(RawResponse { status, body })
    }

    /// POST `body` as JSON and decode the JSON reply.
    pub fn post_json<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<Value, UploadError> {
        let encoded = serde_json::to_string(body)
            .map_err(|e| UploadError::input(format!("failed to encode request body: {e}")))?;

        let RawResponse { status, body } = self.post_raw(url, &encoded)?;
        if !(200..300).contains(&status) {
            return Err(UploadError::Api { status, body });
        }
        serde_json::from_str(&body).map_err(|_| UploadError::Api { status, body })
    }

    pub fn predict_maternal(&self, record: &MaternalRecord) -> Result<MaternalPrediction, UploadError> {
        let value = self.post_json(&self.endpoints.maternal_url, record)?;
        decode(value)
    }

    /// One request per record, spread over at most [`SERIES_WORKERS`]
    /// threads that each take a contiguous chunk.
    ///
    /// Every record is sent. Results come back in input order; if any
    /// request fails, the first failure by input position is returned and
    /// the batch is discarded.
    pub fn predict_maternal_series(
        &self,
        records: &[MaternalRecord],
    ) -> Result<Vec<MaternalPrediction>, UploadError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let chunk_size = records.len().div_ceil(SERIES_WORKERS);

        thread::scope(|scope| -> Result<Vec<MaternalPrediction>, UploadError> {
            let mut workers = Vec::with_capacity(SERIES_WORKERS);
            for (n, chunk) in records.chunks(chunk_size).enumerate() {
                let worker = thread::Builder::new()
                    .name(format!("maternal-series-{n}"))
                    .spawn_scoped(scope, move || {
                        chunk.iter().map(|record| self.predict_maternal(record)).collect::<Vec<_>>()
                    })
                    .map_err(|e| UploadError::Network(format!("failed to start prediction worker: {e}")))?;
                workers.push(worker);
            }

            let mut results = Vec::with_capacity(records.len());
            for worker in workers {
                let batch = worker
                    .join()
                    .unwrap_or_else(|_| vec![Err(UploadError::Network("prediction worker panicked".to_string()))]);
                results.extend(batch);
            }
            results.into_iter().collect()
        })
    }

    pub fn predict_cardiovascular(
        &self,
        payload: &CardiovascularPayload,
    ) -> Result<CardiovascularPrediction, UploadError> {
        let value = self.post_json(&self.endpoints.cardiovascular_url, payload)?;
        decode(value)
    }

    /// Send a glucose payload to the single or cohort endpoint.
    pub fn predict_glucose(&self, payload: &CohortPayload) -> Result<DiabetesAnalysis, UploadError> {
        let (url, body) = glucose_request(payload, &self.endpoints.glucose_url)?;
        let value = self.post_json(&url, &body)?;
        Ok(DiabetesAnalysis::from_api(value))
    }
}

/// Pick the glucose endpoint and body for a payload.
///
/// More than one patient goes to `{base}/cohort` with the whole payload;
/// otherwise the single patient object is posted to `base` (or the whole
/// payload when it is empty).
pub fn glucose_request(payload: &CohortPayload, base_url: &str) -> Result<(String, Value), UploadError> {
    let encode = |v: Result<Value, serde_json::Error>| {
        v.map_err(|e| UploadError::input(format!("failed to encode request body: {e}")))
    };
    let base = base_url.trim_end_matches('/');

    if payload.is_cohort() {
        return Ok((format!("{base}/cohort"), encode(serde_json::to_value(payload))?));
    }
    match payload.patients.first() {
        Some(patient) => Ok((base.to_string(), encode(serde_json::to_value(patient))?)),
        None => Ok((base.to_string(), encode(serde_json::to_value(payload))?)),
    }
}

/// Decode a 2xx body into a typed response; shape mismatches are API errors.
fn decode<T: DeserializeOwned>(value: Value) -> Result<T, UploadError> {
    let text = value.to_string();
    serde_json::from_value(value).map_err(|e| UploadError::Api {
        status: 200,
        body: format!("unexpected response shape ({e}): {text}"),
    })
}
