//! Shared fixtures: a loopback upstream and sample service responses.
#![allow(dead_code)]

use std::io::Read;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use serde_json::{Value, json};
use tiny_http::{Response, Server};

use caresight::config::{EndpointsConfig, PredictionConfig};
use caresight::error::UploadError;
use caresight::payload::Demographics;
use caresight::prediction::PredictionClient;
use caresight::recommend::TextGenerator;
use caresight::recommend::ollama::ChatMessage;

pub type Handler = dyn Fn(&str, &str) -> (u16, String) + Send + Sync;

/// A `tiny_http` server on an ephemeral port standing in for the
/// prediction services.
pub struct Stub {
    pub base: String,
    server: Arc<Server>,
    handle: Option<JoinHandle<Vec<(String, String)>>>,
}

impl Stub {
    pub fn start(handler: Box<Handler>) -> Self {
        let server = Arc::new(Server::http("127.0.0.1:0").unwrap());
        let port = server.server_addr().to_ip().unwrap().port();
        let worker = Arc::clone(&server);

        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            for mut request in worker.incoming_requests() {
                let mut body = String::new();
                request.as_reader().read_to_string(&mut body).unwrap();
                let url = request.url().to_string();
                let (status, reply) = handler(&url, &body);
                seen.push((url, body));
                let _ = request.respond(Response::from_string(reply).with_status_code(status));
            }
            seen
        });

        Self {
            base: format!("http://127.0.0.1:{port}"),
            server,
            handle: Some(handle),
        }
    }

    /// Always answer `status` with `body`.
    pub fn fixed(status: u16, body: Value) -> Self {
        let text = body.to_string();
        Self::start(Box::new(move |_, _| (status, text.clone())))
    }

    pub fn endpoints(&self) -> EndpointsConfig {
        EndpointsConfig {
            maternal_url: format!("{}/api/maternal", self.base),
            cardiovascular_url: format!("{}/api/cardiovascular", self.base),
            glucose_url: format!("{}/api/glucose", self.base),
        }
    }

    pub fn client(&self) -> PredictionClient {
        PredictionClient::new(&PredictionConfig { timeout_ms: 5000 }, &self.endpoints())
    }

    /// Stop the server and return `(url, body)` of every request seen.
    pub fn finish(mut self) -> Vec<(String, String)> {
        self.server.unblock();
        self.handle.take().unwrap().join().unwrap()
    }
}

/// Text generator with a fixed reply.
pub struct CannedText {
    reply: Result<String, String>,
    prompts: Mutex<Vec<ChatMessage>>,
}

impl CannedText {
    pub fn ok(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Content of every user message sent so far.
    pub fn user_prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.role == "user")
            .map(|m| m.content.clone())
            .collect()
    }
}

impl TextGenerator for CannedText {
    fn chat(&self, messages: &[ChatMessage], _word_budget: usize) -> Result<String, UploadError> {
        self.prompts.lock().unwrap().extend_from_slice(messages);
        self.reply.clone().map_err(UploadError::Recommendation)
    }

    fn model_name(&self) -> &str {
        "canned"
    }
}

pub fn demographics(name: &str) -> Demographics {
    Demographics {
        name: name.to_string(),
        age: 47,
        gender: "female".to_string(),
        weight: Some(70.0),
        height: Some(165.0),
    }
}

pub fn maternal_reply(label: &str) -> String {
    json!({
        "prediction": label,
        "probabilities": { "low risk": 0.2, "mid risk": 0.3, "high risk": 0.5 },
        "shap_values": { "BS": 0.31, "SystolicBP": -0.12 }
    })
    .to_string()
}

pub fn cardiovascular_reply() -> Value {
    json!({
        "cohort_statistics": {
            "average_risk_score": 0.55,
            "high_risk_patients": 1,
            "high_risk_percentage": 50.0,
            "low_risk_patients": 1,
            "medium_risk_patients": 0,
            "total_patients": 2
        },
        "patient_predictions": [
            {
                "patient_id": "C1",
                "prediction": 1,
                "probabilities": { "0": 0.2, "1": 0.8 },
                "risk_level": "High",
                "risk_score": 0.8,
                "shap_values": { "cholesterol": 0.4, "age": 0.1 }
            },
            {
                "patient_id": "C2",
                "prediction": 0,
                "probabilities": { "0": 0.7, "1": 0.3 },
                "risk_level": "Low",
                "risk_score": 0.3,
                "shap_values": { "cholesterol": -0.2, "age": 0.05 }
            }
        ]
    })
}

/// A single-patient glucose response with every section filled in.
pub fn glucose_reply(patient_id: &str) -> Value {
    json!({
        "patient_id": patient_id,
        "pipeline_timestamp": "2025-03-01T10:00:00Z",
        "glucose_predictions": {
            "horizons_days": [1, 2, 3],
            "p10_quantile": [95.0, 97.0, 99.0],
            "p50_quantile": [120.0, 124.0, 128.0],
            "p90_quantile": [150.0, 156.0, 162.0]
        },
        "risk_assessment": {
            "overall_risk_score": 0.42,
            "overall_risk_level": "moderate",
            "context_multiplier": 1.1,
            "recommendations": ["Check glucose before meals"],
            "context_factors": {
                "sleep_quality": { "impact": "negative", "multiplier": 1.1, "value": "poor" }
            },
            "horizon_risks": {
                "horizon_7d": { "risk_score": 0.3, "risk_level": "low" },
                "horizon_90d": {
                    "hyper_risk": 0.5,
                    "hypo_risk": 0.1,
                    "trend_high_risk": 0.2,
                    "trend_low_risk": 0.05,
                    "volatility_risk": 0.35,
                    "risk_score": 0.45,
                    "risk_level": "moderate"
                }
            },
            "detailed_explanations": {
                "base_risk_components": {
                    "hyper_risk": [[0.4, 0.6]],
                    "hypo_risk": [[0.1]]
                }
            }
        },
        "model_info": { "model_type": "quantile-gbm", "prediction_horizon": "90d" },
        "prediction_metadata": { "rows": 3 }
    })
}

pub const MATERNAL_CSV: &str = "Age,SystolicBP,DiastolicBP,BS,BodyTemp,HeartRate\n30,120,80,9.0,98.6,75";

pub const GLUCOSE_CSV: &str = "timestamp,glucose,insulin_adherence,sleep_quality\n\
2025-03-01T07:00,118,0.9,0.6\n\
2025-03-01T12:00,141,0.9,0.6\n\
2025-03-01T19:00,133,0.9,0.6";
