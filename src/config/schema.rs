/// Configuration schema and defaults for caresight.
///
/// Defines the TOML-serializable configuration structure with all sections:
/// `[endpoints]`, `[prediction]`, `[recommendations]`, `[storage]`,
/// `[logging]`, and `[web]`.
///
/// Every field has a built-in default. Users only need to set the values they
/// want to override.
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level caresight configuration.
///
/// Maps directly to the `~/.caresight/config.toml` and `.caresight.toml`
/// file schemas. All sections and fields are optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaresightConfig {
    pub endpoints: EndpointsConfig,
    pub prediction: PredictionConfig,
    pub recommendations: RecommendationsConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub web: WebConfig,
}

// ---------------------------------------------------------------------------
// [endpoints]
// ---------------------------------------------------------------------------

/// Upstream prediction service URLs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub maternal_url: String,
    pub cardiovascular_url: String,
    /// Single-patient glucose endpoint. Cohorts go to `{glucose_url}/cohort`.
    pub glucose_url: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            maternal_url: "https://health-models.onrender.com/api/maternal".to_string(),
            cardiovascular_url: "http://127.0.0.1:10000/api/cardiovascular".to_string(),
            glucose_url: "http://127.0.0.1:8000/api/glucose".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// [prediction]
// ---------------------------------------------------------------------------

/// Prediction client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Request timeout in milliseconds. `0` waits indefinitely.
    pub timeout_ms: u64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self { timeout_ms: 60_000 }
    }
}

// ---------------------------------------------------------------------------
// [recommendations]
// ---------------------------------------------------------------------------

/// Narrative recommendation settings (Ollama chat endpoint).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationsConfig {
    /// Whether uploads request a narrative after the prediction.
    pub enabled: bool,
    pub model: String,
    pub ollama_url: String,
    /// Sampling temperature.
    pub temperature: f64,
    pub timeout_ms: u64,
    /// Horizon the diabetes narrative focuses on (`7d` .. `90d`).
    pub default_horizon: String,
}

impl Default for RecommendationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "llama3.2:3b".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            temperature: 0.3,
            timeout_ms: 60_000,
            default_horizon: "90d".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// [storage]
// ---------------------------------------------------------------------------

/// Local patient store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the store documents. `~` is expanded.
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.caresight/data".to_string(),
        }
    }
}

impl StorageConfig {
    /// `data_dir` with a leading `~` replaced by the home directory.
    pub fn resolved_data_dir(&self) -> Option<PathBuf> {
        expand_home(&self.data_dir)
    }
}

// ---------------------------------------------------------------------------
// [logging]
// ---------------------------------------------------------------------------

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Whether the upload log and event log are written.
    pub enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// ---------------------------------------------------------------------------
// [web]
// ---------------------------------------------------------------------------

/// Embedded API server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub addr: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:3000".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn expand_home(path: &str) -> Option<PathBuf> {
    if path == "~" {
        return dirs::home_dir();
    }
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map(|home| home.join(rest)),
        None => Some(PathBuf::from(path)),
    }
}

impl CaresightConfig {
    /// Annotated default config written by `caresight config init`.
    pub fn default_toml() -> String {
        r#"# caresight configuration
#
# Configuration hierarchy (highest precedence wins):
#   1. Environment variables (CARESIGHT_*)
#   2. Project config (.caresight.toml in current directory)
#   3. User global config (~/.caresight/config.toml)
#   4. Built-in defaults

[endpoints]
maternal_url = "https://health-models.onrender.com/api/maternal"
cardiovascular_url = "http://127.0.0.1:10000/api/cardiovascular"
glucose_url = "http://127.0.0.1:8000/api/glucose"   # cohorts go to <glucose_url>/cohort

[prediction]
timeout_ms = 60000                    # 0 = wait indefinitely

[recommendations]
enabled = true
model = "llama3.2:3b"
ollama_url = "http://localhost:11434"
temperature = 0.3
timeout_ms = 60000
default_horizon = "90d"               # 7d | 14d | 30d | 60d | 90d

[storage]
data_dir = "~/.caresight/data"

[logging]
enabled = true                        # upload-log.jsonl and events.jsonl

[web]
addr = "127.0.0.1:3000"
"#
        .to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
