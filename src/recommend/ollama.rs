/// Ollama HTTP client used to generate narrative recommendations.
///
/// Talks to an Ollama-compatible server with the synchronous `ureq` client:
///
/// - **Health check**: `GET /api/tags`, reachable with at least one model.
/// - **Chat**: `POST /api/chat` with a system and a user message.
///
/// The `/api/chat` endpoint applies the model's own chat template, so the
/// prompts here never carry template tokens.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::TextGenerator;
use crate::config::RecommendationsConfig;
use crate::error::UploadError;

// ---------------------------------------------------------------------------
// Request / response types for the Ollama API
// ---------------------------------------------------------------------------

/// One chat turn sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// `POST /api/chat` body.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f64,
    num_predict: u32,
    num_ctx: u32,
}

/// Non-streaming `/api/chat` reply; only the text is kept.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Response body from `GET /api/tags`.
#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    #[allow(dead_code)]
    name: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Local Ollama server used to write recommendation narratives.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    temperature: f64,
    timeout: Duration,
}

impl OllamaClient {
    pub fn from_config(config: &RecommendationsConfig) -> Self {
        Self {
            base_url: config.ollama_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// Whether Ollama answers and has at least one model pulled.
    ///
    /// Uses a short 5 s timeout so `caresight health` never stalls.
    pub fn is_healthy(&self) -> bool {
        let url = local_ipv4(&format!("{}/api/tags", self.base_url));
        match ureq::get(&url).timeout(Duration::from_secs(5)).call() {
            Ok(resp) => resp
                .into_json::<TagsResponse>()
                .map(|tags| !tags.models.is_empty())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl TextGenerator for OllamaClient {
    /// Send chat messages and return the assistant's reply (`stream: false`).
    fn chat(&self, messages: &[ChatMessage], word_budget: usize) -> Result<String, UploadError> {
        let url = local_ipv4(&format!("{}/api/chat", self.base_url));

        let body = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
                num_predict: token_budget(word_budget),
                num_ctx: CONTEXT_WINDOW,
            },
        };

        let resp = ureq::post(&url)
            .timeout(self.timeout)
            .send_json(&body)
            .map_err(|e| UploadError::Recommendation(format!("Ollama chat request failed: {e}")))?;

        let parsed: ChatResponse = resp.into_json().map_err(|e| {
            UploadError::Recommendation(format!("failed to parse Ollama chat response: {e}"))
        })?;

        if parsed.message.content.trim().is_empty() {
            return Err(UploadError::Recommendation(
                "Ollama returned an empty response".to_string(),
            ));
        }

        Ok(parsed.message.content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// "localhost" may resolve to `::1` first while Ollama binds IPv4 only.
fn local_ipv4(url: &str) -> String {
    url.replace("://localhost", "://127.0.0.1")
}

/// Context window for Ollama requests. Prompts here are a few hundred
/// tokens; the rest is room for the reply.
const CONTEXT_WINDOW: u32 = 8_192;

/// Token cap for a reply of `word_budget` words: about 1.5 tokens per word,
/// doubled for markdown, clamped to [512, 4096].
fn token_budget(word_budget: usize) -> u32 {
    let tokens = (word_budget * 3) as u32;
    tokens.clamp(512, 4096)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_budget_scales_with_words() {
        assert_eq!(token_budget(100), 512);
        assert_eq!(token_budget(550), 1650);
        assert_eq!(token_budget(5000), 4096);
    }

    #[test]
    fn client_from_default_config() {
        let client = OllamaClient::from_config(&RecommendationsConfig::default());
        assert_eq!(client.base_url, "http://localhost:11434");
        assert_eq!(client.model_name(), "llama3.2:3b");
        assert_eq!(client.timeout, Duration::from_millis(60_000));
    }

    #[test]
    fn client_strips_trailing_slash() {
        let config = RecommendationsConfig {
            ollama_url: "http://localhost:11434/".to_string(),
            ..RecommendationsConfig::default()
        };
        assert_eq!(OllamaClient::from_config(&config).base_url(), "http://localhost:11434");
    }

    #[test]
    fn localhost_is_rewritten_to_ipv4() {
        assert_eq!(local_ipv4("http://localhost:11434/api/chat"), "http://127.0.0.1:11434/api/chat");
        assert_eq!(local_ipv4("http://ollama:11434"), "http://ollama:11434");
    }
}
