/// Narrative recommendations from a local text-generation model.
///
/// Every upload can end with a markdown narrative: the prediction is reduced
/// to a compact summary ([`summary`]), wrapped in a domain prompt
/// ([`prompts`]), sent to the generator, and checked ([`validation`]) before
/// it is accepted.
///
/// # Feature Flag
///
/// Enabled by default. Turn off with `[recommendations] enabled = false` or
/// `CARESIGHT_RECOMMENDATIONS=0`.
///
/// Failures here are never fatal to an upload: the pipeline logs them and
/// returns the prediction without a narrative.
use std::time::Instant;

pub mod ollama;
pub mod prompts;
pub mod summary;
pub mod validation;

use crate::analysis::{CardiovascularPrediction, DiabetesAnalysis, MaternalPrediction};
use crate::config::RecommendationsConfig;
use crate::domain::Domain;
use crate::error::UploadError;
use crate::payload::Demographics;
use crate::payload::maternal::MaternalRecord;
use ollama::{ChatMessage, OllamaClient};
use prompts::Prompt;
use summary::{CardiovascularSummary, DiabetesSummary, MaternalSummary};
use validation::{strip_preamble, validate_output, word_count};

/// Anything that can answer a chat request with text.
pub trait TextGenerator {
    fn chat(&self, messages: &[ChatMessage], word_budget: usize) -> Result<String, UploadError>;

    fn model_name(&self) -> &str;
}

/// An accepted recommendation.
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    /// Markdown text, preamble removed.
    pub text: String,
    pub domain: Domain,
    pub model: String,
    pub word_count: usize,
    pub latency_ms: u64,
}

/// Builds prompts and runs them through a [`TextGenerator`].
pub struct Recommender<G = OllamaClient> {
    generator: G,
    default_horizon: String,
}

impl Recommender<OllamaClient> {
    pub fn from_config(config: &RecommendationsConfig) -> Self {
        Self::new(OllamaClient::from_config(config), &config.default_horizon)
    }
}

impl<G: TextGenerator> Recommender<G> {
    pub fn new(generator: G, default_horizon: &str) -> Self {
        Self {
            generator,
            default_horizon: default_horizon.to_string(),
        }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn maternal(
        &self,
        record: &MaternalRecord,
        prediction: &MaternalPrediction,
    ) -> Result<Recommendation, UploadError> {
        let prompt = prompts::maternal_prompt(&MaternalSummary::new(record, prediction))?;
        self.generate(prompt)
    }

    pub fn cardiovascular(&self, prediction: &CardiovascularPrediction) -> Result<Recommendation, UploadError> {
        let prompt = prompts::cardiovascular_prompt(&CardiovascularSummary::new(prediction))?;
        self.generate(prompt)
    }

    /// Diabetes narrative for `horizon`, or the configured default horizon.
    pub fn diabetes(
        &self,
        analysis: &DiabetesAnalysis,
        patient: Option<&Demographics>,
        horizon: Option<&str>,
        recent_trends: Option<&str>,
    ) -> Result<Recommendation, UploadError> {
        let horizon = horizon.unwrap_or(&self.default_horizon);
        let summary = DiabetesSummary::new(analysis, patient, Some(horizon), recent_trends);
        self.generate(prompts::diabetes_prompt(&summary)?)
    }

    /// Send a prompt and validate the reply.
    pub fn generate(&self, prompt: Prompt) -> Result<Recommendation, UploadError> {
        let messages = vec![ChatMessage::system(prompt.system), ChatMessage::user(prompt.user)];

        let start = Instant::now();
        let raw = self.generator.chat(&messages, prompt.word_budget)?;
        let latency_ms = start.elapsed().as_millis() as u64;

        let text = strip_preamble(&raw);
        validate_output(&text, prompt.word_budget)?;

        Ok(Recommendation {
            word_count: word_count(&text),
            text,
            domain: prompt.domain,
            model: self.generator.model_name().to_string(),
            latency_ms,
        })
    }
}
