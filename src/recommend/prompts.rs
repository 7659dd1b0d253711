//! Prompt templates for the three recommendation domains.
//!
//! Each prompt is split into:
//!
//! - a **system message**: role, required sections and writing rules
//! - a **user message**: the summary as pretty JSON
//!
//! Keeping the patient data in the user role keeps small models from mixing
//! the instructions up with the data.

use serde::Serialize;

use super::summary::{CardiovascularSummary, DiabetesSummary, MaternalSummary};
use crate::domain::Domain;
use crate::error::UploadError;

/// Target length of a recommendation, in words.
pub fn word_budget(domain: Domain) -> usize {
    match domain {
        Domain::Maternal => 180,
        Domain::Cardiovascular => 350,
        Domain::Diabetes => 550,
    }
}

/// A ready-to-send `(system, user)` pair plus the word budget it asks for.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub domain: Domain,
    pub system: String,
    pub user: String,
    pub word_budget: usize,
}

pub fn maternal_prompt(summary: &MaternalSummary) -> Result<Prompt, UploadError> {
    let system = "\
You are a clinical decision support assistant. Given maternal vital parameters, \
a model's risk classification, probabilities, and SHAP explanations, write concise, \
patient-friendly and clinician-actionable recommendations.\n\n\
Include:\n\
- 3-5 personalized recommendations\n\
- Monitoring suggestions tied to the top SHAP factors\n\
- When to escalate or seek immediate care if relevant\n\n\
Keep to under 180 words. Use bullet points. Do not repeat the input data. \
Use US units and general safety guidance only.";

    build(Domain::Maternal, system, "Maternal risk summary", summary)
}

pub fn cardiovascular_prompt(summary: &CardiovascularSummary) -> Result<Prompt, UploadError> {
    let system = "\
You are a cardiology decision support assistant reviewing a cohort of patients. \
Given cohort risk statistics, the highest-risk patients, and the features that \
drive risk across the cohort, write a markdown briefing for the care team.\n\n\
Include:\n\
- A two-sentence overview of the cohort's risk using the real percentages\n\
- 3-5 cohort-level interventions tied to the top risk features\n\
- Follow-up priorities for the highest-risk patients, by patient id\n\
- Monitoring cadence and when to escalate care\n\n\
Aim for 250-350 words. Use short headings and bullet points. \
Give general clinical guidance only; do not prescribe specific drug doses.";

    build(Domain::Cardiovascular, system, "Cardiovascular cohort summary", summary)
}

pub fn diabetes_prompt(summary: &DiabetesSummary) -> Result<Prompt, UploadError> {
    let system = "\
You are a diabetes care specialist. Create a friendly, plain-language report in \
**markdown** that an average person can easily understand. Avoid technical jargon; \
explain terms simply.\n\n\
Provide:\n\
- A warm greeting and a short, clear summary of the person's current diabetes risk \
using the actual numbers (a few helpful emojis are welcome).\n\
- 3-5 personalized insights explaining what drives the risk (average glucose, highs \
and lows, volatility).\n\
- 5-7 day-to-day actions the person can start today (sleep, meals, activity, \
hydration, medication adherence, stress, routine) as a checklist.\n\
- A lifestyle section that always covers smoking and alcohol, with practical \
guidance and specific weekly alcohol limits, even when lifestyle data is unknown.\n\
- A brief note for the clinician with 2-3 intervention ideas, clearly labeled.\n\
- Clear guidance on when to seek medical help, with concrete examples.\n\n\
If a BMI is given and it is high or low, explain what that means and how it \
relates to glucose.\n\n\
Writing rules:\n\
- Friendly, encouraging language; everyday words over medical terms.\n\
- Reference the real numbers but explain them simply.\n\
- Short sections with headings, bold highlights and lists.\n\
- Aim for 400-550 words.";

    build(Domain::Diabetes, system, "Patient summary", summary)
}

fn build<S: Serialize>(domain: Domain, system: &str, label: &str, summary: &S) -> Result<Prompt, UploadError> {
    let data = serde_json::to_string_pretty(summary)
        .map_err(|e| UploadError::Recommendation(format!("failed to encode summary: {e}")))?;
    Ok(Prompt {
        domain,
        system: system.to_string(),
        user: format!("{label}:\n{data}"),
        word_budget: word_budget(domain),
    })
}
