//! Compact summaries sent to the text generator.
//!
//! Probabilities and risks are rounded to whole percentage strings (`"42%"`)
//! here, before any prompt is built. SHAP values keep two decimals.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::analysis::{CardiovascularPrediction, DiabetesAnalysis, MaternalPrediction, as_number, as_text, mean};
use crate::payload::maternal::MaternalRecord;
use crate::payload::{self, Demographics, number_value};

/// Number of SHAP factors included in a summary.
const TOP_FACTORS: usize = 5;

/// Fraction → whole percentage string: `0.423` → `"42%"`.
pub fn percent(fraction: f64) -> String {
    format!("{}%", (fraction * 100.0).round() as i64)
}

/// Already a percentage → whole percentage string: `42.7` → `"43%"`.
fn whole_percent(value: f64) -> String {
    format!("{}%", value.round() as i64)
}

fn two_decimals(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Maternal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaternalSummary {
    pub vitals: Map<String, Value>,
    pub predicted_class: String,
    /// Risk class → percentage string.
    pub probabilities: Map<String, Value>,
    /// Largest SHAP contributions first.
    pub top_factors: Map<String, Value>,
}

impl MaternalSummary {
    pub fn new(record: &MaternalRecord, prediction: &MaternalPrediction) -> Self {
        let vitals = record
            .fields()
            .into_iter()
            .map(|(k, v)| (k.to_string(), number_value(v)))
            .collect();
        let probabilities = prediction
            .probabilities
            .entries()
            .into_iter()
            .map(|(label, p)| (label.to_string(), Value::String(percent(p))))
            .collect();
        let top_factors = prediction
            .shap_factors()
            .into_iter()
            .take(TOP_FACTORS)
            .map(|f| (f.feature, number_value(two_decimals(f.value))))
            .collect();

        Self {
            vitals,
            predicted_class: prediction.prediction.clone(),
            probabilities,
            top_factors,
        }
    }
}

// ---------------------------------------------------------------------------
// Cardiovascular
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighRiskPatient {
    pub patient_id: String,
    pub risk_level: String,
    pub risk_score: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardiovascularSummary {
    pub total_patients: usize,
    pub average_risk: String,
    pub high_risk_share: String,
    /// Risk level → patient count.
    pub risk_distribution: Map<String, Value>,
    /// Mean |SHAP| per feature across the cohort.
    pub top_features: Map<String, Value>,
    pub highest_risk_patients: Vec<HighRiskPatient>,
}

impl CardiovascularSummary {
    pub fn new(prediction: &CardiovascularPrediction) -> Self {
        let stats = &prediction.cohort_statistics;
        let total_patients = if stats.total_patients > 0 {
            stats.total_patients as usize
        } else {
            prediction.patient_predictions.len()
        };

        Self {
            total_patients,
            average_risk: percent(stats.average_risk_score),
            high_risk_share: whole_percent(stats.high_risk_percentage),
            risk_distribution: prediction
                .risk_distribution()
                .into_iter()
                .map(|(level, n)| (level, Value::from(n)))
                .collect(),
            top_features: prediction
                .feature_importance()
                .into_iter()
                .take(TOP_FACTORS)
                .map(|(feature, v)| (feature, number_value(two_decimals(v))))
                .collect(),
            highest_risk_patients: prediction
                .top_risk_patients(3)
                .into_iter()
                .map(|p| HighRiskPatient {
                    patient_id: p.patient_id.clone(),
                    risk_level: p.risk_level.clone(),
                    risk_score: percent(p.risk_score),
                })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Diabetes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryDemographics {
    pub name: String,
    pub age: Value,
    pub gender: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height_cm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifestyleDefaults {
    pub smoking_status: &'static str,
    pub alcohol_use: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiabetesSummary {
    pub demographics: SummaryDemographics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bmi: Option<f64>,
    pub selected_horizon: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_glucose: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volatility: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hyper_risk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hypo_risk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_risk_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_risk_score: Option<String>,
    /// `"missed insulin: 2 (increases risk), ..."`
    pub context_factors: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_trends: Option<String>,
    pub lifestyle_defaults: LifestyleDefaults,
}

impl DiabetesSummary {
    /// Summarize `analysis` for one horizon (`"90d"` when `None`).
    ///
    /// Entered `patient` details win over whatever the service echoed in
    /// `prediction_metadata`. Component risks come from that horizon and
    /// fall back to the mean of the first row of the matching base risk
    /// matrix.
    pub fn new(
        analysis: &DiabetesAnalysis,
        patient: Option<&Demographics>,
        horizon: Option<&str>,
        recent_trends: Option<&str>,
    ) -> Self {
        let selected_horizon = horizon
            .filter(|h| !h.trim().is_empty())
            .unwrap_or("90d")
            .to_string();

        let meta = analysis.prediction_metadata();
        let meta_text = |key: &str| meta.and_then(|m| m.get(key)).and_then(as_text).filter(|s| !s.is_empty());
        let meta_number = |key: &str| meta.and_then(|m| m.get(key)).and_then(as_number);

        let entered = |pick: fn(&Demographics) -> Option<f64>| patient.and_then(pick).filter(|v| *v > 0.0);

        let demographics = SummaryDemographics {
            name: patient
                .map(|p| p.name.trim().to_string())
                .filter(|n| !n.is_empty())
                .or_else(|| meta_text("name"))
                .unwrap_or_else(|| "Patient".to_string()),
            age: entered(|p| Some(f64::from(p.age)))
                .or_else(|| meta_number("age").filter(|a| *a > 0.0))
                .map(number_value)
                .unwrap_or_else(|| Value::String("N/A".to_string())),
            gender: patient
                .map(|p| p.gender.trim().to_string())
                .filter(|g| !g.is_empty())
                .or_else(|| meta_text("gender"))
                .unwrap_or_else(|| "N/A".to_string()),
            height_cm: entered(|p| p.height).or_else(|| meta_number("height").filter(|h| *h > 0.0)),
            weight_kg: entered(|p| p.weight).or_else(|| meta_number("weight").filter(|w| *w > 0.0)),
        };
        let bmi = demographics.weight_kg.zip(demographics.height_cm).and_then(|(w, h)| payload::bmi(w, h));

        let horizon_risk = analysis.horizon_risk(&selected_horizon).unwrap_or_default();
        let base = analysis.base_risk_components();
        let component = |name: &str| -> Option<String> {
            let from_horizon = horizon_risk.components.get(name).copied().flatten();
            let from_base = || base.get(name).and_then(|rows| rows.first()).and_then(|row| mean(row));
            from_horizon.or_else(from_base).map(percent)
        };

        let context_factors = analysis
            .context_factors()
            .into_iter()
            .map(|(name, factor)| {
                let value = match &factor.value {
                    Value::String(s) => s.clone(),
                    Value::Null => "n/a".to_string(),
                    other => other.to_string(),
                };
                let impact = factor.impact.unwrap_or_else(|| "unknown".to_string()).replace('_', " ");
                format!("{}: {value} ({impact})", name.replace('_', " "))
            })
            .collect::<Vec<_>>()
            .join(", ");

        Self {
            demographics,
            bmi,
            selected_horizon,
            avg_glucose: analysis.average_glucose().map(|g| g.round() as i64),
            volatility: component("volatility_risk"),
            hyper_risk: component("hyper_risk"),
            hypo_risk: component("hypo_risk"),
            overall_risk_level: analysis.overall_risk_level(),
            overall_risk_score: analysis.overall_risk_score().map(percent),
            context_factors,
            recent_trends: recent_trends.map(str::to_string),
            lifestyle_defaults: LifestyleDefaults {
                smoking_status: "unknown",
                alcohol_use: "unknown",
            },
        }
    }
}
