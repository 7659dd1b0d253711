//! Typed maternal and cardiovascular responses, and the per-domain union.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::{DiabetesAnalysis, ModelInfo};

/// Risk-class probabilities returned by the maternal model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaternalProbabilities {
    #[serde(rename = "low risk")]
    pub low: f64,
    #[serde(rename = "mid risk")]
    pub mid: f64,
    #[serde(rename = "high risk")]
    pub high: f64,
}

impl MaternalProbabilities {
    /// `(label, probability)` pairs in display order.
    pub fn entries(&self) -> [(&'static str, f64); 3] {
        [("low risk", self.low), ("mid risk", self.mid), ("high risk", self.high)]
    }
}

/// Response of the maternal endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaternalPrediction {
    /// Predicted class, e.g. `"high risk"`.
    pub prediction: String,
    pub probabilities: MaternalProbabilities,
    pub shap_values: BTreeMap<String, f64>,
}

/// One feature's contribution to a prediction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShapFactor {
    pub feature: String,
    pub value: f64,
    pub abs_value: f64,
    pub impact: &'static str,
}

/// Step of the cumulative SHAP waterfall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub feature: String,
    pub start: f64,
    pub end: f64,
    pub value: f64,
}

impl MaternalPrediction {
    /// SHAP contributions sorted by magnitude, largest first.
    pub fn shap_factors(&self) -> Vec<ShapFactor> {
        shap_factors(&self.shap_values)
    }

    /// Running total of the contributions in [`Self::shap_factors`] order.
    pub fn waterfall(&self) -> Vec<SeriesPoint> {
        let mut running = 0.0;
        self.shap_factors()
            .into_iter()
            .map(|factor| {
                let start = running;
                running += factor.value;
                SeriesPoint {
                    feature: factor.feature,
                    start,
                    end: running,
                    value: factor.value,
                }
            })
            .collect()
    }
}

pub(crate) fn shap_factors(values: &BTreeMap<String, f64>) -> Vec<ShapFactor> {
    let mut factors: Vec<ShapFactor> = values
        .iter()
        .map(|(feature, &value)| ShapFactor {
            feature: feature.clone(),
            value,
            abs_value: value.abs(),
            impact: if value > 0.0 {
                "Increases Risk"
            } else {
                "Decreases Risk"
            },
        })
        .collect();
    factors.sort_by(|a, b| b.abs_value.total_cmp(&a.abs_value));
    factors
}

// ---------------------------------------------------------------------------
// Cardiovascular
// ---------------------------------------------------------------------------

/// Aggregates over the uploaded cohort.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CohortStatistics {
    pub average_risk_score: f64,
    pub high_risk_patients: u32,
    pub high_risk_percentage: f64,
    pub low_risk_patients: u32,
    pub medium_risk_patients: u32,
    pub total_patients: u32,
}

/// Model description as sent by the cardiovascular service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardioModelInfo {
    pub model_type: Option<String>,
    pub features_used: Option<f64>,
    pub prediction_horizon: Option<String>,
}

/// Prediction for one patient of the cohort.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientPrediction {
    #[serde(deserialize_with = "string_or_number")]
    pub patient_id: String,
    /// Binary class: `1` at risk, `0` not.
    pub prediction: i64,
    /// Class probabilities keyed `"0"` and `"1"`.
    pub probabilities: BTreeMap<String, f64>,
    pub risk_level: String,
    pub risk_score: f64,
    pub shap_values: BTreeMap<String, f64>,
    pub model_info: Option<CardioModelInfo>,
}

impl PatientPrediction {
    pub fn shap_factors(&self) -> Vec<ShapFactor> {
        shap_factors(&self.shap_values)
    }
}

/// Response of the cardiovascular endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardiovascularPrediction {
    pub cohort_statistics: CohortStatistics,
    pub patient_predictions: Vec<PatientPrediction>,
}

impl CardiovascularPrediction {
    /// Patient counts per risk level, in first-seen order.
    pub fn risk_distribution(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for p in &self.patient_predictions {
            match counts.iter_mut().find(|(level, _)| *level == p.risk_level) {
                Some((_, n)) => *n += 1,
                None => counts.push((p.risk_level.clone(), 1)),
            }
        }
        counts
    }

    /// The `n` patients with the highest risk score.
    pub fn top_risk_patients(&self, n: usize) -> Vec<&PatientPrediction> {
        let mut sorted: Vec<&PatientPrediction> = self.patient_predictions.iter().collect();
        sorted.sort_by(|a, b| b.risk_score.total_cmp(&a.risk_score));
        sorted.truncate(n);
        sorted
    }

    /// Mean absolute SHAP value per feature across the cohort, largest first.
    pub fn feature_importance(&self) -> Vec<(String, f64)> {
        let mut totals: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
        for p in &self.patient_predictions {
            for (feature, value) in &p.shap_values {
                let entry = totals.entry(feature.as_str()).or_default();
                entry.0 += value.abs();
                entry.1 += 1;
            }
        }
        let mut importance: Vec<(String, f64)> = totals
            .into_iter()
            .map(|(feature, (sum, n))| (feature.to_string(), sum / n as f64))
            .collect();
        importance.sort_by(|a, b| b.1.total_cmp(&a.1));
        importance
    }

    pub fn model_info(&self) -> Option<ModelInfo> {
        let info = self.patient_predictions.first()?.model_info.as_ref()?;
        Some(ModelInfo {
            model_type: info.model_type.clone(),
            prediction_horizon: info.prediction_horizon.clone(),
            features_used: info.features_used,
            risk_assessment: None,
        })
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Union
// ---------------------------------------------------------------------------

/// A decoded prediction, tagged by domain.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "domain", content = "response", rename_all = "snake_case")]
pub enum PredictionResponse {
    Maternal(MaternalPrediction),
    /// One entry per row of a maternal series upload.
    MaternalSeries(Vec<MaternalPrediction>),
    Cardiovascular(CardiovascularPrediction),
    Diabetes(DiabetesAnalysis),
}

impl PredictionResponse {
    pub fn domain(&self) -> crate::domain::Domain {
        use crate::domain::Domain;
        match self {
            Self::Maternal(_) | Self::MaternalSeries(_) => Domain::Maternal,
            Self::Cardiovascular(_) => Domain::Cardiovascular,
            Self::Diabetes(_) => Domain::Diabetes,
        }
    }
}
