//! `DiabetesPrediction`: the extracted form of one glucose response, and the
//! chart-ready snapshot built from it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    DiabetesAnalysis, ForecastPoint, HorizonRiskPoint, ModelInfo, PatientId, RiskComponents,
};

/// Overall score and level; present only when the response has both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallRisk {
    pub score: f64,
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskSummary {
    pub overall_risk_score: Option<f64>,
    pub overall_risk_level: Option<String>,
    pub recommendations: Vec<String>,
}

/// Everything the diabetes dashboard renders, in one serializable value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedDiabetesData {
    pub forecast_data: Vec<ForecastPoint>,
    pub horizon_risk_data: Vec<HorizonRiskPoint>,
    pub overall_risk: Option<OverallRisk>,
    /// Passed through from `risk_assessment.context_factors`.
    pub context_factors: Map<String, Value>,
    /// First row of each base risk matrix.
    pub base_risk_components: RiskComponents<Vec<f64>>,
    /// Passed through from `risk_assessment.horizon_risks`.
    pub horizon_risks: Map<String, Value>,
    pub recommendations: Vec<String>,
    pub model_info: Option<ModelInfo>,
}

/// A glucose response with its top-level sections extracted.
#[derive(Debug, Clone, PartialEq)]
pub struct DiabetesPrediction {
    pub patient_id: Option<PatientId>,
    pub pipeline_timestamp: Option<String>,
    analysis: DiabetesAnalysis,
}

impl DiabetesPrediction {
    /// `None` unless the response is a JSON object.
    pub fn from_api(response: &Value) -> Option<Self> {
        if !response.is_object() {
            return None;
        }
        let analysis = DiabetesAnalysis::from_api(response.clone());
        Some(Self {
            patient_id: analysis.patient_id(),
            pipeline_timestamp: analysis.pipeline_timestamp().map(str::to_string),
            analysis,
        })
    }

    pub fn analysis(&self) -> &DiabetesAnalysis {
        &self.analysis
    }

    pub fn raw(&self) -> &Value {
        self.analysis.raw()
    }

    pub fn forecast_data(&self) -> Vec<ForecastPoint> {
        self.analysis.forecast_data()
    }

    /// `None` when the response has no `risk_assessment`.
    pub fn risk_summary(&self) -> Option<RiskSummary> {
        let ra = self.analysis.risk_assessment()?;
        Some(RiskSummary {
            overall_risk_score: ra.get("overall_risk_score").and_then(super::as_number),
            overall_risk_level: ra.get("overall_risk_level").and_then(super::as_text),
            recommendations: self.analysis.recommendations(),
        })
    }

    pub fn risk_factors(&self) -> BTreeMap<String, f64> {
        self.analysis.risk_factors()
    }

    pub fn to_parsed_data(&self) -> ParsedDiabetesData {
        let a = &self.analysis;
        let section = |key: &str| -> Map<String, Value> {
            a.risk_assessment()
                .and_then(|ra| ra.get(key))
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default()
        };

        let base = a.base_risk_components();
        let overall_risk = match (a.overall_risk_score(), a.overall_risk_level()) {
            (Some(score), Some(level)) => Some(OverallRisk { score, level }),
            _ => None,
        };

        ParsedDiabetesData {
            forecast_data: a.forecast_data(),
            horizon_risk_data: a.horizon_risk_data(),
            overall_risk,
            context_factors: section("context_factors"),
            base_risk_components: RiskComponents::from_fn(|name| {
                base.get(name)
                    .and_then(|rows| rows.first().cloned())
                    .unwrap_or_default()
            }),
            horizon_risks: section("horizon_risks"),
            recommendations: a.recommendations(),
            model_info: a.model_info(),
        }
    }
}
