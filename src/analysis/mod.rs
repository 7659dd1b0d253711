//! Response model for prediction results.
//!
//! [`DiabetesAnalysis`] wraps the raw glucose-forecast response and exposes
//! total accessors: every getter works on any JSON value (including `null`
//! and partial shapes) and degrades to `None`, an empty map or an empty
//! vector instead of failing. Getters are pure functions of the stored value
//! and nothing is cached.
//!
//! The maternal and cardiovascular responses are typed in [`responses`];
//! [`parsed`] holds the chart-ready snapshot the dashboard renders.

pub mod parsed;
pub mod responses;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::payload::parse_number;

pub use parsed::{DiabetesPrediction, OverallRisk, ParsedDiabetesData, RiskSummary};
pub use responses::{
    CardiovascularPrediction, MaternalPrediction, PredictionResponse, SeriesPoint, ShapFactor,
};

/// Names of the base risk components, in display order.
pub const COMPONENT_NAMES: [&str; 5] = [
    "hyper_risk",
    "hypo_risk",
    "trend_high_risk",
    "trend_low_risk",
    "volatility_risk",
];

/// Literal used when a horizon has no `risk_level`.
pub const UNKNOWN_LEVEL: &str = "unknown";

// ---------------------------------------------------------------------------
// Derived types
// ---------------------------------------------------------------------------

/// Patient identifier as returned by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatientId {
    Number(f64),
    Text(String),
}

impl std::fmt::Display for PatientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) if n.fract() == 0.0 => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// One point of the glucose forecast band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub day: f64,
    pub p10: Option<f64>,
    pub p50: Option<f64>,
    pub p90: Option<f64>,
}

/// One bar of the per-horizon risk chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonRiskPoint {
    /// Horizon in days, as text (`"7"`, `"30"`).
    pub horizon: String,
    pub risk: f64,
    pub level: String,
}

/// The five risk components, generic over how each one is held.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskComponents<T> {
    pub hyper_risk: T,
    pub hypo_risk: T,
    pub trend_high_risk: T,
    pub trend_low_risk: T,
    pub volatility_risk: T,
}

impl<T> RiskComponents<T> {
    /// Build from a per-name constructor, in [`COMPONENT_NAMES`] order.
    pub fn from_fn(mut f: impl FnMut(&'static str) -> T) -> Self {
        Self {
            hyper_risk: f("hyper_risk"),
            hypo_risk: f("hypo_risk"),
            trend_high_risk: f("trend_high_risk"),
            trend_low_risk: f("trend_low_risk"),
            volatility_risk: f("volatility_risk"),
        }
    }

    pub fn entries(&self) -> [(&'static str, &T); 5] {
        [
            ("hyper_risk", &self.hyper_risk),
            ("hypo_risk", &self.hypo_risk),
            ("trend_high_risk", &self.trend_high_risk),
            ("trend_low_risk", &self.trend_low_risk),
            ("volatility_risk", &self.volatility_risk),
        ]
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries()
            .into_iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }
}

/// Risk detail for one horizon (`horizon_7d`, `horizon_90d`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HorizonRisk {
    #[serde(flatten)]
    pub components: RiskComponents<Option<f64>>,
    pub risk_score: Option<f64>,
    pub risk_level: Option<String>,
}

impl HorizonRisk {
    fn from_value(value: &Value) -> Self {
        Self {
            components: RiskComponents::from_fn(|name| value.get(name).and_then(as_number)),
            risk_score: value.get("risk_score").and_then(as_number),
            risk_level: value.get("risk_level").and_then(as_text),
        }
    }
}

/// A contextual multiplier applied by the model (missed insulin, illness...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextFactor {
    pub impact: Option<String>,
    pub multiplier: Option<f64>,
    pub value: Value,
}

impl ContextFactor {
    fn from_value(value: &Value) -> Self {
        Self {
            impact: value.get("impact").and_then(as_text),
            multiplier: value.get("multiplier").and_then(as_number),
            value: value.get("value").cloned().unwrap_or(Value::Null),
        }
    }
}

/// Model description attached to a response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_type: Option<String>,
    pub prediction_horizon: Option<String>,
    pub features_used: Option<f64>,
    pub risk_assessment: Option<String>,
}

impl ModelInfo {
    pub(crate) fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        Some(Self {
            model_type: value.get("model_type").and_then(as_text),
            prediction_horizon: value.get("prediction_horizon").and_then(as_text),
            features_used: value.get("features_used").and_then(as_number),
            risk_assessment: value.get("risk_assessment").and_then(as_text),
        })
    }
}

// ---------------------------------------------------------------------------
// DiabetesAnalysis
// ---------------------------------------------------------------------------

/// Read-only view over a diabetes prediction response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiabetesAnalysis {
    raw: Value,
}

impl DiabetesAnalysis {
    pub fn from_api(raw: Value) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Top-level `patient_id`, else `prediction_metadata.patient_id`.
    pub fn patient_id(&self) -> Option<PatientId> {
        non_null(self.raw.get("patient_id"))
            .or_else(|| non_null(self.prediction_metadata()?.get("patient_id")))
            .and_then(as_patient_id)
    }

    pub fn pipeline_timestamp(&self) -> Option<&str> {
        self.raw.get("pipeline_timestamp")?.as_str()
    }

    pub fn model_info(&self) -> Option<ModelInfo> {
        ModelInfo::from_value(self.raw.get("model_info")?)
    }

    pub fn prediction_metadata(&self) -> Option<&Value> {
        non_null(self.raw.get("prediction_metadata"))
    }

    pub fn glucose_predictions(&self) -> Option<&Value> {
        non_null(self.raw.get("glucose_predictions"))
    }

    pub fn risk_assessment(&self) -> Option<&Value> {
        non_null(self.raw.get("risk_assessment"))
    }

    /// `risk_assessment.overall_risk_score`, falling back to the legacy
    /// top-level field.
    pub fn overall_risk_score(&self) -> Option<f64> {
        self.risk_field("overall_risk_score").and_then(as_number)
    }

    pub fn overall_risk_level(&self) -> Option<String> {
        self.risk_field("overall_risk_level").and_then(as_text)
    }

    pub fn context_multiplier(&self) -> Option<f64> {
        self.risk_assessment()?.get("context_multiplier").and_then(as_number)
    }

    pub fn recommendations(&self) -> Vec<String> {
        self.risk_assessment()
            .and_then(|ra| ra.get("recommendations"))
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(as_text).collect())
            .unwrap_or_default()
    }

    /// Context factors keyed by name, in response order.
    pub fn context_factors(&self) -> Vec<(String, ContextFactor)> {
        self.risk_object("context_factors")
            .map(|map| {
                map.iter()
                    .map(|(k, v)| (k.clone(), ContextFactor::from_value(v)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Full base risk matrices from `detailed_explanations`.
    pub fn base_risk_components(&self) -> RiskComponents<Vec<Vec<f64>>> {
        let base = self
            .risk_assessment()
            .and_then(|ra| ra.get("detailed_explanations"))
            .and_then(|d| d.get("base_risk_components"));

        RiskComponents::from_fn(|name| {
            base.and_then(|b| b.get(name))
                .and_then(Value::as_array)
                .map(|rows| rows.iter().map(number_row).collect())
                .unwrap_or_default()
        })
    }

    /// Horizon risk entries, in response order.
    pub fn horizon_risks(&self) -> Vec<(String, HorizonRisk)> {
        self.risk_object("horizon_risks")
            .map(|map| {
                map.iter()
                    .map(|(k, v)| (k.clone(), HorizonRisk::from_value(v)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Risk detail for a horizon given as `"90d"` or `"horizon_90d"`.
    pub fn horizon_risk(&self, horizon: &str) -> Option<HorizonRisk> {
        let key = if horizon.starts_with("horizon_") {
            horizon.to_string()
        } else {
            format!("horizon_{horizon}")
        };
        self.risk_object("horizon_risks")?
            .get(&key)
            .map(HorizonRisk::from_value)
    }

    /// Forecast band zipped from `glucose_predictions`.
    pub fn forecast_data(&self) -> Vec<ForecastPoint> {
        let Some(pred) = self.glucose_predictions() else {
            return Vec::new();
        };
        let Some(days) = pred.get("horizons_days").and_then(Value::as_array) else {
            return Vec::new();
        };
        let quantile = |name: &str, i: usize| pred.get(name)?.get(i).and_then(as_number);

        days.iter()
            .enumerate()
            .filter_map(|(i, day)| {
                Some(ForecastPoint {
                    day: as_number(day)?,
                    p10: quantile("p10_quantile", i),
                    p50: quantile("p50_quantile", i),
                    p90: quantile("p90_quantile", i),
                })
            })
            .collect()
    }

    /// One entry per `horizon_<N>d` key: missing score is `0`, missing level
    /// is `"unknown"`.
    pub fn horizon_risk_data(&self) -> Vec<HorizonRiskPoint> {
        let Some(map) = self.risk_object("horizon_risks") else {
            return Vec::new();
        };
        map.iter()
            .map(|(key, value)| HorizonRiskPoint {
                horizon: horizon_label(key),
                risk: value.get("risk_score").and_then(as_number).unwrap_or(0.0),
                level: value
                    .get("risk_level")
                    .and_then(as_text)
                    .unwrap_or_else(|| UNKNOWN_LEVEL.to_string()),
            })
            .collect()
    }

    /// Mean of the p50 forecast (missing medians count as 0).
    pub fn average_glucose(&self) -> Option<f64> {
        let forecast = self.forecast_data();
        if forecast.is_empty() {
            return None;
        }
        let sum: f64 = forecast.iter().map(|p| p.p50.unwrap_or(0.0)).sum();
        Some(sum / forecast.len() as f64)
    }

    /// Per-component risk breakdown stored with each report.
    ///
    /// Uses the 90-day horizon when the response has one; otherwise the mean
    /// of the first row of each base risk matrix. Components with no data are
    /// left out.
    pub fn risk_factors(&self) -> BTreeMap<String, f64> {
        if let Some(horizon) = self.horizon_risk("90d") {
            let factors: BTreeMap<String, f64> = horizon
                .components
                .entries()
                .into_iter()
                .filter_map(|(name, v)| v.map(|v| (name.to_string(), v)))
                .collect();
            if !factors.is_empty() {
                return factors;
            }
        }

        self.base_risk_components()
            .entries()
            .into_iter()
            .filter_map(|(name, rows)| {
                let first = rows.first()?;
                mean(first).map(|m| (name.to_string(), m))
            })
            .collect()
    }

    /// Per-patient analyses of a cohort response (`patient_predictions`).
    pub fn patient_analyses(&self) -> Vec<DiabetesAnalysis> {
        self.raw
            .get("patient_predictions")
            .and_then(Value::as_array)
            .map(|items| items.iter().cloned().map(Self::from_api).collect())
            .unwrap_or_default()
    }

    fn risk_field(&self, key: &str) -> Option<&Value> {
        non_null(self.risk_assessment().and_then(|ra| ra.get(key)))
            .or_else(|| non_null(self.raw.get(key)))
    }

    fn risk_object(&self, key: &str) -> Option<&Map<String, Value>> {
        self.risk_assessment()?.get(key)?.as_object()
    }
}

// ---------------------------------------------------------------------------
// Value helpers
// ---------------------------------------------------------------------------

/// `horizon_30d` → `30`. Strips the first `horizon_` and the first `d`.
pub fn horizon_label(key: &str) -> String {
    key.replacen("horizon_", "", 1).replacen('d', "", 1)
}

/// Numeric reading of a JSON value: numbers, numeric strings and booleans.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Text reading of a JSON value; `null` has none.
pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn as_patient_id(value: &Value) -> Option<PatientId> {
    match value {
        Value::Number(n) => n.as_f64().map(PatientId::Number),
        Value::String(s) => Some(PatientId::Text(s.clone())),
        _ => None,
    }
}

fn non_null(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn number_row(row: &Value) -> Vec<f64> {
    match row {
        Value::Array(items) => items.iter().filter_map(as_number).collect(),
        _ => Vec::new(),
    }
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn full_response() -> Value {
        json!({
            "patient_id": 17,
            "pipeline_timestamp": "2025-03-01T12:00:00Z",
            "prediction_metadata": { "patient_id": 99, "model_used": "tft" },
            "glucose_predictions": {
                "horizons_days": [7, 14, 30],
                "p10_quantile": [90.0, 92.5, 95.0],
                "p50_quantile": [110.0, 115.0, 120.0],
                "p90_quantile": [140.0, 150.0]
            },
            "risk_assessment": {
                "overall_risk_score": 0.61,
                "overall_risk_level": "high",
                "horizon_risks": {
                    "horizon_7d": { "risk_score": 0.42, "risk_level": "high", "hyper_risk": 0.3 },
                    "horizon_90d": {
                        "hyper_risk": 0.5, "hypo_risk": 0.1, "trend_high_risk": 0.2,
                        "trend_low_risk": 0.05, "volatility_risk": 0.35,
                        "risk_score": 0.7, "risk_level": "high"
                    }
                },
                "context_factors": {
                    "missed_insulin": { "impact": "increases_risk", "multiplier": 1.2, "value": 3 }
                },
                "detailed_explanations": {
                    "base_risk_components": {
                        "hyper_risk": [[0.1, 0.3], [0.9]],
                        "volatility_risk": "bad"
                    }
                },
                "recommendations": ["Check glucose twice daily"]
            },
            "model_info": { "model_type": "TFT", "features_used": 24 }
        })
    }

    #[test]
    fn documented_horizon_scenario() {
        let analysis = DiabetesAnalysis::from_api(json!({
            "risk_assessment": { "horizon_risks": { "horizon_7d": { "risk_score": 0.42, "risk_level": "high" } } }
        }));
        assert_eq!(
            analysis.horizon_risk_data(),
            vec![HorizonRiskPoint {
                horizon: "7".to_string(),
                risk: 0.42,
                level: "high".to_string()
            }]
        );
    }

    #[test]
    fn horizon_defaults_for_missing_fields() {
        let analysis = DiabetesAnalysis::from_api(json!({
            "risk_assessment": { "horizon_risks": { "horizon_30d": {}, "horizon_60d": null } }
        }));
        let data = analysis.horizon_risk_data();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0].horizon, "30");
        assert_eq!(data[0].risk, 0.0);
        assert_eq!(data[0].level, "unknown");
        assert_eq!(data[1].level, "unknown");
    }

    #[test]
    fn horizon_order_follows_response() {
        let data = DiabetesAnalysis::from_api(full_response()).horizon_risk_data();
        let labels: Vec<&str> = data.iter().map(|d| d.horizon.as_str()).collect();
        assert_eq!(labels, vec!["7", "90"]);
    }

    #[test]
    fn forecast_zips_quantiles() {
        let forecast = DiabetesAnalysis::from_api(full_response()).forecast_data();
        assert_eq!(forecast.len(), 3);
        assert_eq!(
            forecast[1],
            ForecastPoint {
                day: 14.0,
                p10: Some(92.5),
                p50: Some(115.0),
                p90: Some(150.0)
            }
        );
        assert_eq!(forecast[2].p90, None);
    }

    #[test]
    fn forecast_empty_without_days_array() {
        let no_pred = DiabetesAnalysis::from_api(json!({}));
        assert!(no_pred.forecast_data().is_empty());
        let bad_days = DiabetesAnalysis::from_api(json!({ "glucose_predictions": { "horizons_days": 7 } }));
        assert!(bad_days.forecast_data().is_empty());
    }

    #[test]
    fn patient_id_prefers_top_level() {
        let analysis = DiabetesAnalysis::from_api(full_response());
        assert_eq!(analysis.patient_id(), Some(PatientId::Number(17.0)));
        assert_eq!(analysis.patient_id().unwrap().to_string(), "17");

        let meta_only = DiabetesAnalysis::from_api(json!({
            "patient_id": null,
            "prediction_metadata": { "patient_id": "amy" }
        }));
        assert_eq!(meta_only.patient_id(), Some(PatientId::Text("amy".to_string())));
    }

    #[test]
    fn overall_risk_falls_back_to_legacy_fields() {
        let legacy = DiabetesAnalysis::from_api(json!({
            "overall_risk_score": 0.2, "overall_risk_level": "low"
        }));
        assert_eq!(legacy.overall_risk_score(), Some(0.2));
        assert_eq!(legacy.overall_risk_level().as_deref(), Some("low"));
    }

    #[test]
    fn base_components_keep_numeric_rows() {
        let base = DiabetesAnalysis::from_api(full_response()).base_risk_components();
        assert_eq!(base.hyper_risk, vec![vec![0.1, 0.3], vec![0.9]]);
        assert!(base.volatility_risk.is_empty());
        assert!(base.hypo_risk.is_empty());
    }

    #[test]
    fn context_factors_and_recommendations() {
        let analysis = DiabetesAnalysis::from_api(full_response());
        let factors = analysis.context_factors();
        assert_eq!(factors.len(), 1);
        assert_eq!(factors[0].0, "missed_insulin");
        assert_eq!(factors[0].1.multiplier, Some(1.2));
        assert_eq!(factors[0].1.value, json!(3));
        assert_eq!(analysis.recommendations(), vec!["Check glucose twice daily"]);
    }

    #[test]
    fn risk_factors_prefer_ninety_day_horizon() {
        let factors = DiabetesAnalysis::from_api(full_response()).risk_factors();
        assert_eq!(factors.len(), 5);
        assert_eq!(factors["volatility_risk"], 0.35);
    }

    #[test]
    fn risk_factors_fall_back_to_base_components() {
        let analysis = DiabetesAnalysis::from_api(json!({
            "risk_assessment": { "detailed_explanations": { "base_risk_components": {
                "hyper_risk": [[0.2, 0.4]], "hypo_risk": [[]]
            } } }
        }));
        let factors = analysis.risk_factors();
        assert_eq!(factors.len(), 1);
        assert!((factors["hyper_risk"] - 0.3).abs() < 1e-9);
    }

    #[test]
    fn getters_are_total_on_odd_input() {
        for raw in [json!(null), json!(42), json!("text"), json!([1, 2]), json!({ "risk_assessment": [] })] {
            let analysis = DiabetesAnalysis::from_api(raw);
            assert!(analysis.patient_id().is_none());
            assert!(analysis.forecast_data().is_empty());
            assert!(analysis.horizon_risk_data().is_empty());
            assert!(analysis.context_factors().is_empty());
            assert!(analysis.recommendations().is_empty());
            assert!(analysis.overall_risk_score().is_none());
            assert!(analysis.risk_factors().is_empty());
            assert!(analysis.average_glucose().is_none());
        }
    }

    #[test]
    fn multibyte_strings_read_as_missing_numbers() {
        let analysis = DiabetesAnalysis::from_api(json!({
            "patient_id": "€7",
            "glucose_predictions": {
                "horizons_days": ["→1", 2],
                "p50_quantile": ["µ120", "€121"]
            },
            "risk_assessment": {
                "overall_risk_score": "→0.4",
                "overall_risk_level": "high",
                "horizon_risks": { "horizon_7d": { "risk_score": "€0.4", "risk_level": "→" } }
            }
        }));

        assert!(analysis.overall_risk_score().is_none());
        let forecast = analysis.forecast_data();
        assert_eq!(forecast.len(), 1);
        assert_eq!(forecast[0].day, 2.0);
        assert_eq!(forecast[0].p50, None);

        let horizons = analysis.horizon_risk_data();
        assert_eq!(horizons[0].risk, 0.0);
        assert_eq!(horizons[0].level, "→");
        assert!(analysis.risk_factors().is_empty());
    }

    #[test]
    fn forecast_skips_non_numeric_days() {
        let analysis = DiabetesAnalysis::from_api(json!({
            "glucose_predictions": {
                "horizons_days": [1, null, "later", "3"],
                "p10_quantile": [90, 91, 92, 93],
                "p50_quantile": [110, 111, 112, 113],
                "p90_quantile": [140, 141, 142, 143]
            }
        }));
        let forecast = analysis.forecast_data();

        let days: Vec<f64> = forecast.iter().map(|p| p.day).collect();
        assert_eq!(days, vec![1.0, 3.0]);
        assert_eq!(forecast[1].p50, Some(113.0));
    }

    #[test]
    fn getters_are_idempotent() {
        let analysis = DiabetesAnalysis::from_api(full_response());
        assert_eq!(analysis.forecast_data(), analysis.forecast_data());
        assert_eq!(analysis.horizon_risk_data(), analysis.horizon_risk_data());
        assert_eq!(analysis.base_risk_components(), analysis.base_risk_components());
    }

    #[test]
    fn average_glucose_uses_medians() {
        let avg = DiabetesAnalysis::from_api(full_response()).average_glucose().unwrap();
        assert!((avg - 115.0).abs() < 1e-9);
    }

    #[test]
    fn horizon_label_strips_first_occurrences() {
        assert_eq!(horizon_label("horizon_14d"), "14");
        assert_eq!(horizon_label("14d"), "14");
        assert_eq!(horizon_label("horizon_7dd"), "7d");
    }

    #[test]
    fn cohort_responses_expose_per_patient_views() {
        let analysis = DiabetesAnalysis::from_api(json!({
            "patient_predictions": [
                { "patient_id": 1, "risk_assessment": { "overall_risk_score": 0.1, "overall_risk_level": "low" } },
                { "patient_id": 2 }
            ]
        }));
        let patients = analysis.patient_analyses();
        assert_eq!(patients.len(), 2);
        assert_eq!(patients[0].overall_risk_level().as_deref(), Some("low"));
        assert!(patients[1].overall_risk_score().is_none());
    }
}
