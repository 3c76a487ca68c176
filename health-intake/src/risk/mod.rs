//! Risk scoring: a deterministic rule-based scorer, a scorer delegated to an
//! external reasoning service, and the engine that selects between them.

mod deterministic;
mod delegated;
mod freshness;
mod openrouter;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{DEFAULT_SCORER_TIMEOUT, IntakeConfig};
use crate::message::ConversationMessage;
use crate::record::HealthRecord;

pub use deterministic::{DeterministicScorer, ScoringWeights};
pub use delegated::{
    AssessmentVariant, DelegatedScorer, ReasoningRequest, ReasoningService, parse_assessment,
};
pub use freshness::{Freshness, RiskTracker, Ticket};
pub use openrouter::OpenRouterReasoning;

pub const DISCLAIMER: &str = "This estimate is for general information only and is not a medical diagnosis. Please talk to a healthcare professional about your personal risk and screening options.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "Low")]
    Low,
    #[serde(rename = "Low-Moderate")]
    LowModerate,
    #[serde(rename = "Moderate")]
    Moderate,
    #[serde(rename = "Moderate-High")]
    ModerateHigh,
    #[serde(rename = "High")]
    High,
}

impl RiskLevel {
    /// Fixed bands: <20 Low, <40 Low-Moderate, <60 Moderate, <=80 Moderate-High, >80 High.
    pub fn from_percentage(percentage: u8) -> Self {
        match percentage {
            0..20 => RiskLevel::Low,
            20..40 => RiskLevel::LowModerate,
            40..60 => RiskLevel::Moderate,
            60..=80 => RiskLevel::ModerateHigh,
            _ => RiskLevel::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::LowModerate => "Low-Moderate",
            RiskLevel::Moderate => "Moderate",
            RiskLevel::ModerateHigh => "Moderate-High",
            RiskLevel::High => "High",
        }
    }

    /// Lenient parse of a level label as written by a language model.
    pub fn parse(label: &str) -> Option<Self> {
        let normalized: String = label
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect();
        let words: Vec<&str> = normalized.split_whitespace().filter(|w| *w != "to").collect();
        match words.as_slice() {
            ["low"] | ["very", "low"] => Some(RiskLevel::Low),
            ["low", "moderate"] | ["low", "medium"] => Some(RiskLevel::LowModerate),
            ["moderate"] | ["medium"] => Some(RiskLevel::Moderate),
            ["moderate", "high"] | ["medium", "high"] => Some(RiskLevel::ModerateHigh),
            ["high"] | ["very", "high"] => Some(RiskLevel::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "low" => Some(Confidence::Low),
            "medium" | "moderate" => Some(Confidence::Medium),
            "high" => Some(Confidence::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentSource {
    Deterministic,
    Delegated,
    Fallback,
}

/// One immutable risk estimate. Every computation produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    /// Always within 0..=100.
    pub percentage: u8,
    pub level: RiskLevel,
    pub confidence: Confidence,
    pub key_factors: Vec<String>,
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protective_factors: Vec<String>,
    pub disclaimer: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_questions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cancer_types_assessed: Vec<String>,
    pub is_error: bool,
    pub source: AssessmentSource,
    pub timestamp: DateTime<Utc>,
}

/// Rounds and clamps a raw score into 0..=100. NaN maps to 0.
pub fn clamp_percentage(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

/// A strategy that turns a record into an assessment. Implementations never
/// fail: any internal error is absorbed into a degraded assessment.
#[async_trait]
pub trait RiskScorer: Send + Sync {
    fn name(&self) -> &str;

    async fn assess_risk(
        &self,
        record: &HealthRecord,
        context: &[ConversationMessage],
    ) -> RiskAssessment;
}

/// Picks the delegated scorer when a reasoning service is configured, and the
/// deterministic scorer otherwise.
#[derive(Clone)]
pub struct RiskEngine {
    deterministic: Arc<DeterministicScorer>,
    delegated: Option<Arc<DelegatedScorer>>,
}

impl RiskEngine {
    /// Deterministic scoring only.
    pub fn deterministic(weights: ScoringWeights) -> Self {
        Self {
            deterministic: Arc::new(DeterministicScorer::new(weights)),
            delegated: None,
        }
    }

    /// Builds the engine from configuration, talking to OpenRouter when a
    /// reasoning section is present.
    pub fn from_config(config: &IntakeConfig) -> Self {
        match &config.reasoning {
            Some(reasoning) => {
                let service: Arc<dyn ReasoningService> =
                    Arc::new(OpenRouterReasoning::new(reasoning));
                Self::with_service(config, service)
            }
            None => Self::deterministic(config.weights.clone()),
        }
    }

    /// Builds the engine around an explicit reasoning service.
    pub fn with_service(config: &IntakeConfig, service: Arc<dyn ReasoningService>) -> Self {
        let deterministic = DeterministicScorer::new(config.weights.clone());
        let (timeout, variant) = config
            .reasoning
            .as_ref()
            .map(|r| (r.timeout(), r.variant))
            .unwrap_or((DEFAULT_SCORER_TIMEOUT, AssessmentVariant::default()));
        let delegated =
            DelegatedScorer::new(service, deterministic.clone(), config.history_window, timeout)
                .with_variant(variant);
        Self {
            deterministic: Arc::new(deterministic),
            delegated: Some(Arc::new(delegated)),
        }
    }

    pub fn uses_delegated(&self) -> bool {
        self.delegated.is_some()
    }

    /// The scorer the selection policy currently picks.
    pub fn scorer(&self) -> Arc<dyn RiskScorer> {
        match &self.delegated {
            Some(delegated) => delegated.clone() as Arc<dyn RiskScorer>,
            None => self.deterministic.clone() as Arc<dyn RiskScorer>,
        }
    }

    pub async fn assess_risk(
        &self,
        record: &HealthRecord,
        context: &[ConversationMessage],
    ) -> RiskAssessment {
        let scorer = self.scorer();
        info!(
            scorer = scorer.name(),
            answered = record.answered_count(),
            "computing risk assessment"
        );
        let assessment = scorer.assess_risk(record, context).await;
        info!(
            scorer = scorer.name(),
            percentage = assessment.percentage,
            level = %assessment.level,
            is_error = assessment.is_error,
            "risk assessment ready"
        );
        assessment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_bands() {
        let cases = [
            (0, RiskLevel::Low),
            (19, RiskLevel::Low),
            (20, RiskLevel::LowModerate),
            (39, RiskLevel::LowModerate),
            (40, RiskLevel::Moderate),
            (59, RiskLevel::Moderate),
            (60, RiskLevel::ModerateHigh),
            (80, RiskLevel::ModerateHigh),
            (81, RiskLevel::High),
            (100, RiskLevel::High),
        ];
        for (percentage, level) in cases {
            assert_eq!(RiskLevel::from_percentage(percentage), level, "{percentage}");
        }
    }

    #[test]
    fn test_level_parse_is_lenient() {
        assert_eq!(RiskLevel::parse("Low-Moderate"), Some(RiskLevel::LowModerate));
        assert_eq!(RiskLevel::parse("low to moderate"), Some(RiskLevel::LowModerate));
        assert_eq!(RiskLevel::parse(" MODERATE_HIGH "), Some(RiskLevel::ModerateHigh));
        assert_eq!(RiskLevel::parse("extreme"), None);
        assert_eq!(
            serde_json::to_string(&RiskLevel::ModerateHigh).unwrap(),
            "\"Moderate-High\""
        );
    }

    #[test]
    fn test_clamp_percentage() {
        assert_eq!(clamp_percentage(-12.0), 0);
        assert_eq!(clamp_percentage(37.4), 37);
        assert_eq!(clamp_percentage(37.5), 38);
        assert_eq!(clamp_percentage(250.0), 100);
        assert_eq!(clamp_percentage(f64::NAN), 0);
        assert_eq!(clamp_percentage(f64::INFINITY), 100);
    }

    #[tokio::test]
    async fn test_engine_without_reasoning_is_deterministic() {
        let engine = RiskEngine::from_config(&IntakeConfig::default());
        assert!(!engine.uses_delegated());

        let assessment = engine.assess_risk(&HealthRecord::new(), &[]).await;
        assert_eq!(assessment.source, AssessmentSource::Deterministic);
        assert!(!assessment.is_error);
    }
}
