use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::deterministic::open_questions;
use super::{
    AssessmentSource, Confidence, DISCLAIMER, DeterministicScorer, RiskAssessment, RiskLevel,
    RiskScorer, clamp_percentage,
};
use crate::dialogue::DialogueState;
use crate::error::{IntakeError, Result};
use crate::message::ConversationMessage;
use crate::record::HealthRecord;
use crate::units;

const INTERIM_PROMPT: &str = r#"
You are a health risk screening assistant. You receive a partially completed
health questionnaire and the most recent turns of the intake conversation.
Estimate the person's general cancer risk from the information available so far.
Guidelines:
1 - Base the estimate only on the data provided; do not invent values.
2 - Lower your confidence when important fields are missing.
3 - Suggest up to three follow-up questions for the missing information.
4 - Never present the estimate as a diagnosis.
Respond **only** with JSON of the form
{ "riskPercentage": 0-100, "riskLevel": "Low|Low-Moderate|Moderate|Moderate-High|High",
  "confidence": "Low|Medium|High", "keyFactors": ["..."], "recommendations": ["..."],
  "disclaimer": "...", "nextQuestions": ["..."] }
"#;

const FINAL_PROMPT: &str = r#"
You are a health risk screening assistant. You receive a completed health
questionnaire and the most recent turns of the intake conversation.
Produce a final general cancer risk assessment.
Guidelines:
1 - Base the assessment only on the data provided; do not invent values.
2 - List the factors that raise the risk and the factors that lower it.
3 - Name the cancer types the assessment considered.
4 - Give practical, non-alarming recommendations.
5 - Never present the assessment as a diagnosis.
Respond **only** with JSON of the form
{ "riskPercentage": 0-100, "riskLevel": "Low|Low-Moderate|Moderate|Moderate-High|High",
  "confidence": "Low|Medium|High", "keyFactors": ["..."], "protectiveFactors": ["..."],
  "recommendations": ["..."], "additionalInfo": "...", "cancerTypesAssessed": ["..."],
  "disclaimer": "...", "nextQuestions": ["..."] }
"#;

const FALLBACK_DISCLAIMER: &str = "We could not complete a detailed risk assessment right now. This rough estimate is for general information only and is not a medical diagnosis; please consult a healthcare professional.";

const FALLBACK_QUESTIONS: [&str; 3] = [
    "Have you had any cancer screenings, and when was the most recent one?",
    "Have you noticed any unusual or persistent symptoms lately?",
    "Would you like tips on lowering your risk through lifestyle changes?",
];

/// Which response schema to ask for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentVariant {
    #[default]
    Interim,
    Final,
}

/// One request to an external reasoning service.
#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningRequest {
    pub system_prompt: String,
    pub prompt: String,
    /// Bounded trailing window of the conversation, oldest first.
    pub history: Vec<ConversationMessage>,
}

/// Port to an external reasoning service. Implementations return the raw
/// model reply; parsing and fallback live in [`DelegatedScorer`].
#[async_trait]
pub trait ReasoningService: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: ReasoningRequest) -> Result<String>;
}

/// Scores by asking a [`ReasoningService`]. Any transport failure, timeout or
/// malformed reply is absorbed into a degraded assessment.
pub struct DelegatedScorer {
    service: Arc<dyn ReasoningService>,
    baseline: DeterministicScorer,
    window: usize,
    timeout: Duration,
    variant: AssessmentVariant,
}

impl DelegatedScorer {
    pub fn new(
        service: Arc<dyn ReasoningService>,
        baseline: DeterministicScorer,
        window: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            service,
            baseline,
            window,
            timeout,
            variant: AssessmentVariant::Interim,
        }
    }

    /// Variant used while intake is incomplete. A complete record always
    /// gets the final schema.
    pub fn with_variant(mut self, variant: AssessmentVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn variant_for(&self, record: &HealthRecord) -> AssessmentVariant {
        if DialogueState::new().is_complete(record) {
            AssessmentVariant::Final
        } else {
            self.variant
        }
    }

    pub fn build_request(
        &self,
        record: &HealthRecord,
        context: &[ConversationMessage],
        variant: AssessmentVariant,
    ) -> Result<ReasoningRequest> {
        let system_prompt = match variant {
            AssessmentVariant::Interim => INTERIM_PROMPT,
            AssessmentVariant::Final => FINAL_PROMPT,
        };

        let record_json = serde_json::to_string_pretty(record)?;
        let bmi = match (record.height(), record.weight()) {
            (Some(height), Some(weight)) => units::bmi(height, weight),
            _ => None,
        };
        let bmi_line = match bmi {
            Some(bmi) => format!("Derived BMI: {bmi:.1}"),
            None => "Derived BMI: unknown".to_string(),
        };
        let prompt = format!(
            "Health questionnaire ({answered} of {total} fields answered):\n{record_json}\n{bmi_line}",
            answered = record.answered_count(),
            total = crate::record::FieldId::REQUIRED.len(),
        );

        let start = context.len().saturating_sub(self.window);
        Ok(ReasoningRequest {
            system_prompt: system_prompt.trim().to_string(),
            prompt,
            history: context[start..].to_vec(),
        })
    }

    async fn request_assessment(
        &self,
        record: &HealthRecord,
        context: &[ConversationMessage],
    ) -> Result<RiskAssessment> {
        let variant = self.variant_for(record);
        let request = self.build_request(record, context, variant)?;
        debug!(
            service = self.service.name(),
            ?variant,
            history = request.history.len(),
            "sending assessment request"
        );

        let raw = tokio::time::timeout(self.timeout, self.service.complete(request))
            .await
            .map_err(|_| IntakeError::Timeout(self.timeout))??;

        let mut assessment = parse_assessment(&raw)?;
        if assessment.next_questions.is_empty() {
            assessment.next_questions = open_questions(record);
        }
        Ok(assessment)
    }

    /// Degraded assessment used whenever the service cannot deliver. Keeps
    /// the local baseline's estimate so the number is still meaningful.
    pub fn fallback(&self, record: &HealthRecord) -> RiskAssessment {
        let baseline = self.baseline.assess(record);
        RiskAssessment {
            confidence: Confidence::Low,
            disclaimer: FALLBACK_DISCLAIMER.to_string(),
            next_questions: FALLBACK_QUESTIONS.iter().map(|q| q.to_string()).collect(),
            is_error: true,
            source: AssessmentSource::Fallback,
            timestamp: Utc::now(),
            ..baseline
        }
    }
}

#[async_trait]
impl RiskScorer for DelegatedScorer {
    fn name(&self) -> &str {
        "delegated"
    }

    async fn assess_risk(
        &self,
        record: &HealthRecord,
        context: &[ConversationMessage],
    ) -> RiskAssessment {
        match self.request_assessment(record, context).await {
            Ok(assessment) => {
                info!(
                    service = self.service.name(),
                    percentage = assessment.percentage,
                    "delegated assessment accepted"
                );
                assessment
            }
            Err(e) if e.is_scoring_failure() => {
                warn!(
                    service = self.service.name(),
                    error = %e,
                    "delegated assessment failed, using fallback"
                );
                self.fallback(record)
            }
            Err(e) => {
                error!(
                    service = self.service.name(),
                    error = %e,
                    "unexpected error from reasoning service, using fallback"
                );
                self.fallback(record)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAssessment {
    risk_percentage: Option<Value>,
    risk_level: Option<String>,
    confidence: Option<String>,
    #[serde(default)]
    key_factors: Vec<String>,
    #[serde(default)]
    recommendations: Vec<String>,
    #[serde(default)]
    protective_factors: Vec<String>,
    disclaimer: Option<String>,
    #[serde(default)]
    next_questions: Vec<String>,
    additional_info: Option<String>,
    #[serde(default)]
    cancer_types_assessed: Vec<String>,
}

/// Strips code fences and surrounding prose, leaving the outermost JSON object.
fn json_payload(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.trim_end().strip_suffix("```").unwrap_or(s))
        .unwrap_or(trimmed);
    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    (start < end).then(|| &unfenced[start..=end])
}

fn percentage_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
}

/// Parses a reasoning service reply. `riskPercentage` is required; every
/// other key falls back to a default. The level is always re-derived from the
/// clamped percentage so it stays consistent with the bands.
pub fn parse_assessment(raw: &str) -> Result<RiskAssessment> {
    let payload = json_payload(raw)
        .ok_or_else(|| IntakeError::SchemaParse("no JSON object in response".to_string()))?;
    let parsed: RawAssessment = serde_json::from_str(payload)
        .map_err(|e| IntakeError::SchemaParse(format!("{e}. Raw response: {raw}")))?;

    let value = parsed
        .risk_percentage
        .as_ref()
        .ok_or_else(|| IntakeError::SchemaParse("missing riskPercentage".to_string()))?;
    let percentage = percentage_value(value)
        .map(clamp_percentage)
        .ok_or_else(|| IntakeError::SchemaParse(format!("invalid riskPercentage: {value}")))?;

    let level = RiskLevel::from_percentage(percentage);
    if let Some(label) = parsed.risk_level.as_deref() {
        if RiskLevel::parse(label) != Some(level) {
            debug!(reported = label, derived = %level, "reported risk level disagrees with percentage");
        }
    }

    Ok(RiskAssessment {
        percentage,
        level,
        confidence: parsed
            .confidence
            .as_deref()
            .and_then(Confidence::parse)
            .unwrap_or(Confidence::Medium),
        key_factors: parsed.key_factors,
        recommendations: parsed.recommendations,
        protective_factors: parsed.protective_factors,
        disclaimer: parsed
            .disclaimer
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| DISCLAIMER.to_string()),
        next_questions: parsed.next_questions,
        additional_info: parsed.additional_info.filter(|s| !s.trim().is_empty()),
        cancer_types_assessed: parsed.cancer_types_assessed,
        is_error: false,
        source: AssessmentSource::Delegated,
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{
        AlcoholFrequency, FamilyHistory, FieldValue, Gender, SmokingStatus,
    };
    use std::sync::Mutex;

    enum Reply {
        Text(String),
        Fail,
        Broken,
        Slow(Duration),
    }

    struct MockReasoning {
        reply: Reply,
        requests: Mutex<Vec<ReasoningRequest>>,
    }

    impl MockReasoning {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn text(text: &str) -> Arc<Self> {
            Self::new(Reply::Text(text.to_string()))
        }
    }

    #[async_trait]
    impl ReasoningService for MockReasoning {
        fn name(&self) -> &str {
            "mock"
        }

        async fn complete(&self, request: ReasoningRequest) -> Result<String> {
            self.requests.lock().unwrap().push(request);
            match &self.reply {
                Reply::Text(text) => Ok(text.clone()),
                Reply::Fail => Err(IntakeError::Transport("connection refused".to_string())),
                Reply::Broken => Err(anyhow::anyhow!("provider panicked").into()),
                Reply::Slow(delay) => {
                    tokio::time::sleep(*delay).await;
                    Ok(r#"{"riskPercentage": 10}"#.to_string())
                }
            }
        }
    }

    fn scorer(service: Arc<MockReasoning>) -> DelegatedScorer {
        DelegatedScorer::new(
            service,
            DeterministicScorer::default(),
            4,
            Duration::from_millis(200),
        )
    }

    fn partial_record() -> HealthRecord {
        HealthRecord::new()
            .with(FieldValue::Age(45))
            .with(FieldValue::Gender(Gender::Female))
    }

    fn complete_record() -> HealthRecord {
        partial_record()
            .with(FieldValue::Height("165 cm".to_string()))
            .with(FieldValue::Weight("60 kg".to_string()))
            .with(FieldValue::FamilyHistory(FamilyHistory::none()))
            .with(FieldValue::SmokingStatus(SmokingStatus::Never))
            .with(FieldValue::AlcoholFrequency(AlcoholFrequency::Weekly))
    }

    fn assert_fallback(assessment: &RiskAssessment) {
        assert!(assessment.is_error);
        assert_eq!(assessment.confidence, Confidence::Low);
        assert_eq!(assessment.source, AssessmentSource::Fallback);
        assert_eq!(assessment.disclaimer, FALLBACK_DISCLAIMER);
        assert_eq!(assessment.next_questions.len(), FALLBACK_QUESTIONS.len());
    }

    #[tokio::test]
    async fn test_transport_failure_falls_back() {
        let scorer = scorer(MockReasoning::new(Reply::Fail));
        let assessment = scorer.assess_risk(&partial_record(), &[]).await;
        assert_fallback(&assessment);
        // Baseline estimate is kept.
        assert_eq!(assessment.percentage, 15);
    }

    #[tokio::test]
    async fn test_unexpected_service_error_still_falls_back() {
        let scorer = scorer(MockReasoning::new(Reply::Broken));
        let assessment = scorer.assess_risk(&partial_record(), &[]).await;
        assert_fallback(&assessment);
    }

    #[tokio::test]
    async fn test_missing_percentage_falls_back() {
        let service = MockReasoning::text(
            r#"{"riskLevel": "Low", "confidence": "High", "keyFactors": ["age"]}"#,
        );
        let assessment = scorer(service).assess_risk(&partial_record(), &[]).await;
        assert_fallback(&assessment);
    }

    #[tokio::test]
    async fn test_non_json_reply_falls_back() {
        let service = MockReasoning::text("I'm sorry, I can't help with that.");
        let assessment = scorer(service).assess_risk(&partial_record(), &[]).await;
        assert_fallback(&assessment);
    }

    #[tokio::test]
    async fn test_slow_service_times_out() {
        let service = MockReasoning::new(Reply::Slow(Duration::from_secs(5)));
        let assessment = scorer(service).assess_risk(&partial_record(), &[]).await;
        assert_fallback(&assessment);
    }

    #[tokio::test]
    async fn test_successful_reply_is_clamped() {
        let service = MockReasoning::text(
            r#"```json
{"riskPercentage": 150, "riskLevel": "High", "confidence": "high",
 "keyFactors": ["Current smoker"], "recommendations": ["Quit smoking"],
 "disclaimer": "Not a diagnosis.", "nextQuestions": []}
```"#,
        );
        let assessment = scorer(service).assess_risk(&partial_record(), &[]).await;
        assert!(!assessment.is_error);
        assert_eq!(assessment.percentage, 100);
        assert_eq!(assessment.level, RiskLevel::High);
        assert_eq!(assessment.confidence, Confidence::High);
        assert_eq!(assessment.source, AssessmentSource::Delegated);
        assert_eq!(assessment.disclaimer, "Not a diagnosis.");
        // Empty follow-ups are filled from the open fields.
        assert!(!assessment.next_questions.is_empty());
    }

    #[tokio::test]
    async fn test_request_carries_bounded_window_and_variant() {
        let service = MockReasoning::text(r#"{"riskPercentage": "35%"}"#);
        let scorer = scorer(service.clone());
        let context: Vec<ConversationMessage> = (0..10)
            .map(|i| ConversationMessage::user(format!("message {i}")))
            .collect();

        let interim = scorer.assess_risk(&partial_record(), &context).await;
        assert_eq!(interim.percentage, 35);
        assert_eq!(interim.level, RiskLevel::LowModerate);
        assert_eq!(interim.confidence, Confidence::Medium);
        assert_eq!(interim.disclaimer, DISCLAIMER);

        scorer.assess_risk(&complete_record(), &context).await;

        let requests = service.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].history.len(), 4);
        assert_eq!(requests[0].history[0].text, "message 6");
        assert!(requests[0].system_prompt.contains("partially completed"));
        assert!(requests[1].system_prompt.contains("cancerTypesAssessed"));
        assert!(requests[1].prompt.contains("Derived BMI: 22.0"));
    }

    #[test]
    fn test_parse_final_variant_fields() {
        let raw = r#"Here is the assessment:
{"riskPercentage": 22.4, "riskLevel": "Low-Moderate", "confidence": "Medium",
 "keyFactors": ["Age 45"], "protectiveFactors": ["Never smoked"],
 "recommendations": ["Screening"], "additionalInfo": "Keep active.",
 "cancerTypesAssessed": ["breast", "colorectal"], "disclaimer": ""}
Let me know if you need anything else."#;
        let assessment = parse_assessment(raw).unwrap();
        assert_eq!(assessment.percentage, 22);
        assert_eq!(assessment.protective_factors, vec!["Never smoked"]);
        assert_eq!(assessment.additional_info.as_deref(), Some("Keep active."));
        assert_eq!(assessment.cancer_types_assessed.len(), 2);
        assert_eq!(assessment.disclaimer, DISCLAIMER);
    }

    #[test]
    fn test_parse_rejects_malformed_percentage() {
        for raw in [
            r#"{"riskPercentage": "high"}"#,
            r#"{"riskPercentage": null}"#,
            r#"{"riskPercentage": [10]}"#,
            r#"{"keyFactors": "not a list", "riskPercentage": 10}"#,
            "{}",
        ] {
            let err = parse_assessment(raw).unwrap_err();
            assert!(matches!(err, IntakeError::SchemaParse(_)), "{raw}");
        }
    }

    #[test]
    fn test_config_variant_only_applies_while_incomplete() {
        let scorer = scorer(MockReasoning::text("{}")).with_variant(AssessmentVariant::Final);
        assert_eq!(scorer.variant_for(&partial_record()), AssessmentVariant::Final);

        let scorer = scorer.with_variant(AssessmentVariant::Interim);
        assert_eq!(scorer.variant_for(&partial_record()), AssessmentVariant::Interim);
        assert_eq!(scorer.variant_for(&complete_record()), AssessmentVariant::Final);
    }
}
