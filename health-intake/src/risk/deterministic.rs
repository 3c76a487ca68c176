use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{
    AssessmentSource, Confidence, DISCLAIMER, RiskAssessment, RiskLevel, RiskScorer,
    clamp_percentage,
};
use crate::dialogue::{DialogueState, prompt_for};
use crate::message::ConversationMessage;
use crate::record::{AlcoholFrequency, Gender, HealthRecord, SmokingStatus};
use crate::units;

/// Fixed point contributions of the additive scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub base: f64,
    pub age_over_40: f64,
    pub age_over_50: f64,
    pub age_over_65: f64,
    pub current_smoker: f64,
    pub former_smoker: f64,
    pub overweight: f64,
    pub obese: f64,
    pub daily_alcohol: f64,
    pub family_history: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            base: 10.0,
            age_over_40: 5.0,
            age_over_50: 10.0,
            age_over_65: 15.0,
            current_smoker: 25.0,
            former_smoker: 10.0,
            overweight: 5.0,
            obese: 10.0,
            daily_alcohol: 10.0,
            family_history: 15.0,
        }
    }
}

const OVERWEIGHT_BMI: f64 = 25.0;
const OBESE_BMI: f64 = 30.0;
const HEALTHY_BMI_FLOOR: f64 = 18.5;
const MAX_NEXT_QUESTIONS: usize = 3;

/// Rule-based additive scorer. Pure: the same record always yields the same
/// percentage, level and factor lists.
#[derive(Debug, Clone, Default)]
pub struct DeterministicScorer {
    weights: ScoringWeights,
}

#[derive(Debug, Default)]
struct Tally {
    score: f64,
    key_factors: Vec<String>,
    protective_factors: Vec<String>,
    recommendations: Vec<String>,
}

impl Tally {
    fn add(&mut self, points: f64, factor: String) {
        self.score += points;
        self.key_factors.push(factor);
    }

    fn recommend(&mut self, recommendation: &str) {
        self.recommendations.push(recommendation.to_string());
    }
}

impl DeterministicScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Scores `record` synchronously.
    pub fn assess(&self, record: &HealthRecord) -> RiskAssessment {
        let w = &self.weights;
        let mut tally = Tally {
            score: w.base,
            ..Tally::default()
        };

        if let Some(age) = record.age() {
            match age {
                66.. => tally.add(w.age_over_65, format!("Age {age} (over 65)")),
                51..=65 => tally.add(w.age_over_50, format!("Age {age} (over 50)")),
                41..=50 => tally.add(w.age_over_40, format!("Age {age} (over 40)")),
                _ => {}
            }
            if age >= 45 {
                tally.recommend(
                    "Ask your doctor about age-appropriate screening, such as colorectal cancer screening.",
                );
            }
            if age >= 40 && record.gender() == Some(Gender::Female) {
                tally.recommend("Discuss regular mammogram screening with your doctor.");
            }
        }

        match record.smoking().status {
            Some(SmokingStatus::Current) => {
                tally.add(w.current_smoker, "Current smoker".to_string());
                tally.recommend(
                    "Consider a smoking cessation program; quitting lowers the risk of many cancers.",
                );
            }
            Some(SmokingStatus::Former) => {
                tally.add(w.former_smoker, "Former smoker".to_string());
                tally.recommend("Mention your smoking history to your doctor at check-ups.");
            }
            Some(SmokingStatus::Never) => {
                tally.protective_factors.push("Never smoked".to_string());
            }
            None => {}
        }

        if let (Some(height), Some(weight)) = (record.height(), record.weight()) {
            if let Some(bmi) = units::bmi(height, weight) {
                if bmi >= OBESE_BMI {
                    tally.add(w.obese, format!("BMI {bmi:.1} (obese range)"));
                } else if bmi >= OVERWEIGHT_BMI {
                    tally.add(w.overweight, format!("BMI {bmi:.1} (overweight range)"));
                } else if bmi >= HEALTHY_BMI_FLOOR {
                    tally.protective_factors.push(format!("Healthy BMI ({bmi:.1})"));
                }
                if bmi >= OVERWEIGHT_BMI {
                    tally.recommend(
                        "Aim for a healthy weight through regular activity and a balanced diet.",
                    );
                }
            }
        }

        match record.alcohol().frequency {
            Some(AlcoholFrequency::Daily) => {
                tally.add(w.daily_alcohol, "Daily alcohol use".to_string());
                tally.recommend("Cutting back on alcohol reduces the risk of several cancers.");
            }
            Some(AlcoholFrequency::Never) => {
                tally.protective_factors.push("Does not drink alcohol".to_string());
            }
            _ => {}
        }

        match record.family_history() {
            Some(history) if history.present => {
                tally.add(
                    w.family_history,
                    format!("Family history of cancer ({})", history.relations.join(", ")),
                );
                tally.recommend(
                    "Share your family history with your doctor; earlier screening may be advised.",
                );
            }
            Some(_) => {
                tally
                    .protective_factors
                    .push("No known family history of cancer".to_string());
            }
            None => {}
        }

        tally.recommend("Keep up regular check-ups with your healthcare provider.");

        let percentage = clamp_percentage(tally.score);
        RiskAssessment {
            percentage,
            level: RiskLevel::from_percentage(percentage),
            confidence: confidence_for(record),
            key_factors: tally.key_factors,
            recommendations: tally.recommendations,
            protective_factors: tally.protective_factors,
            disclaimer: DISCLAIMER.to_string(),
            next_questions: open_questions(record),
            additional_info: None,
            cancer_types_assessed: Vec::new(),
            is_error: false,
            source: AssessmentSource::Deterministic,
            timestamp: Utc::now(),
        }
    }
}

fn confidence_for(record: &HealthRecord) -> Confidence {
    match record.answered_count() {
        7.. => Confidence::High,
        4..=6 => Confidence::Medium,
        _ => Confidence::Low,
    }
}

/// Prompts for the first few fields the record still lacks.
pub(crate) fn open_questions(record: &HealthRecord) -> Vec<String> {
    DialogueState::new()
        .open_fields(record)
        .take(MAX_NEXT_QUESTIONS)
        .map(|field| prompt_for(field).to_string())
        .collect()
}

#[async_trait]
impl RiskScorer for DeterministicScorer {
    fn name(&self) -> &str {
        "deterministic"
    }

    async fn assess_risk(
        &self,
        record: &HealthRecord,
        _context: &[ConversationMessage],
    ) -> RiskAssessment {
        self.assess(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FamilyHistory, FieldValue};
    use proptest::prelude::*;

    fn scenario_record() -> HealthRecord {
        HealthRecord::new()
            .with(FieldValue::Age(45))
            .with(FieldValue::Gender(Gender::Female))
            .with(FieldValue::SmokingStatus(SmokingStatus::Never))
            .with(FieldValue::AlcoholFrequency(AlcoholFrequency::Weekly))
    }

    fn worst_case_record(age: u8) -> HealthRecord {
        HealthRecord::new()
            .with(FieldValue::Age(age))
            .with(FieldValue::Gender(Gender::Male))
            .with(FieldValue::Height("170 cm".to_string()))
            .with(FieldValue::Weight("120 kg".to_string()))
            .with(FieldValue::FamilyHistory(FamilyHistory::with_relations([
                "mother", "father",
            ])))
            .with(FieldValue::SmokingStatus(SmokingStatus::Current))
            .with(FieldValue::SmokingDetails("two packs a day".to_string()))
            .with(FieldValue::AlcoholFrequency(AlcoholFrequency::Daily))
    }

    #[test]
    fn test_scenario_is_low_or_low_moderate() {
        let assessment = DeterministicScorer::default().assess(&scenario_record());
        assert!(matches!(
            assessment.level,
            RiskLevel::Low | RiskLevel::LowModerate
        ));
        assert_eq!(assessment.percentage, 15);
        assert!(assessment.protective_factors.contains(&"Never smoked".to_string()));
        assert!(!assessment.is_error);
    }

    #[test]
    fn test_contributions_add_up() {
        let scorer = DeterministicScorer::default();
        // 10 base + 15 age + 25 smoking + 10 obese + 10 alcohol + 15 family
        let assessment = scorer.assess(&worst_case_record(70));
        assert_eq!(assessment.percentage, 85);
        assert_eq!(assessment.level, RiskLevel::High);
        assert_eq!(assessment.confidence, Confidence::High);
        assert_eq!(assessment.key_factors.len(), 5);
        assert!(assessment.next_questions.is_empty());
    }

    #[test]
    fn test_age_bands_are_not_cumulative() {
        let scorer = DeterministicScorer::default();
        let score = |age| scorer.assess(&HealthRecord::new().with(FieldValue::Age(age))).percentage;
        assert_eq!(score(40), 10);
        assert_eq!(score(41), 15);
        assert_eq!(score(51), 20);
        assert_eq!(score(66), 25);
    }

    #[test]
    fn test_bmi_needs_parseable_units() {
        let scorer = DeterministicScorer::default();
        let unitless = HealthRecord::new()
            .with(FieldValue::Height("170".to_string()))
            .with(FieldValue::Weight("120".to_string()));
        assert_eq!(scorer.assess(&unitless).percentage, 10);

        let imperial = HealthRecord::new()
            .with(FieldValue::Height("5'7\"".to_string()))
            .with(FieldValue::Weight("265 lbs".to_string()));
        assert_eq!(scorer.assess(&imperial).percentage, 20);
    }

    #[test]
    fn test_sparse_record_has_low_confidence_and_follow_ups() {
        let assessment = DeterministicScorer::default().assess(&HealthRecord::new());
        assert_eq!(assessment.confidence, Confidence::Low);
        assert_eq!(assessment.next_questions.len(), MAX_NEXT_QUESTIONS);
        assert_eq!(assessment.percentage, 10);
    }

    proptest! {
        #[test]
        fn test_scoring_is_pure(age in 1u8..=120) {
            let scorer = DeterministicScorer::default();
            let record = worst_case_record(age);
            let first = scorer.assess(&record);
            let second = scorer.assess(&record);
            prop_assert_eq!(first.percentage, second.percentage);
            prop_assert_eq!(first.level, second.level);
            prop_assert_eq!(first.key_factors, second.key_factors);
        }

        #[test]
        fn test_percentage_is_clamped(scale in 1.0f64..1_000.0, age in 1u8..=120) {
            let base = ScoringWeights::default();
            let weights = ScoringWeights {
                base: base.base * scale,
                age_over_40: base.age_over_40 * scale,
                age_over_50: base.age_over_50 * scale,
                age_over_65: base.age_over_65 * scale,
                current_smoker: base.current_smoker * scale,
                former_smoker: base.former_smoker * scale,
                overweight: base.overweight * scale,
                obese: base.obese * scale,
                daily_alcohol: base.daily_alcohol * scale,
                family_history: base.family_history * scale,
            };
            let assessment = DeterministicScorer::new(weights).assess(&worst_case_record(age));
            prop_assert!(assessment.percentage <= 100);
            prop_assert_eq!(
                assessment.level,
                RiskLevel::from_percentage(assessment.percentage)
            );
        }
    }

    #[test]
    fn test_negative_weights_clamp_to_zero() {
        let weights = ScoringWeights {
            base: -50.0,
            ..ScoringWeights::default()
        };
        let assessment = DeterministicScorer::new(weights).assess(&HealthRecord::new());
        assert_eq!(assessment.percentage, 0);
        assert_eq!(assessment.level, RiskLevel::Low);
    }
}
