//! Field extraction from free-text chat replies.
//!
//! Every field is parsed by its own [`FieldExtractor`] strategy. The
//! [`Extractor`] runs them in required-field order against one message and
//! collects the values for fields the record does not hold yet. A strategy can
//! be swapped for a single field without touching the others:
//!
//! ```ignore
//! let extractor = Extractor::new().with_strategy(Arc::new(MyAgeModel::new()));
//! let partial = extractor.extract("I'm 45 and I smoke", &record);
//! ```

mod heuristics;

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::record::{FieldId, FieldValue, HealthRecord, PartialRecord, SmokingStatus};

pub use heuristics::{
    AgeHeuristic, AlcoholHeuristic, FamilyHistoryHeuristic, GenderHeuristic, HeightHeuristic,
    SmokingDetailsHeuristic, SmokingStatusHeuristic, WeightHeuristic, MAX_AGE, MIN_AGE,
};

/// What a strategy can see while parsing one message.
pub struct ExtractionContext<'a> {
    message: &'a str,
    known: &'a HealthRecord,
    pending: &'a PartialRecord,
    topic: Option<FieldId>,
}

impl<'a> ExtractionContext<'a> {
    pub fn message(&self) -> &'a str {
        self.message
    }

    pub fn known(&self) -> &'a HealthRecord {
        self.known
    }

    /// The field the assistant asked about last, if any.
    pub fn topic(&self) -> Option<FieldId> {
        self.topic
    }

    pub fn is_topic(&self, field: FieldId) -> bool {
        self.topic == Some(field)
    }

    /// Smoking status from the record, or from earlier in this same pass.
    pub fn smoking_status(&self) -> Option<SmokingStatus> {
        self.known.smoking().status.or_else(|| {
            match self.pending.get(FieldId::SmokingStatus) {
                Some(FieldValue::SmokingStatus(status)) => Some(*status),
                _ => None,
            }
        })
    }
}

/// Parsing strategy for exactly one field.
pub trait FieldExtractor: Send + Sync {
    fn field(&self) -> FieldId;

    /// Returns a value for [`FieldExtractor::field`], or `None` when the
    /// message carries nothing usable.
    fn extract(&self, cx: &ExtractionContext<'_>) -> Option<FieldValue>;
}

/// Runs one strategy per field over a message.
#[derive(Clone)]
pub struct Extractor {
    strategies: BTreeMap<FieldId, Arc<dyn FieldExtractor>>,
}

impl Extractor {
    /// An extractor backed by the keyword and pattern heuristics.
    pub fn new() -> Self {
        let strategies: [Arc<dyn FieldExtractor>; 8] = [
            Arc::new(AgeHeuristic),
            Arc::new(GenderHeuristic),
            Arc::new(HeightHeuristic),
            Arc::new(WeightHeuristic),
            Arc::new(FamilyHistoryHeuristic),
            Arc::new(SmokingStatusHeuristic),
            Arc::new(SmokingDetailsHeuristic),
            Arc::new(AlcoholHeuristic),
        ];
        Self {
            strategies: strategies.into_iter().map(|s| (s.field(), s)).collect(),
        }
    }

    /// Replaces the strategy for `strategy.field()`.
    pub fn with_strategy(mut self, strategy: Arc<dyn FieldExtractor>) -> Self {
        self.strategies.insert(strategy.field(), strategy);
        self
    }

    /// Extracts values for fields not yet present in `known`.
    pub fn extract(&self, message: &str, known: &HealthRecord) -> PartialRecord {
        self.extract_with_topic(message, known, None)
    }

    /// Like [`Extractor::extract`], with the field last asked about so bare
    /// answers ("45", "no") can be attributed.
    pub fn extract_with_topic(
        &self,
        message: &str,
        known: &HealthRecord,
        topic: Option<FieldId>,
    ) -> PartialRecord {
        let mut partial = PartialRecord::new();

        for (field, strategy) in &self.strategies {
            if known.has(*field) {
                continue;
            }
            let cx = ExtractionContext {
                message,
                known,
                pending: &partial,
                topic,
            };
            match strategy.extract(&cx) {
                Some(value) if value.field() == *field => {
                    debug!(field = %field, value = %value, "extracted field value");
                    partial.insert(value);
                }
                Some(value) => {
                    warn!(
                        expected = %field,
                        produced = %value.field(),
                        "strategy produced a value for the wrong field, dropping it"
                    );
                }
                None => {}
            }
        }

        partial
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AlcoholFrequency, FamilyHistory, Gender};
    use proptest::prelude::*;

    fn extract(message: &str) -> PartialRecord {
        Extractor::new().extract(message, &HealthRecord::new())
    }

    #[test]
    fn test_every_valid_age_is_extracted() {
        let extractor = Extractor::new();
        for n in MIN_AGE..=MAX_AGE {
            let partial =
                extractor.extract(&format!("I am {n} years old"), &HealthRecord::new());
            assert_eq!(partial.get(FieldId::Age), Some(&FieldValue::Age(n)), "age {n}");
            assert_eq!(partial.len(), 1, "age {n} should set only the age");
        }
    }

    proptest! {
        #[test]
        fn test_out_of_range_age_is_discarded(n in 121u32..100_000) {
            let partial = extract(&format!("I am {n} years old"));
            prop_assert!(!partial.contains(FieldId::Age));
        }
    }

    #[test]
    fn test_zero_age_is_discarded() {
        assert!(!extract("I am 0 years old").contains(FieldId::Age));
    }

    #[test]
    fn test_father_cancer_and_smoking_in_one_pass() {
        let partial = extract("My father had cancer and I've smoked for 10 years");

        assert_eq!(
            partial.get(FieldId::FamilyHistory),
            Some(&FieldValue::FamilyHistory(FamilyHistory::with_relations(["father"])))
        );
        assert_eq!(
            partial.get(FieldId::SmokingStatus),
            Some(&FieldValue::SmokingStatus(SmokingStatus::Current))
        );
        assert!(!partial.contains(FieldId::Age));
    }

    #[test]
    fn test_known_fields_are_left_alone() {
        let extractor = Extractor::new();
        let mut record = HealthRecord::new();
        let first = extractor.extract("I'm 45 years old and female", &record);
        record.apply(first, 0);

        let again = extractor.extract("I'm 45 years old and female", &record);
        assert!(again.is_empty());

        let corrected = extractor.extract("Sorry, I'm actually 46 years old", &record);
        assert!(corrected.is_empty());
        assert_eq!(record.age(), Some(45));
        assert_eq!(record.gender(), Some(Gender::Female));
    }

    #[test]
    fn test_topic_lets_bare_answers_through() {
        let extractor = Extractor::new();
        let record = HealthRecord::new();

        let age = extractor.extract_with_topic("52", &record, Some(FieldId::Age));
        assert_eq!(age.get(FieldId::Age), Some(&FieldValue::Age(52)));
        assert!(extractor.extract("52", &record).is_empty());

        let alcohol =
            extractor.extract_with_topic("No.", &record, Some(FieldId::AlcoholFrequency));
        assert_eq!(
            alcohol.get(FieldId::AlcoholFrequency),
            Some(&FieldValue::AlcoholFrequency(AlcoholFrequency::Never))
        );
    }

    #[test]
    fn test_smoking_details_follow_current_status_in_same_pass() {
        let partial = extract("I smoke about a pack a day");
        assert_eq!(
            partial.get(FieldId::SmokingStatus),
            Some(&FieldValue::SmokingStatus(SmokingStatus::Current))
        );
        assert_eq!(
            partial.get(FieldId::SmokingDetails),
            Some(&FieldValue::SmokingDetails("a pack a day".to_string()))
        );
    }

    struct FixedAge(u8);

    impl FieldExtractor for FixedAge {
        fn field(&self) -> FieldId {
            FieldId::Age
        }

        fn extract(&self, _cx: &ExtractionContext<'_>) -> Option<FieldValue> {
            Some(FieldValue::Age(self.0))
        }
    }

    struct Misbehaving;

    impl FieldExtractor for Misbehaving {
        fn field(&self) -> FieldId {
            FieldId::Height
        }

        fn extract(&self, _cx: &ExtractionContext<'_>) -> Option<FieldValue> {
            Some(FieldValue::Weight("80 kg".to_string()))
        }
    }

    #[test]
    fn test_strategy_replaces_one_field_only() {
        let extractor = Extractor::new().with_strategy(Arc::new(FixedAge(33)));
        let partial = extractor.extract("I'm a woman", &HealthRecord::new());

        assert_eq!(partial.get(FieldId::Age), Some(&FieldValue::Age(33)));
        assert_eq!(
            partial.get(FieldId::Gender),
            Some(&FieldValue::Gender(Gender::Female))
        );
    }

    #[test]
    fn test_wrong_field_values_are_dropped() {
        let extractor = Extractor::new().with_strategy(Arc::new(Misbehaving));
        let partial = extractor.extract("nothing useful here", &HealthRecord::new());
        assert!(partial.is_empty());
    }
}
