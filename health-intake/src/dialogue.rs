//! Dialogue state: which required fields have been asked and answered, and
//! what to ask next.
//!
//! A field moves `NotAsked -> Asked -> Answered`. Answered is read from the
//! record itself, so [`DialogueState::is_complete`] and
//! [`DialogueState::next_question`] are computed from the same source and
//! cannot disagree. The only way to mark a field Asked is to return it from
//! `next_question`, which never hands out an Asked field again, apart from
//! the conditional `smoking.details` follow-up.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::debug;

use crate::record::{
    AlcoholFrequency, FieldId, FieldValue, HealthRecord, PartialRecord, SmokingStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldState {
    NotAsked,
    Asked,
    Answered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Question {
    pub field: FieldId,
    pub prompt: &'static str,
}

/// Outcome of [`DialogueState::next_question`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextQuestion {
    Ask(Question),
    /// Every open field has been asked once; waiting for the user to answer.
    Waiting,
    /// Every required field is answered. Terminal.
    Complete,
}

pub fn prompt_for(field: FieldId) -> &'static str {
    match field {
        FieldId::Age => "To start, how old are you?",
        FieldId::Gender => "What is your gender, male or female?",
        FieldId::Height => {
            "How tall are you? You can answer in cm, metres, or feet and inches."
        }
        FieldId::Weight => "What is your current weight, in kg or lbs?",
        FieldId::FamilyHistory => {
            "Has anyone in your family, such as a parent, sibling or grandparent, been diagnosed with cancer?"
        }
        FieldId::SmokingStatus => "Do you smoke, or have you smoked in the past?",
        FieldId::SmokingDetails => {
            "How much do you smoke, and what do you smoke? For example, 10 cigarettes a day."
        }
        FieldId::AlcoholFrequency => {
            "How often do you drink alcohol: never, daily, weekly, monthly, or occasionally?"
        }
    }
}

/// Confirmation naming the captured value of `field`, or `None` if unset.
pub fn acknowledge(field: FieldId, record: &HealthRecord) -> Option<String> {
    let text = match record.get(field)? {
        FieldValue::Age(age) => format!("Got it, you're {age} years old."),
        FieldValue::Gender(gender) => format!("Thanks, I've noted that you're {gender}."),
        FieldValue::Height(raw) => format!("Thanks, I've recorded your height as {raw}."),
        FieldValue::Weight(raw) => format!("Thanks, I've recorded your weight as {raw}."),
        FieldValue::FamilyHistory(history) if history.present => format!(
            "Thank you for telling me about your {}. I've added that cancer history to your record.",
            history.relations.join(" and ")
        ),
        FieldValue::FamilyHistory(_) => {
            "Good to know there's no family history of cancer.".to_string()
        }
        FieldValue::SmokingStatus(SmokingStatus::Never) => {
            "Great, I've noted that you've never smoked.".to_string()
        }
        FieldValue::SmokingStatus(SmokingStatus::Former) => {
            "Thanks, I've noted that you're a former smoker.".to_string()
        }
        FieldValue::SmokingStatus(SmokingStatus::Current) => {
            "Thanks for being open that you currently smoke.".to_string()
        }
        FieldValue::SmokingDetails(details) => {
            format!("Got it, I've noted your smoking habits: {details}.")
        }
        FieldValue::AlcoholFrequency(AlcoholFrequency::Never) => {
            "Thanks, I've noted that you don't drink alcohol.".to_string()
        }
        FieldValue::AlcoholFrequency(frequency) => {
            format!("Thanks, I've noted that you drink {frequency}.")
        }
    };
    Some(text)
}

/// Asked-field bookkeeping and the current topic pointer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DialogueState {
    asked: BTreeSet<FieldId>,
    topic: Option<FieldId>,
}

impl DialogueState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The field asked about most recently.
    pub fn topic(&self) -> Option<FieldId> {
        self.topic
    }

    pub fn was_asked(&self, field: FieldId) -> bool {
        self.asked.contains(&field)
    }

    pub fn field_state(&self, field: FieldId, record: &HealthRecord) -> FieldState {
        if record.has(field) {
            FieldState::Answered
        } else if self.was_asked(field) {
            FieldState::Asked
        } else {
            FieldState::NotAsked
        }
    }

    /// `smoking.details` only applies to current smokers; everything else always applies.
    pub fn is_applicable(field: FieldId, record: &HealthRecord) -> bool {
        match field {
            FieldId::SmokingDetails => {
                record.smoking().status == Some(SmokingStatus::Current)
            }
            _ => true,
        }
    }

    /// Applicable fields without an answer, in required order. A status that
    /// is still unknown keeps the whole smoking branch open through
    /// `smoking.status` itself.
    pub fn open_fields<'a>(&'a self, record: &'a HealthRecord) -> impl Iterator<Item = FieldId> + 'a {
        FieldId::REQUIRED
            .into_iter()
            .filter(move |field| Self::is_applicable(*field, record) && !record.has(*field))
    }

    pub fn is_complete(&self, record: &HealthRecord) -> bool {
        self.open_fields(record).next().is_none()
    }

    /// Picks the next question and marks it Asked. When every open field has
    /// been asked, nothing is marked and the topic moves to the first open
    /// field.
    pub fn next_question(&mut self, record: &HealthRecord) -> NextQuestion {
        let field = self
            .open_fields(record)
            .find(|field| !self.was_asked(*field))
            .or_else(|| {
                self.open_fields(record)
                    .find(|field| field.is_conditional())
            });

        match field {
            Some(field) => {
                self.mark_asked(field);
                NextQuestion::Ask(Question {
                    field,
                    prompt: prompt_for(field),
                })
            }
            None if self.is_complete(record) => NextQuestion::Complete,
            None => {
                // Bare replies to the reminder go to the first missing field.
                let first_open = self.open_fields(record).next();
                self.topic = first_open;
                NextQuestion::Waiting
            }
        }
    }

    fn mark_asked(&mut self, field: FieldId) {
        debug_assert!(
            field.is_conditional() || !self.asked.contains(&field),
            "field {field} asked twice"
        );
        self.asked.insert(field);
        self.topic = Some(field);
        debug!(field = %field, "asking for field");
    }
}

/// Owns the accumulating record together with its dialogue bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct DialogueTracker {
    record: HealthRecord,
    state: DialogueState,
}

impl DialogueTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self) -> &HealthRecord {
        &self.record
    }

    pub fn state(&self) -> &DialogueState {
        &self.state
    }

    pub fn topic(&self) -> Option<FieldId> {
        self.state.topic()
    }

    /// Merges extracted values into the record, returning the newly answered fields.
    pub fn apply(&mut self, partial: PartialRecord, source: usize) -> Vec<FieldId> {
        self.record.apply(partial, source)
    }

    pub fn next_question(&mut self) -> NextQuestion {
        self.state.next_question(&self.record)
    }

    pub fn is_complete(&self) -> bool {
        self.state.is_complete(&self.record)
    }

    pub fn field_state(&self, field: FieldId) -> FieldState {
        self.state.field_state(field, &self.record)
    }

    pub fn acknowledge(&self, field: FieldId) -> Option<String> {
        acknowledge(field, &self.record)
    }

    /// One confirmation sentence per field, joined.
    pub fn acknowledge_all(&self, fields: &[FieldId]) -> Option<String> {
        let parts: Vec<String> = fields.iter().filter_map(|f| self.acknowledge(*f)).collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FamilyHistory, Gender};

    fn asked_field(next: NextQuestion) -> Option<FieldId> {
        match next {
            NextQuestion::Ask(question) => Some(question.field),
            _ => None,
        }
    }

    fn full_record(status: SmokingStatus) -> HealthRecord {
        let record = HealthRecord::new()
            .with(FieldValue::Age(45))
            .with(FieldValue::Gender(Gender::Female))
            .with(FieldValue::Height("165 cm".to_string()))
            .with(FieldValue::Weight("60 kg".to_string()))
            .with(FieldValue::FamilyHistory(FamilyHistory::none()))
            .with(FieldValue::SmokingStatus(status))
            .with(FieldValue::AlcoholFrequency(AlcoholFrequency::Weekly));
        match status {
            SmokingStatus::Current => {
                record.with(FieldValue::SmokingDetails("5 cigarettes a day".to_string()))
            }
            _ => record,
        }
    }

    #[test]
    fn test_questions_follow_required_order_without_repeats() {
        let mut state = DialogueState::new();
        let record = HealthRecord::new();

        let mut asked = Vec::new();
        while let Some(field) = asked_field(state.next_question(&record)) {
            asked.push(field);
            assert!(asked.len() < 20, "question loop did not terminate");
        }

        assert_eq!(
            asked,
            vec![
                FieldId::Age,
                FieldId::Gender,
                FieldId::Height,
                FieldId::Weight,
                FieldId::FamilyHistory,
                FieldId::SmokingStatus,
                FieldId::AlcoholFrequency,
            ]
        );
        assert_eq!(state.next_question(&record), NextQuestion::Waiting);
        assert!(!state.is_complete(&record));
    }

    #[test]
    fn test_waiting_points_topic_at_first_open_field() {
        let mut state = DialogueState::new();
        let record = HealthRecord::new();
        while asked_field(state.next_question(&record)).is_some() {}
        assert_eq!(state.topic(), Some(FieldId::Age));

        let record = record
            .with(FieldValue::Age(45))
            .with(FieldValue::Gender(Gender::Male));
        assert_eq!(state.next_question(&record), NextQuestion::Waiting);
        assert_eq!(state.topic(), Some(FieldId::Height));
        assert_eq!(state.field_state(FieldId::Weight, &record), FieldState::Asked);
    }

    #[test]
    fn test_smoking_details_only_for_current_smokers() {
        for status in [SmokingStatus::Never, SmokingStatus::Former] {
            let mut state = DialogueState::new();
            let record = HealthRecord::new().with(FieldValue::SmokingStatus(status));
            while let Some(field) = asked_field(state.next_question(&record)) {
                assert_ne!(field, FieldId::SmokingDetails);
            }
        }

        let mut state = DialogueState::new();
        let record = HealthRecord::new().with(FieldValue::SmokingStatus(SmokingStatus::Current));
        let asked: Vec<FieldId> =
            std::iter::from_fn(|| asked_field(state.next_question(&record)))
                .take(10)
                .collect();
        assert_eq!(asked[5], FieldId::SmokingDetails);
        assert_eq!(asked[6], FieldId::AlcoholFrequency);
        // Once everything else is asked, only the conditional follow-up repeats.
        assert!(asked[7..].iter().all(|f| *f == FieldId::SmokingDetails));
    }

    #[test]
    fn test_complete_record_is_terminal() {
        for status in [SmokingStatus::Never, SmokingStatus::Former, SmokingStatus::Current] {
            let record = full_record(status);
            let mut state = DialogueState::new();
            assert!(state.is_complete(&record));
            assert_eq!(state.next_question(&record), NextQuestion::Complete);
            assert_eq!(state.next_question(&record), NextQuestion::Complete);
        }
    }

    #[test]
    fn test_current_smoker_without_details_is_not_complete() {
        let record = HealthRecord::new()
            .with(FieldValue::Age(45))
            .with(FieldValue::Gender(Gender::Male))
            .with(FieldValue::Height("180 cm".to_string()))
            .with(FieldValue::Weight("80 kg".to_string()))
            .with(FieldValue::FamilyHistory(FamilyHistory::none()))
            .with(FieldValue::SmokingStatus(SmokingStatus::Current))
            .with(FieldValue::AlcoholFrequency(AlcoholFrequency::Never));
        let mut state = DialogueState::new();

        assert!(!state.is_complete(&record));
        assert_eq!(
            asked_field(state.next_question(&record)),
            Some(FieldId::SmokingDetails)
        );
    }

    #[test]
    fn test_field_states_progress() {
        let mut tracker = DialogueTracker::new();
        assert_eq!(tracker.field_state(FieldId::Age), FieldState::NotAsked);

        assert_eq!(asked_field(tracker.next_question()), Some(FieldId::Age));
        assert_eq!(tracker.field_state(FieldId::Age), FieldState::Asked);
        assert_eq!(tracker.topic(), Some(FieldId::Age));

        let mut partial = PartialRecord::new();
        partial.insert(FieldValue::Age(45));
        assert_eq!(tracker.apply(partial, 1), vec![FieldId::Age]);
        assert_eq!(tracker.field_state(FieldId::Age), FieldState::Answered);
        assert_eq!(asked_field(tracker.next_question()), Some(FieldId::Gender));
    }

    #[test]
    fn test_answered_fields_are_skipped_even_if_never_asked() {
        let mut tracker = DialogueTracker::new();
        let mut partial = PartialRecord::new();
        partial.insert(FieldValue::Age(30));
        partial.insert(FieldValue::Gender(Gender::Male));
        tracker.apply(partial, 0);

        assert_eq!(asked_field(tracker.next_question()), Some(FieldId::Height));
    }

    #[test]
    fn test_acknowledgement_names_the_value() {
        let record = HealthRecord::new()
            .with(FieldValue::Age(45))
            .with(FieldValue::FamilyHistory(FamilyHistory::with_relations(["father"])))
            .with(FieldValue::AlcoholFrequency(AlcoholFrequency::Weekly));

        assert!(acknowledge(FieldId::Age, &record).unwrap().contains("45"));
        assert!(acknowledge(FieldId::FamilyHistory, &record).unwrap().contains("father"));
        assert!(acknowledge(FieldId::AlcoholFrequency, &record).unwrap().contains("weekly"));
        assert_eq!(acknowledge(FieldId::Weight, &record), None);
    }

    #[test]
    fn test_acknowledge_all_joins_sentences() {
        let mut tracker = DialogueTracker::new();
        let mut partial = PartialRecord::new();
        partial.insert(FieldValue::Age(52));
        partial.insert(FieldValue::Weight("90 kg".to_string()));
        let fields = tracker.apply(partial, 0);

        let text = tracker.acknowledge_all(&fields).unwrap();
        assert!(text.contains("52"));
        assert!(text.contains("90 kg"));
        assert_eq!(tracker.acknowledge_all(&[]), None);
    }
}
