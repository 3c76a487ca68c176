//! Per-session processing pipeline.
//!
//! One inbound message is fully processed (extract, apply, acknowledge,
//! maybe score, pick the next question) before the next one is accepted:
//! [`IntakeSession::handle_message`] takes `&mut self`, so callers holding
//! the session behind a mutex queue naturally. The risk computation is the
//! only suspension point and is raced against [`SessionHandle::close`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use crate::config::IntakeConfig;
use crate::dialogue::{DialogueTracker, FieldState, NextQuestion};
use crate::error::{IntakeError, Result};
use crate::events::{EventBus, IntakeEvent};
use crate::extract::Extractor;
use crate::message::{Conversation, ConversationMessage};
use crate::record::{FieldId, HealthRecord};
use crate::risk::{Freshness, RiskAssessment, RiskEngine, RiskTracker};

const GREETING: &str = "Hi! I'll ask you a few quick questions about your health so I can give you a general estimate of your cancer risk.";
const CLOSED_PROMPT: &str = "This session has ended. Thank you for your time.";

/// What the presentation layer receives after each processed message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnOutcome {
    pub session_id: String,
    pub prompt_text: String,
    pub acknowledgment_text: Option<String>,
    pub is_complete: bool,
    pub latest_risk_assessment: Option<RiskAssessment>,
    /// Fields newly answered by this message.
    pub captured: Vec<FieldId>,
}

/// Cloneable close switch for one session, usable without holding the
/// session itself.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: String,
    closed: Arc<watch::Sender<bool>>,
}

impl SessionHandle {
    fn new(id: &str) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            id: id.to_string(),
            closed: Arc::new(closed),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Closes the session. An in-flight risk computation is abandoned and
    /// later messages are rejected.
    pub fn close(&self) {
        if !self.closed.send_replace(true) {
            info!(session_id = %self.id, "session closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the session is closed.
    pub async fn closed(&self) {
        let mut receiver = self.closed.subscribe();
        let _ = receiver.wait_for(|closed| *closed).await;
    }
}

/// Serializable view of a session's state.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub record: HealthRecord,
    pub field_states: BTreeMap<FieldId, FieldState>,
    pub conversation: Vec<ConversationMessage>,
    pub is_complete: bool,
    pub is_closed: bool,
    pub risk_freshness: Freshness,
    pub latest_risk_assessment: Option<RiskAssessment>,
}

pub struct IntakeSession {
    id: String,
    extractor: Extractor,
    tracker: DialogueTracker,
    conversation: Conversation,
    risk: RiskTracker,
    engine: RiskEngine,
    history_window: usize,
    events: EventBus,
    handle: SessionHandle,
    last_prompt: Option<String>,
    completion_announced: bool,
}

impl IntakeSession {
    pub fn new(id: impl Into<String>, config: &IntakeConfig, engine: RiskEngine) -> Self {
        let id = id.into();
        Self {
            handle: SessionHandle::new(&id),
            id,
            extractor: Extractor::new(),
            tracker: DialogueTracker::new(),
            conversation: Conversation::new(),
            risk: RiskTracker::new(config.risk_threshold),
            engine,
            history_window: config.history_window,
            events: EventBus::new(config.event_capacity),
            last_prompt: None,
            completion_announced: false,
        }
    }

    pub fn with_extractor(mut self, extractor: Extractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IntakeEvent> {
        self.events.subscribe()
    }

    pub fn record(&self) -> &HealthRecord {
        self.tracker.record()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn is_complete(&self) -> bool {
        self.tracker.is_complete()
    }

    pub fn latest_assessment(&self) -> Option<&RiskAssessment> {
        self.risk.latest()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.handle.is_closed() {
            return Err(IntakeError::SessionClosed(self.id.clone()));
        }
        Ok(())
    }

    /// Greets the user and asks the first question. Calling it again repeats
    /// the current prompt without advancing the dialogue.
    pub fn start(&mut self) -> Result<TurnOutcome> {
        self.ensure_open()?;
        let prompt_text = match &self.last_prompt {
            Some(prompt) => prompt.clone(),
            None => {
                let question = self.next_prompt();
                let prompt = format!("{GREETING} {question}");
                self.conversation.add_assistant_message(prompt.clone());
                self.last_prompt = Some(prompt.clone());
                prompt
            }
        };
        info!(session_id = %self.id, "intake session started");
        Ok(self.outcome(prompt_text, None, Vec::new()))
    }

    /// Processes one user message end to end.
    pub async fn handle_message(&mut self, text: &str) -> Result<TurnOutcome> {
        self.ensure_open()?;
        let index = self.conversation.add_user_message(text);

        let partial =
            self.extractor
                .extract_with_topic(text, self.tracker.record(), self.tracker.topic());
        let captured = self.tracker.apply(partial, index);
        for field in &captured {
            if let Some(value) = self.tracker.record().get(*field) {
                info!(session_id = %self.id, field = %field, value = %value, "field captured");
                self.events.publish(IntakeEvent::FieldCaptured {
                    session_id: self.id.clone(),
                    field: *field,
                    value,
                    message_index: index,
                });
            }
        }
        if captured.is_empty() {
            debug!(session_id = %self.id, "no new fields in message");
        }
        let acknowledgment = self.tracker.acknowledge_all(&captured);

        self.risk.note_new_fields(captured.len());
        let complete = self.tracker.is_complete();
        if self.risk.should_recompute(complete) && !self.recompute().await {
            return Ok(self.outcome(CLOSED_PROMPT.to_string(), acknowledgment, captured));
        }

        let prompt_text = self.next_prompt();
        let reply = match &acknowledgment {
            Some(ack) => format!("{ack} {prompt_text}"),
            None => prompt_text.clone(),
        };
        self.conversation.add_assistant_message(reply);
        self.last_prompt = Some(prompt_text.clone());

        Ok(self.outcome(prompt_text, acknowledgment, captured))
    }

    /// Runs one risk computation. Returns false if the session was closed
    /// before it finished, in which case the result is discarded.
    async fn recompute(&mut self) -> bool {
        let ticket = self.risk.begin();
        let record = self.tracker.record().clone();
        let context = self.conversation.last_messages(self.history_window).to_vec();
        let engine = self.engine.clone();
        let handle = self.handle.clone();

        tokio::select! {
            assessment = engine.assess_risk(&record, &context) => {
                if self.risk.finish(ticket, assessment.clone()) {
                    self.events.publish(IntakeEvent::RiskUpdated {
                        session_id: self.id.clone(),
                        assessment,
                    });
                }
                true
            }
            _ = handle.closed() => {
                self.risk.abandon(ticket);
                info!(
                    session_id = %self.id,
                    ticket = ticket.generation(),
                    "session closed during risk computation, result discarded"
                );
                false
            }
        }
    }

    fn next_prompt(&mut self) -> String {
        match self.tracker.next_question() {
            NextQuestion::Ask(question) => question.prompt.to_string(),
            NextQuestion::Waiting => {
                let missing: Vec<&str> = self
                    .tracker
                    .state()
                    .open_fields(self.tracker.record())
                    .map(describe)
                    .collect();
                format!(
                    "I still need your {} to finish. Share it whenever you're ready.",
                    join_words(&missing)
                )
            }
            NextQuestion::Complete => {
                if !self.completion_announced {
                    self.completion_announced = true;
                    info!(session_id = %self.id, "intake complete");
                    self.events.publish(IntakeEvent::Completed {
                        session_id: self.id.clone(),
                    });
                }
                completion_summary(self.risk.latest())
            }
        }
    }

    fn outcome(
        &self,
        prompt_text: String,
        acknowledgment_text: Option<String>,
        captured: Vec<FieldId>,
    ) -> TurnOutcome {
        TurnOutcome {
            session_id: self.id.clone(),
            prompt_text,
            acknowledgment_text,
            is_complete: self.tracker.is_complete(),
            latest_risk_assessment: self.risk.latest().cloned(),
            captured,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            record: self.tracker.record().clone(),
            field_states: FieldId::REQUIRED
                .into_iter()
                .map(|field| (field, self.tracker.field_state(field)))
                .collect(),
            conversation: self.conversation.all_messages().to_vec(),
            is_complete: self.tracker.is_complete(),
            is_closed: self.handle.is_closed(),
            risk_freshness: self.risk.freshness(),
            latest_risk_assessment: self.risk.latest().cloned(),
        }
    }
}

fn describe(field: FieldId) -> &'static str {
    match field {
        FieldId::Age => "age",
        FieldId::Gender => "gender",
        FieldId::Height => "height",
        FieldId::Weight => "weight",
        FieldId::FamilyHistory => "family history of cancer",
        FieldId::SmokingStatus => "smoking status",
        FieldId::SmokingDetails => "smoking habits",
        FieldId::AlcoholFrequency => "drinking habits",
    }
}

fn join_words(words: &[&str]) -> String {
    match words {
        [] => String::new(),
        [only] => only.to_string(),
        [rest @ .., last] => format!("{} and {last}", rest.join(", ")),
    }
}

fn completion_summary(latest: Option<&RiskAssessment>) -> String {
    let Some(assessment) = latest else {
        return "Thank you, that's everything I need.".to_string();
    };
    let estimate = if assessment.is_error {
        "a rough estimate"
    } else {
        "an estimate"
    };
    format!(
        "Thank you, that's everything I need. Based on your answers, {estimate} of your risk is {}% ({}). {}",
        assessment.percentage, assessment.level, assessment.disclaimer
    )
}
