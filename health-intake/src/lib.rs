pub mod config;
pub mod dialogue;
pub mod error;
pub mod events;
pub mod extract;
pub mod message;
pub mod record;
pub mod risk;
pub mod runner;
pub mod session;
pub mod storage;
pub mod units;

// Re-export commonly used types
pub use config::{IntakeConfig, ReasoningConfig};
pub use dialogue::{DialogueState, DialogueTracker, FieldState, NextQuestion, Question};
pub use error::{IntakeError, Result};
pub use events::{EventBus, IntakeEvent};
pub use extract::{ExtractionContext, Extractor, FieldExtractor};
pub use message::{Conversation, ConversationMessage, MessageRole};
pub use record::{
    Alcohol, AlcoholFrequency, FamilyHistory, FieldId, FieldValue, Gender, HealthRecord,
    PartialRecord, Smoking, SmokingStatus,
};
pub use risk::{
    AssessmentSource, AssessmentVariant, Confidence, DelegatedScorer, DeterministicScorer,
    RiskAssessment, RiskEngine, RiskLevel, RiskScorer, ScoringWeights,
};
pub use runner::{IntakeRunner, SessionFactory};
pub use session::{IntakeSession, SessionHandle, SessionSnapshot, TurnOutcome};
pub use storage::{InMemorySessionStorage, SessionEntry, SessionStorage};
