//! IntakeRunner: load or create a session, process exactly **one** user
//! message, and keep the session in storage for the next round trip.
//!
//! Create the runner once at startup and share it across requests; it only
//! holds `Arc`s and cheap clones.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::config::IntakeConfig;
use crate::error::{IntakeError, Result};
use crate::extract::Extractor;
use crate::risk::RiskEngine;
use crate::session::{IntakeSession, SessionSnapshot, TurnOutcome};
use crate::storage::SessionStorage;

/// Builds fresh sessions from a shared configuration.
#[derive(Clone)]
pub struct SessionFactory {
    config: IntakeConfig,
    engine: RiskEngine,
    extractor: Extractor,
}

impl SessionFactory {
    pub fn new(config: IntakeConfig, engine: RiskEngine) -> Self {
        Self {
            config,
            engine,
            extractor: Extractor::new(),
        }
    }

    /// Factory whose engine is built from `config` alone.
    pub fn from_config(config: IntakeConfig) -> Result<Self> {
        config.validate()?;
        let engine = RiskEngine::from_config(&config);
        Ok(Self::new(config, engine))
    }

    pub fn with_extractor(mut self, extractor: Extractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &IntakeConfig {
        &self.config
    }

    pub fn create(&self, id: Option<String>) -> IntakeSession {
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        IntakeSession::new(id, &self.config, self.engine.clone())
            .with_extractor(self.extractor.clone())
    }
}

/// High-level helper that orchestrates the _load → process → keep_ pattern.
#[derive(Clone)]
pub struct IntakeRunner {
    factory: SessionFactory,
    storage: Arc<dyn SessionStorage>,
}

impl IntakeRunner {
    pub fn new(factory: SessionFactory, storage: Arc<dyn SessionStorage>) -> Self {
        Self { factory, storage }
    }

    /// Opens a new session and returns its greeting.
    pub async fn start(&self) -> Result<TurnOutcome> {
        let entry = self.storage.save(self.factory.create(None)).await?;
        let outcome = entry.lock().await.start()?;
        info!(session_id = %outcome.session_id, "created intake session");
        Ok(outcome)
    }

    /// Processes one message. A missing or unknown `session_id` creates a
    /// session under that id (or a fresh one).
    pub async fn run(&self, session_id: Option<&str>, content: &str) -> Result<TurnOutcome> {
        let entry = match session_id {
            Some(id) => match self.storage.get(id).await? {
                Some(entry) => entry,
                None => {
                    self.storage
                        .save(self.factory.create(Some(id.to_string())))
                        .await?
                }
            },
            None => self.storage.save(self.factory.create(None)).await?,
        };

        let mut session = entry.lock().await;
        session.handle_message(content).await
    }

    pub async fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot> {
        let entry = self
            .storage
            .get(session_id)
            .await?
            .ok_or_else(|| IntakeError::SessionNotFound(session_id.to_string()))?;
        let session = entry.lock().await;
        Ok(session.snapshot())
    }

    /// Closes and forgets a session, cancelling any in-flight computation.
    pub async fn close(&self, session_id: &str) -> Result<()> {
        if self.storage.delete(session_id).await? {
            Ok(())
        } else {
            Err(IntakeError::SessionNotFound(session_id.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemorySessionStorage;

    fn runner() -> IntakeRunner {
        let factory = SessionFactory::from_config(IntakeConfig::default()).unwrap();
        IntakeRunner::new(factory, Arc::new(InMemorySessionStorage::new()))
    }

    #[tokio::test]
    async fn test_run_creates_and_resumes_sessions() {
        let runner = runner();
        let first = runner.run(None, "I'm 45").await.unwrap();
        assert_eq!(first.captured.len(), 1);

        let second = runner.run(Some(first.session_id.as_str()), "female").await.unwrap();
        assert_eq!(second.session_id, first.session_id);

        let snapshot = runner.snapshot(&first.session_id).await.unwrap();
        assert_eq!(snapshot.record.age(), Some(45));
        assert_eq!(snapshot.conversation.len(), 4);
    }

    #[tokio::test]
    async fn test_start_then_close() {
        let runner = runner();
        let opening = runner.start().await.unwrap();
        assert!(!opening.is_complete);

        runner.close(&opening.session_id).await.unwrap();
        assert!(matches!(
            runner.snapshot(&opening.session_id).await,
            Err(IntakeError::SessionNotFound(_))
        ));
        assert!(matches!(
            runner.close(&opening.session_id).await,
            Err(IntakeError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_id_creates_session_under_that_id() {
        let runner = runner();
        let outcome = runner.run(Some("client-chosen"), "I'm 30").await.unwrap();
        assert_eq!(outcome.session_id, "client-chosen");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = IntakeConfig {
            history_window: 0,
            ..IntakeConfig::default()
        };
        assert!(matches!(
            SessionFactory::from_config(config),
            Err(IntakeError::Config(_))
        ));
    }
}
