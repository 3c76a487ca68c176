use std::time::Duration;

use thiserror::Error;

/// Errors produced by the intake engine.
///
/// `Transport`, `Timeout` and `SchemaParse` are only ever raised below the
/// risk scoring boundary; [`crate::risk::DelegatedScorer`] converts them into a
/// degraded assessment before anything above it can observe them.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session closed: {0}")]
    SessionClosed(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Reasoning service transport failed: {0}")]
    Transport(String),

    #[error("Reasoning service timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed assessment response: {0}")]
    SchemaParse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IntakeError {
    /// True for failures the delegated scorer absorbs into a fallback.
    pub fn is_scoring_failure(&self) -> bool {
        matches!(
            self,
            IntakeError::Transport(_)
                | IntakeError::Timeout(_)
                | IntakeError::SchemaParse(_)
                | IntakeError::Serialization(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, IntakeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoring_failures() {
        assert!(IntakeError::Transport("refused".to_string()).is_scoring_failure());
        assert!(IntakeError::Timeout(Duration::from_secs(30)).is_scoring_failure());
        assert!(IntakeError::SchemaParse("no riskPercentage".to_string()).is_scoring_failure());
        assert!(!IntakeError::SessionClosed("a".to_string()).is_scoring_failure());
        assert!(!IntakeError::Other(anyhow::anyhow!("boom")).is_scoring_failure());
    }
}
