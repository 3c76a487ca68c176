//! Engine configuration. The library never reads the environment itself;
//! binaries build an [`IntakeConfig`] (usually via [`IntakeConfig::from_env`])
//! and inject it.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{IntakeError, Result};
use crate::risk::{AssessmentVariant, ScoringWeights};

pub const DEFAULT_RISK_THRESHOLD: usize = 3;
pub const DEFAULT_HISTORY_WINDOW: usize = 8;
pub const MAX_HISTORY_WINDOW: usize = 20;
pub const DEFAULT_EVENT_CAPACITY: usize = 64;
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";
pub const DEFAULT_SCORER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// Newly answered fields that trigger a risk recomputation.
    pub risk_threshold: usize,
    /// Trailing conversation messages sent to the reasoning service.
    pub history_window: usize,
    /// Buffer size of each session's event channel.
    pub event_capacity: usize,
    pub weights: ScoringWeights,
    /// Delegated scoring; `None` keeps the deterministic scorer.
    pub reasoning: Option<ReasoningConfig>,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            risk_threshold: DEFAULT_RISK_THRESHOLD,
            history_window: DEFAULT_HISTORY_WINDOW,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            weights: ScoringWeights::default(),
            reasoning: None,
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct ReasoningConfig {
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub variant: AssessmentVariant,
}

impl ReasoningConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            variant: AssessmentVariant::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_variant(mut self, variant: AssessmentVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl fmt::Debug for ReasoningConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReasoningConfig")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("variant", &self.variant)
            .finish()
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_SCORER_TIMEOUT.as_secs()
}

impl IntakeConfig {
    /// Reads the configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(threshold) = parse_var(&lookup, "INTAKE_RISK_THRESHOLD")? {
            config.risk_threshold = threshold;
        }
        if let Some(window) = parse_var(&lookup, "INTAKE_HISTORY_WINDOW")? {
            config.history_window = window;
        }

        if let Some(api_key) = lookup("OPENROUTER_API_KEY").filter(|k| !k.trim().is_empty()) {
            let mut reasoning = ReasoningConfig::new(api_key);
            if let Some(model) = lookup("INTAKE_RISK_MODEL").filter(|m| !m.trim().is_empty()) {
                reasoning.model = model;
            }
            if let Some(secs) = parse_var(&lookup, "INTAKE_SCORER_TIMEOUT_SECS")? {
                reasoning.timeout_secs = secs;
            }
            config.reasoning = Some(reasoning);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.risk_threshold == 0 {
            return Err(IntakeError::Config(
                "risk_threshold must be at least 1".to_string(),
            ));
        }
        if !(1..=MAX_HISTORY_WINDOW).contains(&self.history_window) {
            return Err(IntakeError::Config(format!(
                "history_window must be between 1 and {MAX_HISTORY_WINDOW}, got {}",
                self.history_window
            )));
        }
        if self.event_capacity == 0 {
            return Err(IntakeError::Config(
                "event_capacity must be at least 1".to_string(),
            ));
        }
        if let Some(reasoning) = &self.reasoning {
            if reasoning.api_key.trim().is_empty() {
                return Err(IntakeError::Config("reasoning api_key is empty".to_string()));
            }
            if reasoning.timeout_secs == 0 {
                return Err(IntakeError::Config(
                    "reasoning timeout_secs must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| IntakeError::Config(format!("{key} is not a valid number: {raw}"))),
        None => Ok(None),
    }
}
