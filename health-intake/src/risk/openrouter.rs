use async_trait::async_trait;
use rig::{
    client::CompletionClient,
    completion::{Chat, Message},
    providers::openrouter,
};
use tracing::debug;

use super::{ReasoningRequest, ReasoningService};
use crate::config::ReasoningConfig;
use crate::error::{IntakeError, Result};
use crate::message::{ConversationMessage, MessageRole};

/// [`ReasoningService`] backed by an OpenRouter chat model through rig.
pub struct OpenRouterReasoning {
    client: openrouter::Client,
    model: String,
}

impl OpenRouterReasoning {
    pub fn new(config: &ReasoningConfig) -> Self {
        Self {
            client: openrouter::Client::new(&config.api_key),
            model: config.model.clone(),
        }
    }
}

pub fn to_rig_message(message: &ConversationMessage) -> Message {
    match message.role {
        MessageRole::User => Message::user(message.text.clone()),
        MessageRole::Assistant => Message::assistant(message.text.clone()),
    }
}

#[async_trait]
impl ReasoningService for OpenRouterReasoning {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn complete(&self, request: ReasoningRequest) -> Result<String> {
        let agent = self
            .client
            .agent(&self.model)
            .preamble(&request.system_prompt)
            .build();
        let history: Vec<Message> = request.history.iter().map(to_rig_message).collect();

        debug!(model = %self.model, history = history.len(), "calling reasoning model");
        agent
            .chat(&request.prompt, history)
            .await
            .map_err(|e| IntakeError::Transport(format!("LLM chat failed: {e}")))
    }
}
