//! Session events published over a broadcast channel, so any number of
//! consumers can follow record changes without the session knowing them.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::record::{FieldId, FieldValue};
use crate::risk::RiskAssessment;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntakeEvent {
    FieldCaptured {
        session_id: String,
        field: FieldId,
        value: FieldValue,
        /// Index of the user message the value came from.
        message_index: usize,
    },
    RiskUpdated {
        session_id: String,
        assessment: RiskAssessment,
    },
    Completed {
        session_id: String,
    },
}

impl IntakeEvent {
    pub fn session_id(&self) -> &str {
        match self {
            IntakeEvent::FieldCaptured { session_id, .. }
            | IntakeEvent::RiskUpdated { session_id, .. }
            | IntakeEvent::Completed { session_id } => session_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<IntakeEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IntakeEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publishes to current subscribers. Having none is not an error.
    pub fn publish(&self, event: IntakeEvent) {
        match self.sender.send(event) {
            Ok(receivers) => trace!(receivers, "published intake event"),
            Err(_) => trace!("no subscribers for intake event"),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_EVENT_CAPACITY)
    }
}
