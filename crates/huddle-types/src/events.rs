use serde::{Deserialize, Serialize};

use crate::models::ChatMessage;

/// Events pushed over a live channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// A message was persisted
    NewMessage { message: ChatMessage },

    /// An administrator cleared (part of) the history; clients should reset
    MessagesCleared,

    /// Liveness acknowledgment, sent in reply to any inbound frame
    Pong,
}

impl GatewayEvent {
    pub fn to_json(&self) -> String {
        // A unit/struct-variant enum of plain strings cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}
