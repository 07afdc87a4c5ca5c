//! Inbound webhook payloads and the per-conversation context derived from them

use serde::{Deserialize, Serialize};

/// One message of a chat conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub body: String,
    /// `true` for messages sent by the business side
    pub from_me: bool,
    /// Unix timestamp (seconds)
    pub timestamp: i64,
}

/// Payload posted by the messaging gateway for every inbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub chat_bot_id: String,
    pub user_email: String,
    pub client_number: String,
    /// Sender phone number, used as the conversation key
    pub from: String,
    pub contact_id: String,
    pub assigned_container: String,
    pub conversation: Vec<Message>,
}

impl WebhookPayload {
    /// Parse a payload from its JSON wire form
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Latest message written by the end user, if any
    ///
    /// The gateway sends the whole conversation; only the newest user
    /// message is new information.
    pub fn last_user_message(&self) -> Option<&Message> {
        self.conversation.iter().rev().find(|message| !message.from_me)
    }

    /// Conversation key for debouncing
    pub fn conversation_id(&self) -> &str {
        &self.from
    }

    /// Routing metadata carried alongside the message
    pub fn context(&self) -> ConversationContext {
        ConversationContext {
            user_email: self.user_email.clone(),
            contact_id: self.contact_id.clone(),
            assigned_container: self.assigned_container.clone(),
        }
    }
}

/// Per-conversation routing data
///
/// Replaced by the latest payload's values on every message of a burst.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationContext {
    /// Account the outbound reply is sent from
    pub user_email: String,
    pub contact_id: String,
    pub assigned_container: String,
}
