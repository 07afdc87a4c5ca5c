//! Outbound seams: the reply generator and the message delivery channel
//!
//! Both are traits so the relay can run against a language model and a
//! messaging API in production and against in-memory doubles in tests.

use crate::pipeline::ModelRequest;
use crate::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Reply produced for one burst
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentReply {
    pub message: String,
    /// A human should take over the conversation
    #[serde(default)]
    pub should_escalate: bool,
}

/// Message handed to the delivery channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub user_email: String,
    pub conversation_id: String,
    pub message: String,
}

/// Outcome reported by the delivery channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStatus {
    pub success: bool,
    pub status_code: u16,
}

impl DeliveryStatus {
    pub fn ok() -> Self {
        Self {
            success: true,
            status_code: 200,
        }
    }

    pub fn failed(status_code: u16) -> Self {
        Self {
            success: false,
            status_code,
        }
    }
}

/// Generates the reply for a coalesced burst
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, request: ModelRequest) -> Result<AgentReply>;
}

/// Sends a reply back to the conversation
#[async_trait]
pub trait Deliverer: Send + Sync {
    async fn deliver(&self, message: OutgoingMessage) -> Result<DeliveryStatus>;
}

/// Phrases that ask for a human, matched case-insensitively
const ESCALATION_PHRASES: &[&str] = &[
    "human",
    "call me",
    "phone call",
    "hablar con alguien",
    "llámame",
    "llamame",
    "necesito una llamada",
];

/// Local responder that echoes the combined text back
///
/// Escalates when the user asks for a person or a call. Used by `relayctl`
/// and tests.
#[derive(Debug, Default, Clone)]
pub struct EchoResponder;

#[async_trait]
impl Responder for EchoResponder {
    async fn respond(&self, request: ModelRequest) -> Result<AgentReply> {
        let lowered = request.user_text.to_lowercase();
        let should_escalate = ESCALATION_PHRASES
            .iter()
            .any(|phrase| lowered.contains(phrase));

        Ok(AgentReply {
            message: format!("Received: {}", request.user_text),
            should_escalate,
        })
    }
}

/// Deliverer that keeps every message in memory
///
/// Reports the configured status for each delivery.
#[derive(Debug)]
pub struct RecordingDeliverer {
    status: DeliveryStatus,
    sent: Mutex<Vec<OutgoingMessage>>,
}

impl RecordingDeliverer {
    pub fn new() -> Self {
        Self::with_status(DeliveryStatus::ok())
    }

    /// Deliverer that answers every delivery with `status`
    pub fn with_status(status: DeliveryStatus) -> Self {
        Self {
            status,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Messages delivered so far, oldest first
    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().clone()
    }
}

impl Default for RecordingDeliverer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Deliverer for RecordingDeliverer {
    async fn deliver(&self, message: OutgoingMessage) -> Result<DeliveryStatus> {
        self.sent.lock().push(message);
        Ok(self.status)
    }
}
