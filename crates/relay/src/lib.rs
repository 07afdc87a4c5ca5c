//! Conversation relay
//!
//! Receives chat webhook payloads, coalesces rapid messages from the same
//! sender into one burst and answers the burst once.
//!
//! This crate provides:
//! - Webhook payload models and per-conversation context
//! - Agent profile and the request pipeline in front of the responder
//! - Responder and deliverer seams with in-memory implementations
//! - The message handler run for every fired burst
//! - The [`Relay`] service (async and sync intake, health, shutdown)
//! - Configuration loading

pub mod config;
pub mod handler;
pub mod payload;
pub mod pipeline;
pub mod profile;
pub mod responder;
pub mod service;

pub use config::{EnvSource, RelayConfig, StdEnvSource};
pub use handler::{MessageHandler, ProcessingResult};
pub use payload::{ConversationContext, Message, WebhookPayload};
pub use pipeline::{ModelRequest, PersonalityStage, Pipeline, Stage};
pub use profile::{AgentProfile, BantQuestions};
pub use responder::{
    AgentReply, Deliverer, DeliveryStatus, EchoResponder, OutgoingMessage, RecordingDeliverer,
    Responder,
};
pub use service::{Escalation, Health, PendingReply, Relay, ResponseStatus, WebhookResponse};

pub type Result<T> = anyhow::Result<T>;
