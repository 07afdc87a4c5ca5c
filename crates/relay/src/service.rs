//! Relay service facade
//!
//! Accepts webhook payloads, debounces them per sender and hands every burst
//! to the [`MessageHandler`]. Two intake modes are offered:
//!
//! - [`Relay::receive`] queues the message and answers right away
//! - [`Relay::receive_sync`] waits until the caller's message is either
//!   processed or taken over by a newer one; [`Relay::receive_waiting`] is
//!   the same split into accept and wait

use crate::config::RelayConfig;
use crate::handler::{MessageHandler, ProcessingResult};
use crate::payload::{ConversationContext, WebhookPayload};
use crate::responder::{Deliverer, Responder};
use crate::Result;
use anyhow::Context;
use debounce::{Burst, DebounceError, Debouncer, DebouncerBuilder, WaitOutcome, WaitTicket};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Service name reported by [`Relay::health`]
pub const SERVICE_NAME: &str = "conversation-relay";

/// Status field of a [`WebhookResponse`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// Message queued, the burst has not fired yet
    Debouncing,
    /// Payload carried no message from the user
    NoUserMessage,
    /// A newer message from the same sender took over
    Superseded,
    /// The burst was discarded before firing
    Cancelled,
    /// Reply generated and delivered
    Success,
    /// Reply generation or delivery failed
    Error,
}

/// Escalation details attached to a synchronous response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escalation {
    pub reason: String,
    pub contact: String,
}

impl Escalation {
    fn human_requested(contact: &str) -> Self {
        Self {
            reason: "User requested human assistance".to_string(),
            contact: contact.to_string(),
        }
    }
}

/// Answer to a webhook call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_sent: Option<String>,
    /// Status code reported by the delivery channel
    #[serde(
        default,
        rename = "whatsapp_api_status",
        skip_serializing_if = "Option::is_none"
    )]
    pub delivery_status: Option<u16>,
    #[serde(default)]
    pub should_escalate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation: Option<Escalation>,
}

impl WebhookResponse {
    fn with_status(status: ResponseStatus) -> Self {
        Self {
            status,
            message: None,
            phone_number: None,
            pending_count: None,
            message_sent: None,
            delivery_status: None,
            should_escalate: false,
            escalation: None,
        }
    }

    fn no_user_message() -> Self {
        Self::with_status(ResponseStatus::NoUserMessage)
    }

    fn processed(phone_number: &str, result: ProcessingResult) -> Self {
        let status = if result.delivery.success {
            ResponseStatus::Success
        } else {
            ResponseStatus::Error
        };
        let should_escalate = result.should_escalate();

        Self {
            phone_number: Some(phone_number.to_string()),
            message_sent: Some(result.reply.message),
            delivery_status: Some(result.delivery.status_code),
            should_escalate,
            escalation: should_escalate.then(|| Escalation::human_requested(phone_number)),
            ..Self::with_status(status)
        }
    }
}

/// Accepted message whose outcome is not known yet
#[derive(Debug)]
pub struct PendingReply {
    phone_number: String,
    ticket: Option<WaitTicket<ProcessingResult>>,
}

impl PendingReply {
    /// Sender the message came from
    pub fn phone_number(&self) -> &str {
        &self.phone_number
    }

    /// Wait until the message is processed, superseded or cancelled
    pub async fn wait(self) -> Result<WebhookResponse> {
        let Some(ticket) = self.ticket else {
            return Ok(WebhookResponse::no_user_message());
        };
        let phone_number = Some(self.phone_number.clone());

        let response = match ticket.wait().await {
            Ok(WaitOutcome::Fired(result)) => {
                WebhookResponse::processed(&self.phone_number, result)
            }
            Ok(WaitOutcome::Superseded) => WebhookResponse {
                phone_number,
                ..WebhookResponse::with_status(ResponseStatus::Superseded)
            },
            Ok(WaitOutcome::Cancelled) => WebhookResponse {
                phone_number,
                ..WebhookResponse::with_status(ResponseStatus::Cancelled)
            },
            Err(err @ (DebounceError::Processing(_) | DebounceError::Panicked(_))) => {
                WebhookResponse {
                    message: Some(err.to_string()),
                    phone_number,
                    ..WebhookResponse::with_status(ResponseStatus::Error)
                }
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("Lost the outcome of the message from {}", self.phone_number)
                })
            }
        };
        Ok(response)
    }
}

/// Liveness report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub service: String,
    pub version: String,
    pub debounce_delay_secs: f64,
    pub pending_messages: usize,
    /// Bursts whose reply is being generated or delivered
    pub processing: usize,
}

/// The conversation relay
///
/// Cheap to clone; clones share the pending bursts.
#[derive(Clone)]
pub struct Relay {
    debouncer: Debouncer<ConversationContext, ProcessingResult>,
    handler: Arc<MessageHandler>,
    delay: Duration,
}

impl Relay {
    /// Build a relay from configuration and the outbound seams
    pub fn new(
        config: &RelayConfig,
        responder: Arc<dyn Responder>,
        deliverer: Arc<dyn Deliverer>,
    ) -> Self {
        let handler = MessageHandler::new(config.agent.clone(), responder, deliverer);
        let debouncer = DebouncerBuilder::from_config(&config.debounce).build();
        Self::with_handler(debouncer, handler, config.debounce.delay())
    }

    /// Build a relay around an existing debouncer and handler
    pub fn with_handler(
        debouncer: Debouncer<ConversationContext, ProcessingResult>,
        handler: MessageHandler,
        delay: Duration,
    ) -> Self {
        info!("Conversation relay ready (debounce delay: {:?})", delay);
        Self {
            debouncer,
            handler: Arc::new(handler),
            delay,
        }
    }

    /// Queue the latest user message and return immediately
    pub fn receive(&self, payload: &WebhookPayload) -> Result<WebhookResponse> {
        let Some(last) = payload.last_user_message() else {
            debug!("Ignoring payload from {} without user message", payload.from);
            return Ok(WebhookResponse::no_user_message());
        };
        let phone_number = payload.conversation_id();
        info!("Message from {}: {}", phone_number, last.body);

        self.debouncer
            .submit(
                phone_number,
                last.body.as_str(),
                payload.context(),
                self.delay,
                self.callback(),
            )
            .with_context(|| format!("Failed to queue message from {}", phone_number))?;

        Ok(WebhookResponse {
            message: Some("Message received, waiting for more messages...".to_string()),
            phone_number: Some(phone_number.to_string()),
            pending_count: Some(self.debouncer.pending_count()),
            ..WebhookResponse::with_status(ResponseStatus::Debouncing)
        })
    }

    /// Queue the latest user message and wait for its outcome
    pub async fn receive_sync(&self, payload: &WebhookPayload) -> Result<WebhookResponse> {
        self.receive_waiting(payload)?.wait().await
    }

    /// Queue the latest user message now and wait for its outcome later
    ///
    /// The message is accepted before this returns, so calls made one after
    /// another are coalesced in call order.
    pub fn receive_waiting(&self, payload: &WebhookPayload) -> Result<PendingReply> {
        let Some(last) = payload.last_user_message() else {
            debug!("Ignoring payload from {} without user message", payload.from);
            return Ok(PendingReply {
                phone_number: payload.from.clone(),
                ticket: None,
            });
        };
        let phone_number = payload.conversation_id();
        info!("[sync] Message from {}: {}", phone_number, last.body);

        let ticket = self
            .debouncer
            .submit_waiting(
                phone_number,
                last.body.as_str(),
                payload.context(),
                self.delay,
                self.callback(),
            )
            .with_context(|| format!("Failed to queue message from {}", phone_number))?;

        Ok(PendingReply {
            phone_number: phone_number.to_string(),
            ticket: Some(ticket),
        })
    }

    /// Liveness and load report
    pub fn health(&self) -> Health {
        Health {
            status: "ok".to_string(),
            service: SERVICE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            debounce_delay_secs: self.delay.as_secs_f64(),
            pending_messages: self.debouncer.pending_count(),
            processing: self.debouncer.in_flight(),
        }
    }

    /// Senders with a burst waiting to fire
    pub fn pending_conversations(&self) -> Vec<String> {
        self.debouncer.pending_keys()
    }

    /// Stop intake and discard every pending burst
    pub fn shutdown(&self) -> usize {
        info!("Shutting down conversation relay");
        self.debouncer.cancel_all()
    }

    fn callback(
        &self,
    ) -> impl FnOnce(Burst<ConversationContext>) -> BoxFuture<'static, Result<ProcessingResult>>
           + Send
           + Sync
           + 'static {
        let handler = Arc::clone(&self.handler);
        move |burst: Burst<ConversationContext>| -> BoxFuture<'static, Result<ProcessingResult>> {
            Box::pin(async move { handler.process(burst).await })
        }
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("delay", &self.delay)
            .field("debouncer", &self.debouncer)
            .field("handler", &self.handler)
            .finish()
    }
}
