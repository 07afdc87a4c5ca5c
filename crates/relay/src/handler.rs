//! Burst processing: respond to the coalesced text and deliver the reply

use crate::payload::ConversationContext;
use crate::pipeline::{ModelRequest, Pipeline};
use crate::profile::AgentProfile;
use crate::responder::{AgentReply, DeliveryStatus, Deliverer, OutgoingMessage, Responder};
use crate::Result;
use anyhow::Context;
use debounce::Burst;
use std::sync::Arc;
use tracing::{info, warn};

/// What one fired burst produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingResult {
    pub reply: AgentReply,
    pub delivery: DeliveryStatus,
}

impl ProcessingResult {
    pub fn should_escalate(&self) -> bool {
        self.reply.should_escalate
    }
}

/// Runs a fired burst through the pipeline, responder and deliverer
pub struct MessageHandler {
    profile: AgentProfile,
    pipeline: Pipeline,
    responder: Arc<dyn Responder>,
    deliverer: Arc<dyn Deliverer>,
}

impl MessageHandler {
    /// Handler whose pipeline is derived from `profile`
    pub fn new(
        profile: AgentProfile,
        responder: Arc<dyn Responder>,
        deliverer: Arc<dyn Deliverer>,
    ) -> Self {
        let pipeline = Pipeline::for_profile(&profile);
        Self::with_pipeline(profile, pipeline, responder, deliverer)
    }

    pub fn with_pipeline(
        profile: AgentProfile,
        pipeline: Pipeline,
        responder: Arc<dyn Responder>,
        deliverer: Arc<dyn Deliverer>,
    ) -> Self {
        Self {
            profile,
            pipeline,
            responder,
            deliverer,
        }
    }

    /// Process one coalesced burst
    pub async fn process(&self, burst: Burst<ConversationContext>) -> Result<ProcessingResult> {
        info!(
            "Processing debounced message from {} ({} events): {}",
            burst.key,
            burst.events.len(),
            burst.combined
        );

        let request = ModelRequest::for_burst(&burst.key, &burst.combined, &self.profile);
        let request = self.pipeline.run(request);

        let reply = self
            .responder
            .respond(request)
            .await
            .with_context(|| format!("Failed to generate reply for {}", burst.key))?;

        let delivery = self
            .deliverer
            .deliver(OutgoingMessage {
                user_email: burst.context.user_email.clone(),
                conversation_id: burst.key.clone(),
                message: reply.message.clone(),
            })
            .await
            .with_context(|| format!("Failed to deliver reply to {}", burst.key))?;

        if delivery.success {
            info!("Reply sent to {}", burst.key);
        } else {
            warn!(
                "Failed to send reply to {} (status: {})",
                burst.key, delivery.status_code
            );
        }

        if reply.should_escalate {
            warn!(
                "Escalation needed for {} (contact: {}, container: {})",
                burst.key, burst.context.contact_id, burst.context.assigned_container
            );
        }

        Ok(ProcessingResult { reply, delivery })
    }
}

impl std::fmt::Debug for MessageHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageHandler")
            .field("profile", &self.profile)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}
