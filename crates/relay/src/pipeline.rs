//! Request pipeline in front of the responder
//!
//! Each [`Stage`] receives a [`ModelRequest`] and returns it, either unchanged
//! or rewritten. Stages run in insertion order.

use crate::profile::AgentProfile;
use serde::{Deserialize, Serialize};

/// Request sent to the responder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRequest {
    /// Conversation the request belongs to
    pub conversation_id: String,
    /// System instruction, if the responder uses one
    pub system_instruction: Option<String>,
    /// Combined user text of the burst
    pub user_text: String,
}

impl ModelRequest {
    /// Build the base request for a burst from the agent profile
    pub fn for_burst(conversation_id: &str, user_text: &str, profile: &AgentProfile) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            system_instruction: Some(profile.system_instruction()),
            user_text: user_text.to_string(),
        }
    }
}

/// One transformation step
pub trait Stage: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    fn apply(&self, request: ModelRequest) -> ModelRequest;
}

/// Ordered list of stages
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage
    pub fn with_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Pipeline used by the relay for a given profile
    pub fn for_profile(profile: &AgentProfile) -> Self {
        let pipeline = Self::new();
        match &profile.personality_override {
            Some(personality) => pipeline.with_stage(PersonalityStage::new(personality.clone())),
            None => pipeline,
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage in order
    pub fn run(&self, request: ModelRequest) -> ModelRequest {
        self.stages.iter().fold(request, |request, stage| {
            tracing::trace!("Applying pipeline stage '{}'", stage.name());
            stage.apply(request)
        })
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.stages.iter().map(|stage| stage.name()))
            .finish()
    }
}

/// Prefix the system instruction with a personality directive
///
/// Requests without a system instruction pass through unchanged.
#[derive(Debug, Clone)]
pub struct PersonalityStage {
    personality: String,
}

impl PersonalityStage {
    pub fn new(personality: impl Into<String>) -> Self {
        Self {
            personality: personality.into(),
        }
    }
}

impl Stage for PersonalityStage {
    fn name(&self) -> &str {
        "personality"
    }

    fn apply(&self, mut request: ModelRequest) -> ModelRequest {
        if self.personality.is_empty() {
            return request;
        }
        if let Some(instruction) = request.system_instruction.take() {
            request.system_instruction =
                Some(format!("PERSONALITY: {}\n\n{}", self.personality, instruction));
        }
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(instruction: Option<&str>) -> ModelRequest {
        ModelRequest {
            conversation_id: "+1555".into(),
            system_instruction: instruction.map(str::to_string),
            user_text: "hello".into(),
        }
    }

    struct Shout;

    impl Stage for Shout {
        fn name(&self) -> &str {
            "shout"
        }

        fn apply(&self, mut request: ModelRequest) -> ModelRequest {
            request.user_text = request.user_text.to_uppercase();
            request
        }
    }

    #[test]
    fn test_personality_prefixes_existing_instruction() {
        let stage = PersonalityStage::new("Warm and concise");
        let out = stage.apply(request(Some("You are Franco.")));
        assert_eq!(
            out.system_instruction.as_deref(),
            Some("PERSONALITY: Warm and concise\n\nYou are Franco.")
        );
        assert_eq!(out.user_text, "hello");
    }

    #[test]
    fn test_personality_without_instruction_is_passthrough() {
        let stage = PersonalityStage::new("Warm");
        assert_eq!(stage.apply(request(None)), request(None));
    }

    #[test]
    fn test_empty_personality_is_passthrough() {
        let stage = PersonalityStage::new("");
        assert_eq!(stage.apply(request(Some("base"))), request(Some("base")));
    }

    #[test]
    fn test_stages_run_in_order() {
        let pipeline = Pipeline::new()
            .with_stage(Shout)
            .with_stage(PersonalityStage::new("Calm"));
        assert_eq!(pipeline.len(), 2);
        assert_eq!(format!("{:?}", pipeline), r#"["shout", "personality"]"#);

        let out = pipeline.run(request(Some("base")));
        assert_eq!(out.user_text, "HELLO");
        assert_eq!(out.system_instruction.as_deref(), Some("PERSONALITY: Calm\n\nbase"));
    }

    #[test]
    fn test_empty_pipeline_returns_request_unchanged() {
        let pipeline = Pipeline::new();
        assert!(pipeline.is_empty());
        assert_eq!(pipeline.run(request(Some("x"))), request(Some("x")));
    }

    #[test]
    fn test_profile_pipeline_only_adds_personality_when_overridden() {
        let profile = AgentProfile::default();
        assert!(Pipeline::for_profile(&profile).is_empty());

        let profile = AgentProfile {
            personality_override: Some("Playful".into()),
            ..AgentProfile::default()
        };
        let out = Pipeline::for_profile(&profile)
            .run(ModelRequest::for_burst("+1", "hi", &profile));
        assert!(out
            .system_instruction
            .unwrap()
            .starts_with("PERSONALITY: Playful\n\n"));
    }
}
