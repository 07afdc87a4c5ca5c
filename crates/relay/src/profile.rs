//! Agent profile
//!
//! Identity of the agent replying on behalf of the business. Passed
//! explicitly to every request instead of living in shared mutable state.

use serde::{Deserialize, Serialize};

/// Situations the agent hands over to a person instead of answering
const ESCALATION_CRITERIA: &[&str] = &[
    "The client asks to talk to a person",
    "The client wants a phone or video call",
    "The client asks for direct contact details",
    "Legal questions or complex financing questions",
    "The client is upset or files a complaint",
    "Anything else that needs a human decision",
];

/// Topics the agent covers to qualify a lead (need, timeline, budget,
/// authority)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BantQuestions {
    pub need: String,
    pub timeline: String,
    pub budget: String,
    pub authority: String,
}

impl Default for BantQuestions {
    fn default() -> Self {
        Self {
            need: "what they need".to_string(),
            timeline: "when they need it".to_string(),
            budget: "their budget".to_string(),
            authority: "who decides".to_string(),
        }
    }
}

/// Who the agent is and how it should sound
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentProfile {
    pub agent_name: String,
    pub company: String,
    pub personality: String,
    /// Extra personality directive injected in front of the system
    /// instruction (set per deployment, e.g. for an A/B test)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personality_override: Option<String>,
    /// Free-form guidance on conversation style
    pub conversation_examples: String,
    pub bant_questions: BantQuestions,
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self {
            agent_name: "Agente".to_string(),
            company: "Inmobiliaria".to_string(),
            personality: "Professional and helpful".to_string(),
            personality_override: None,
            conversation_examples: "Follow natural conversation patterns.".to_string(),
            bant_questions: BantQuestions::default(),
        }
    }
}

impl AgentProfile {
    /// Base system instruction for the responder
    pub fn system_instruction(&self) -> String {
        let bant = &self.bant_questions;
        let mut out = format!(
            "You are {}, a real estate advisor for {}.\nPersonality: {}\n",
            self.agent_name, self.company, self.personality
        );

        out.push_str("\nQualification, one topic at a time:\n");
        out.push_str(&format!("1. Greet the client and introduce yourself as {}\n", self.agent_name));
        out.push_str(&format!("2. Need: find out {}\n", bant.need));
        out.push_str(&format!("3. Timeline: find out {}\n", bant.timeline));
        out.push_str(&format!("4. Budget: find out {}\n", bant.budget));
        out.push_str(&format!("5. Authority: find out {}\n", bant.authority));
        out.push_str("6. Close by agreeing on a next step\n");

        out.push_str(&format!("\nStyle:\n{}\n", self.conversation_examples));

        out.push_str("\nEscalate to a human when:\n");
        for criterion in ESCALATION_CRITERIA {
            out.push_str(&format!("- {}\n", criterion));
        }
        out
    }
}
