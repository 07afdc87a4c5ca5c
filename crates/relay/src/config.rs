//! Relay configuration
//!
//! Sources, highest priority first:
//! 1. Environment variables (`RELAY_*`)
//! 2. Explicit config file (`--config`)
//! 3. `./relay.toml` in the working directory
//! 4. Built-in defaults

use crate::profile::AgentProfile;
use crate::Result;
use anyhow::{bail, Context};
use debounce::DebounceConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Prefix shared by every environment override
pub const ENV_PREFIX: &str = "RELAY_";

/// Config file picked up from the working directory
pub const DEFAULT_CONFIG_FILE: &str = "./relay.toml";

/// Complete relay configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub debounce: DebounceConfig,
    pub agent: AgentProfile,
}

/// Read access to override variables
pub trait EnvSource {
    /// Value of `RELAY_<key>`, if set
    fn get(&self, key: &str) -> Option<String>;
}

/// Process environment
pub struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }
}

impl RelayConfig {
    /// Load from the standard sources
    ///
    /// A missing explicit file is an error; a missing `./relay.toml` is not.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, &StdEnvSource)
    }

    /// Same as [`RelayConfig::load`] with a custom environment
    pub fn load_with_env(path: Option<&Path>, env: &dyn EnvSource) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file without applying overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: RelayConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply `RELAY_*` variables on top of the current values
    pub fn apply_env_overrides(&mut self, env: &dyn EnvSource) -> Result<()> {
        if let Some(value) = env.get("DEBOUNCE_DELAY_MS") {
            self.debounce.delay_ms = value.trim().parse().with_context(|| {
                format!("Invalid {}DEBOUNCE_DELAY_MS: {}", ENV_PREFIX, value)
            })?;
        }
        if let Some(value) = env.get("DEBOUNCE_SEPARATOR") {
            self.debounce.separator = value;
        }
        if let Some(value) = env.get("AGENT_NAME") {
            self.agent.agent_name = value;
        }
        if let Some(value) = env.get("COMPANY") {
            self.agent.company = value;
        }
        if let Some(value) = env.get("PERSONALITY") {
            self.agent.personality = value;
        }
        if let Some(value) = env.get("PERSONALITY_OVERRIDE") {
            self.agent.personality_override = Some(value).filter(|value| !value.is_empty());
        }
        if let Some(value) = env.get("CONVERSATION_EXAMPLES") {
            self.agent.conversation_examples = value;
        }

        let bant = &mut self.agent.bant_questions;
        for (key, field) in [
            ("BANT_NEED", &mut bant.need),
            ("BANT_TIMELINE", &mut bant.timeline),
            ("BANT_BUDGET", &mut bant.budget),
            ("BANT_AUTHORITY", &mut bant.authority),
        ] {
            if let Some(value) = env.get(key) {
                *field = value;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if let Err(msg) = self.debounce.validate() {
            bail!(msg);
        }
        if self.agent.agent_name.trim().is_empty() {
            bail!("agent.agent_name must not be empty");
        }
        Ok(())
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}
