//! Debounce configuration

use crate::coalesce::JoinWith;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound accepted for `delay_ms` (10 minutes)
pub const MAX_DELAY_MS: u64 = 10 * 60 * 1000;

/// Debounce settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    /// Quiet period after the last event before a burst fires (default: 7s)
    pub delay_ms: u64,

    /// Separator placed between coalesced events (default: single space)
    pub separator: String,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            delay_ms: 7_000,
            separator: " ".to_string(),
        }
    }
}

impl DebounceConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Combiner joining events with the configured separator
    pub fn combiner(&self) -> JoinWith {
        JoinWith::new(self.separator.clone())
    }

    /// Check that the delay is usable
    ///
    /// A zero delay would fire every event on its own.
    pub fn validate(&self) -> Result<(), String> {
        if self.delay_ms == 0 || self.delay_ms > MAX_DELAY_MS {
            return Err(format!(
                "debounce.delay_ms must be between 1 and {} (got {})",
                MAX_DELAY_MS, self.delay_ms
            ));
        }
        Ok(())
    }
}
