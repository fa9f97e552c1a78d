//! Throttle configuration for the dispatcher.
//!
//! Defaults match the conservative messaging-platform budget: one call
//! per two-second window, with a 30 second cooldown when the server
//! reports a flood wait without suggesting a duration.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::Quota;
use serde::{Deserialize, Serialize};

use crate::error::{FloodgateError, Result};

/// Configuration for admission control and flood handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Maximum calls per window.
    #[serde(default = "default_calls")]
    pub calls: u32,

    /// Rolling window the call budget applies to.
    #[serde(default = "default_window")]
    pub window: Duration,

    /// Cooldown applied when a rate violation carries no retry-after.
    #[serde(default = "default_flood_cooldown")]
    pub flood_cooldown: Duration,
}

const fn default_calls() -> u32 {
    1
}

const fn default_window() -> Duration {
    Duration::from_secs(2)
}

const fn default_flood_cooldown() -> Duration {
    Duration::from_secs(30)
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            calls: default_calls(),
            window: default_window(),
            flood_cooldown: default_flood_cooldown(),
        }
    }
}

impl ThrottleConfig {
    /// Create a config with custom values.
    pub fn new(calls: u32, window: Duration, flood_cooldown: Duration) -> Self {
        Self {
            calls,
            window,
            flood_cooldown,
        }
    }

    /// Convert to a token bucket quota: `calls` tokens per `window`,
    /// replenished evenly across the window.
    pub fn quota(&self) -> Result<Quota> {
        let calls = NonZeroU32::new(self.calls)
            .ok_or_else(|| FloodgateError::Config("calls must be at least 1".to_string()))?;

        if self.window.is_zero() {
            return Err(FloodgateError::Config("window must be non-zero".to_string()));
        }

        let period = self.window / self.calls;
        let quota = Quota::with_period(period)
            .ok_or_else(|| FloodgateError::Config("window too small for call count".to_string()))?
            .allow_burst(calls);

        Ok(quota)
    }
}
