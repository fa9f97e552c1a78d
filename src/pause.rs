//! Flood-wait pause state for coordinated backoff.
//!
//! When the messaging API reports a flood wait, the dispatcher must
//! stop all outgoing calls until the server-imposed cooldown passes.
//! This module provides the shared pause deadline for that.

use std::time::{Duration, Instant};

/// Global pause state shared between the dispatcher and observers.
#[derive(Debug)]
pub struct PauseState {
    /// When dispatch may resume (None = not paused).
    pub paused_until: Option<Instant>,
    /// Total rate violations observed since construction.
    pub violations: u64,
    /// Last successful call time.
    pub last_success: Option<Instant>,
}

impl PauseState {
    /// Create a new, unpaused state.
    pub fn new() -> Self {
        Self {
            paused_until: None,
            violations: 0,
            last_success: None,
        }
    }

    /// Check if dispatch is currently paused.
    pub fn is_paused(&self) -> bool {
        self.paused_until.map(|until| Instant::now() < until).unwrap_or(false)
    }

    /// Get remaining pause duration if paused.
    pub fn remaining(&self) -> Option<Duration> {
        self.paused_until.and_then(|until| {
            let now = Instant::now();
            if now < until { Some(until - now) } else { None }
        })
    }

    /// Record a server-reported rate violation.
    ///
    /// The new deadline is the max of the current deadline and
    /// `now + cooldown`: overlapping violations only ever extend the
    /// pause, never shorten it.
    pub fn record_violation(&mut self, cooldown: Duration) {
        self.violations += 1;

        let proposed = Instant::now() + cooldown;
        self.paused_until = Some(match self.paused_until {
            Some(current) => current.max(proposed),
            None => proposed,
        });

        tracing::warn!(
            cooldown_secs = cooldown.as_secs_f64(),
            violations = self.violations,
            "Rate violation reported, pausing all dispatch"
        );
    }

    /// Record a successful call.
    pub fn record_success(&mut self) {
        self.last_success = Some(Instant::now());
    }

    /// Clear the pause deadline.
    pub fn clear(&mut self) {
        self.paused_until = None;
        // Keep the violation count for metrics
    }

    /// Get time since last successful call.
    pub fn time_since_success(&self) -> Option<Duration> {
        self.last_success.map(|t| t.elapsed())
    }
}

impl Default for PauseState {
    fn default() -> Self {
        Self::new()
    }
}
