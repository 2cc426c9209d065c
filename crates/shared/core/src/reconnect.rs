//! Reconnection backoff policy
//!
//! Exponential backoff with symmetric jitter, shared by the FIX session
//! engine and the connection pool:
//!
//! ```text
//! delay = min(initial × multiplier^attempt, max) × (1 ± jitter%)
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reconnection strategy for a session or connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Whether unexpected disconnects trigger automatic reconnection
    pub enabled: bool,
    /// Attempts before giving up (terminal failure)
    pub max_attempts: u32,
    /// Delay before the first attempt
    pub initial_delay_ms: u64,
    /// Cap applied before jitter
    pub max_delay_ms: u64,
    /// Growth factor per attempt
    pub multiplier: f64,
    /// Symmetric jitter, in percent of the capped delay
    pub jitter_percent: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 10,
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
            jitter_percent: 10.0,
        }
    }
}

impl ReconnectPolicy {
    /// Policy that never reconnects automatically
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_delays(mut self, initial_ms: u64, max_ms: u64) -> Self {
        self.initial_delay_ms = initial_ms;
        self.max_delay_ms = max_ms;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_jitter_percent(mut self, jitter: f64) -> Self {
        self.jitter_percent = jitter;
        self
    }

    /// Delay before jitter for the given attempt (0-based)
    pub fn capped_delay_ms(&self, attempt: u32) -> f64 {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let uncapped = self.initial_delay_ms as f64 * self.multiplier.powi(exponent);
        uncapped.min(self.max_delay_ms as f64)
    }

    /// Whether another attempt is allowed after `attempts` have been made
    pub fn allows_attempt(&self, attempts: u32) -> bool {
        self.enabled && attempts < self.max_attempts
    }
}

/// Backoff delay for `attempt` using the thread-local RNG
pub fn backoff_delay(policy: &ReconnectPolicy, attempt: u32) -> Duration {
    backoff_delay_with(policy, attempt, &mut rand::thread_rng())
}

/// Backoff delay for `attempt` drawing jitter from `rng`
pub fn backoff_delay_with<R: Rng + ?Sized>(
    policy: &ReconnectPolicy,
    attempt: u32,
    rng: &mut R,
) -> Duration {
    let base = policy.capped_delay_ms(attempt);
    let spread = (policy.jitter_percent.clamp(0.0, 100.0)) / 100.0;
    let factor = if spread > 0.0 {
        1.0 + rng.gen_range(-spread..=spread)
    } else {
        1.0
    };
    Duration::from_secs_f64((base * factor).max(0.0) / 1_000.0)
}
