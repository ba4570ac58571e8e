//! Retry backoff
//!
//! Exponential, capped, with optional random jitter on top.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay for the first retry, in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound before jitter, in milliseconds
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Extra random delay as a fraction of the computed delay (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 300_000,
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl BackoffConfig {
    /// Deterministic part of the delay, in milliseconds.
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let delay = self.base_delay_ms as f64 * self.multiplier.powi(exponent);
        if !delay.is_finite() {
            return self.max_delay_ms;
        }
        (delay as u64).min(self.max_delay_ms)
    }

    /// Delay to wait before retry number `attempt` (0-based), jitter included.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 || delay == 0 {
            return Duration::from_millis(delay);
        }
        let extra = rand::thread_rng().gen_range(0.0..=jitter) * delay as f64;
        Duration::from_millis(delay + extra as u64)
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = 0.0;
        self
    }
}
