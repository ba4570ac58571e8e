//! Controller tuning parameters

use driftwood_provider::BackoffConfig;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Workers per kind
    pub workers: usize,
    /// Full relist interval, independent of change events
    pub resync_interval: Duration,
    /// Upper bound on one reconcile pass
    pub pass_deadline: Duration,
    /// Retry cadence after a terminal provider error
    pub terminal_retry_interval: Duration,
    /// Requeue delay while waiting for an external object or children to
    /// become ready
    pub poll_interval: Duration,
    /// Re-read attempts when recording a failure condition races a writer
    pub conflict_retries: u32,
    pub backoff: BackoffConfig,
    pub rate_limit: RateLimitConfig,
    pub credential_ttl: Duration,
    pub lease: LeaseConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            resync_interval: Duration::from_secs(600),
            pass_deadline: Duration::from_secs(30),
            terminal_retry_interval: Duration::from_secs(300),
            poll_interval: Duration::from_secs(5),
            conflict_retries: 5,
            backoff: BackoffConfig::default(),
            rate_limit: RateLimitConfig::default(),
            credential_ttl: Duration::from_secs(60),
            lease: LeaseConfig::default(),
        }
    }
}

/// Token bucket applied to backoff requeues across all keys
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub qps: f64,
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            qps: 10.0,
            burst: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LeaseConfig {
    pub name: String,
    pub duration: Duration,
    pub renew_interval: Duration,
    /// Disable to run controllers without waiting for a lease
    pub enabled: bool,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            name: "driftwood-controller".to_string(),
            duration: Duration::from_secs(15),
            renew_interval: Duration::from_secs(5),
            enabled: true,
        }
    }
}
