//! Token bucket rate limiter

use crate::config::RateLimitConfig;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct TokenBucket {
    qps: f64,
    burst: f64,
    tokens: f64,
    updated_at: Instant,
}

impl TokenBucket {
    pub fn new(config: RateLimitConfig) -> Self {
        let burst = f64::from(config.burst.max(1));
        Self {
            qps: config.qps,
            burst,
            tokens: burst,
            updated_at: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.updated_at).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.qps).min(self.burst);
        self.updated_at = now;
    }

    /// Take one token and return how long the caller must wait for it.
    ///
    /// Tokens may go negative; later reservations queue up behind earlier
    /// ones. A non-positive `qps` disables limiting.
    pub fn reserve(&mut self) -> Duration {
        if self.qps <= 0.0 {
            return Duration::ZERO;
        }
        self.refill(Instant::now());
        self.tokens -= 1.0;
        if self.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-self.tokens / self.qps)
        }
    }
}
