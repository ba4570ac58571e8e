//! Mutually-exclusive leases used for leader election

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lease record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub name: String,

    /// Identity of the current holder (replica id)
    pub holder: String,

    pub acquired_at: DateTime<Utc>,

    pub renewed_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,

    /// Number of times the lease changed hands
    pub transitions: u64,
}

impl Lease {
    pub fn new(
        name: impl Into<String>,
        holder: impl Into<String>,
        now: DateTime<Utc>,
        duration: chrono::Duration,
    ) -> Self {
        Self {
            name: name.into(),
            holder: holder.into(),
            acquired_at: now,
            renewed_at: now,
            expires_at: now + duration,
            transitions: 0,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_held_by(&self, holder: &str) -> bool {
        self.holder == holder
    }

    /// Whether `holder` may take or keep this lease at `now`.
    pub fn is_available_to(&self, holder: &str, now: DateTime<Utc>) -> bool {
        self.is_held_by(holder) || self.is_expired(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_expiry() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let lease = Lease::new("ctrl", "replica-a", now, chrono::Duration::seconds(15));

        assert!(!lease.is_expired(now + chrono::Duration::seconds(14)));
        assert!(lease.is_expired(now + chrono::Duration::seconds(15)));
        assert!(lease.is_available_to("replica-a", now));
        assert!(!lease.is_available_to("replica-b", now));
        assert!(lease.is_available_to("replica-b", now + chrono::Duration::seconds(20)));
    }
}
