//! Leader election over store leases
//!
//! Exactly one replica holds the lease and runs controllers. Leadership is
//! published on a `watch` channel so the manager can start and stop its
//! controllers as it changes hands.

use crate::config::LeaseConfig;
use crate::dispatcher::stopped;
use chrono::Utc;
use driftwood_store::{ResourceStore, StoreError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct LeaderElector {
    store: ResourceStore,
    config: LeaseConfig,
    identity: String,
}

impl LeaderElector {
    pub fn new(store: ResourceStore, config: LeaseConfig) -> Self {
        Self::with_identity(store, config, uuid::Uuid::new_v4().to_string())
    }

    pub fn with_identity(store: ResourceStore, config: LeaseConfig, identity: impl Into<String>) -> Self {
        Self {
            store,
            config,
            identity: identity.into(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// One election round. Returns whether this replica leads afterwards.
    pub async fn step(&self, leading: bool) -> bool {
        let now = Utc::now();
        let result = if leading {
            self.store
                .renew_lease(&self.config.name, &self.identity, self.config.duration, now)
                .await
        } else {
            self.store
                .acquire_lease(&self.config.name, &self.identity, self.config.duration, now)
                .await
        };
        match result {
            Ok(_) => true,
            Err(StoreError::LeaseHeld { holder, .. }) => {
                debug!(lease = %self.config.name, %holder, "Lease held by another replica");
                false
            }
            Err(e) => {
                warn!(lease = %self.config.name, error = %e, "Lease operation failed");
                false
            }
        }
    }

    /// Give the lease up if held.
    pub async fn release(&self) {
        if let Err(e) = self.store.release_lease(&self.config.name, &self.identity).await {
            debug!(lease = %self.config.name, error = %e, "Lease not released");
        }
    }

    /// Campaign every renew interval until `stop`, publishing leadership on
    /// `leading`. The lease is released on the way out.
    pub async fn run(self, leading: watch::Sender<bool>, mut stop: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.renew_interval.max(std::time::Duration::from_millis(1)));
        loop {
            tokio::select! {
                _ = stopped(&mut stop) => break,
                _ = interval.tick() => {
                    let was_leading = *leading.borrow();
                    let is_leading = self.step(was_leading).await;
                    if is_leading != was_leading {
                        if is_leading {
                            info!(identity = %self.identity, lease = %self.config.name, "Acquired leadership");
                        } else {
                            warn!(identity = %self.identity, lease = %self.config.name, "Lost leadership");
                        }
                        leading.send_replace(is_leading);
                    }
                }
            }
        }

        if *leading.borrow() {
            self.release().await;
            info!(identity = %self.identity, "Released leadership");
        }
        leading.send_replace(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> LeaseConfig {
        LeaseConfig {
            name: "test".to_string(),
            duration: Duration::from_secs(15),
            renew_interval: Duration::from_secs(5),
            enabled: true,
        }
    }

    #[tokio::test]
    async fn test_single_leader() {
        let store = ResourceStore::new();
        let a = LeaderElector::with_identity(store.clone(), config(), "a");
        let b = LeaderElector::with_identity(store.clone(), config(), "b");

        assert!(a.step(false).await);
        assert!(!b.step(false).await);
        assert!(a.step(true).await);
        assert_eq!(store.lease("test").await.unwrap().holder, "a");
    }

    #[tokio::test]
    async fn test_release_hands_over() {
        let store = ResourceStore::new();
        let a = LeaderElector::with_identity(store.clone(), config(), "a");
        let b = LeaderElector::with_identity(store.clone(), config(), "b");

        assert!(a.step(false).await);
        a.release().await;
        assert!(b.step(false).await);
        // a's renewal now fails
        assert!(!a.step(true).await);
    }

    #[tokio::test]
    async fn test_run_publishes_and_releases() {
        let store = ResourceStore::new();
        let elector = LeaderElector::with_identity(store.clone(), config(), "a");
        let (leading_tx, mut leading_rx) = watch::channel(false);
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(elector.run(leading_tx, stop_rx));
        leading_rx.changed().await.unwrap();
        assert!(*leading_rx.borrow());

        stop_tx.send(true).unwrap();
        task.await.unwrap();
        assert!(store.lease("test").await.is_none());
    }
}
