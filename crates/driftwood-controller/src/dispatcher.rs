//! Per-kind controller: watch, resync and a pool of workers around one
//! reconciler.
//!
//! ```text
//!  store.watch ──┐
//!                ├──► WorkQueue ──► worker × N ──► Reconciler::reconcile
//!  resync tick ──┘        ▲                              │
//!                         └──── requeue decision ◄───────┘
//! ```
//!
//! Events for a resource of another kind are mapped to its controlling
//! owner when the owner is of this kind, so composites react to child
//! status changes. Events for this kind only enqueue when the resource was
//! added or deleted, its generation moved, or it started terminating; the
//! status and metadata writes of a pass never schedule another pass.

use crate::conditions::record_failure;
use crate::config::ControllerConfig;
use crate::error::{ReconcileError, RetryClass};
use crate::queue::WorkQueue;
use crate::reconciler::{Reconciler, Requeue};
use driftwood_core::{KeyPrefix, ResourceKey};
use driftwood_store::{ResourceStore, WatchEvent};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Resolve once `stop` turns true or its sender goes away.
pub(crate) async fn stopped(stop: &mut watch::Receiver<bool>) {
    while !*stop.borrow_and_update() {
        if stop.changed().await.is_err() {
            return;
        }
    }
}

/// Outcome of one pass as seen by the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Succeeded; next pass at resync
    Done,
    /// Succeeded; the reconciler asked to look again
    RequeueAfter(Duration),
    /// Conflict; retried at once without counting a failure
    Retry,
    /// Transient failure; backoff
    Backoff(Duration),
    /// Terminal failure; slow fixed cadence
    Slow(Duration),
}

struct Inner {
    reconciler: Arc<dyn Reconciler>,
    store: ResourceStore,
    queue: WorkQueue<ResourceKey>,
    config: ControllerConfig,
}

/// Cloneable handle; clones share the queue.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

impl Controller {
    pub fn new(reconciler: Arc<dyn Reconciler>, store: ResourceStore, config: ControllerConfig) -> Self {
        let queue = WorkQueue::new(config.backoff.clone(), config.rate_limit);
        Self {
            inner: Arc::new(Inner {
                reconciler,
                store,
                queue,
                config,
            }),
        }
    }

    pub fn kind(&self) -> &str {
        self.inner.reconciler.kind()
    }

    pub fn queue(&self) -> &WorkQueue<ResourceKey> {
        &self.inner.queue
    }

    /// Enqueue every key of this controller's kind.
    pub async fn resync(&self) -> usize {
        let keys = self
            .inner
            .store
            .keys(&KeyPrefix::kind(self.kind()))
            .await;
        let count = keys.len();
        for key in keys {
            self.inner.queue.add(key).await;
        }
        debug!(kind = %self.kind(), count, "Resync enqueued keys");
        count
    }

    /// Key to enqueue for a store event, if any.
    ///
    /// `seen` holds the last generation and terminating flag observed per key
    /// of this kind.
    fn key_for(
        &self,
        event: &WatchEvent,
        seen: &mut HashMap<ResourceKey, (u64, bool)>,
    ) -> Option<ResourceKey> {
        let object = event.object()?;
        if object.key.kind == self.kind() {
            let current = (object.generation, object.terminating);
            let changed = match event {
                WatchEvent::Deleted(_) => {
                    seen.remove(&object.key);
                    true
                }
                WatchEvent::Added(_) => {
                    seen.insert(object.key.clone(), current);
                    true
                }
                _ => seen.insert(object.key.clone(), current) != Some(current),
            };
            return changed.then(|| object.key.clone());
        }
        object
            .owner
            .as_ref()
            .filter(|owner| owner.kind == self.kind())
            .cloned()
    }

    /// Run one pass for `key` and apply the requeue decision.
    ///
    /// The caller must hold `key` from the queue.
    pub async fn process(&self, key: &ResourceKey) -> Decision {
        let inner = &self.inner;
        let config = &inner.config;
        let started = Instant::now();

        let result = match tokio::time::timeout(config.pass_deadline, inner.reconciler.reconcile(key)).await {
            Ok(result) => result,
            Err(_) => Err(ReconcileError::Timeout(config.pass_deadline)),
        };

        let decision = match result {
            Ok(requeue) => {
                inner.queue.forget(key).await;
                match requeue {
                    Requeue::None => Decision::Done,
                    Requeue::After(delay) => {
                        inner.queue.add_after(key.clone(), delay).await;
                        Decision::RequeueAfter(delay)
                    }
                }
            }
            Err(err) => {
                let decision = match err.retry_class() {
                    RetryClass::Immediate => {
                        debug!(%key, error = %err, "Conflict, retrying");
                        inner.queue.add(key.clone()).await;
                        return Decision::Retry;
                    }
                    RetryClass::Backoff => {
                        let attempt = inner.queue.failures(key).await;
                        let delay = inner.queue.add_rate_limited(key.clone()).await;
                        warn!(%key, attempt, delay_ms = delay.as_millis() as u64, error = %err, "Reconcile failed, backing off");
                        Decision::Backoff(delay)
                    }
                    RetryClass::Slow => {
                        let delay = config.terminal_retry_interval;
                        inner.queue.forget(key).await;
                        inner.queue.add_held(key.clone(), delay).await;
                        error!(%key, error = %err, "Reconcile failed permanently, retrying slowly");
                        Decision::Slow(delay)
                    }
                };
                if let Err(e) = record_failure(&inner.store, key, &err, config.conflict_retries).await {
                    warn!(%key, error = %e, "Could not record failure condition");
                }
                decision
            }
        };

        debug!(%key, ?decision, elapsed_ms = started.elapsed().as_millis() as u64, "Pass finished");
        decision
    }

    async fn worker(self, id: usize) {
        debug!(kind = %self.kind(), worker = id, "Worker started");
        while let Some(key) = self.inner.queue.get().await {
            self.process(&key).await;
            self.inner.queue.done(&key).await;
        }
        debug!(kind = %self.kind(), worker = id, "Worker stopped");
    }

    async fn watch_loop(
        self,
        mut events: impl futures_util::Stream<Item = WatchEvent> + Unpin,
        mut stop: watch::Receiver<bool>,
    ) {
        let mut seen = HashMap::new();
        loop {
            tokio::select! {
                _ = stopped(&mut stop) => break,
                event = events.next() => match event {
                    None => break,
                    Some(WatchEvent::Lagged(missed)) => {
                        warn!(kind = %self.kind(), missed, "Watch lagged, resyncing");
                        self.resync().await;
                    }
                    Some(event) => {
                        if let Some(key) = self.key_for(&event, &mut seen) {
                            self.inner.queue.add(key).await;
                        }
                    }
                },
            }
        }
    }

    async fn resync_loop(self, mut stop: watch::Receiver<bool>) {
        let period = self.inner.config.resync_interval.max(Duration::from_millis(1));
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = stopped(&mut stop) => break,
                _ = interval.tick() => {
                    self.resync().await;
                }
            }
        }
    }

    /// Run until `stop` turns true (or its sender is dropped), then drain
    /// the queue and join the workers.
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        let workers = self.inner.config.workers.max(1);
        info!(kind = %self.kind(), workers, "Starting controller");

        // subscribe before the first resync so no change slips between them
        let events = Box::pin(self.inner.store.watch(KeyPrefix::kind(self.kind())));
        let mut tasks = Vec::with_capacity(workers + 2);
        tasks.push(tokio::spawn(self.clone().watch_loop(events, stop.clone())));
        tasks.push(tokio::spawn(self.clone().resync_loop(stop.clone())));
        for id in 0..workers {
            tasks.push(tokio::spawn(self.clone().worker(id)));
        }

        stopped(&mut stop).await;
        self.inner.queue.shut_down().await;
        for task in tasks {
            if let Err(e) = task.await {
                error!(kind = %self.kind(), error = %e, "Controller task panicked");
            }
        }
        info!(kind = %self.kind(), "Controller stopped");
    }
}
