//! Deduplicating work queue
//!
//! Semantics:
//!
//! - A key is queued at most once. Adding a key that is already queued is a
//!   no-op.
//! - A key that is added while a worker holds it is marked dirty and queued
//!   again when the worker calls [`WorkQueue::done`]. Two workers never hold
//!   the same key.
//! - Delayed adds keep the earliest deadline; an immediate add supersedes a
//!   pending delay.
//! - Rate-limited adds wait for the larger of the per-key backoff and the
//!   global token bucket.
//! - A failed key is held: until its retry delay passes, adds for it are
//!   ignored, including adds that arrived while a worker held it.

use crate::config::RateLimitConfig;
use crate::rate_limit::TokenBucket;
use driftwood_provider::BackoffConfig;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;

struct State<K> {
    queue: VecDeque<K>,
    /// Keys waiting to be processed (queued or re-queued on `done`)
    dirty: HashSet<K>,
    processing: HashSet<K>,
    delayed: HashMap<K, Instant>,
    /// Delayed keys whose deadline no add may pull forward
    held: HashSet<K>,
    failures: HashMap<K, u32>,
    limiter: TokenBucket,
    shutting_down: bool,
}

impl<K: Clone + Eq + Hash> State<K> {
    fn enqueue(&mut self, key: K) -> bool {
        if self.held.contains(&key) {
            return false;
        }
        self.delayed.remove(&key);
        if !self.dirty.insert(key.clone()) {
            return false;
        }
        if !self.processing.contains(&key) {
            self.queue.push_back(key);
        }
        true
    }

    fn promote_due(&mut self, now: Instant) {
        let mut due: Vec<(Instant, K)> = self
            .delayed
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(k, at)| (*at, k.clone()))
            .collect();
        due.sort_by_key(|(at, _)| *at);
        for (_, key) in due {
            self.held.remove(&key);
            self.enqueue(key);
        }
    }

    /// Delay `key` until `at` and drop any pending immediate add for it.
    fn hold(&mut self, key: K, at: Instant) {
        if self.dirty.remove(&key) && !self.processing.contains(&key) {
            self.queue.retain(|k| k != &key);
        }
        self.held.insert(key.clone());
        self.delayed.insert(key, at);
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.delayed.values().min().copied()
    }
}

struct Shared<K> {
    state: Mutex<State<K>>,
    notify: Notify,
    backoff: BackoffConfig,
}

/// Shared handle; clones use the same queue.
pub struct WorkQueue<K> {
    shared: Arc<Shared<K>>,
}

impl<K> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Debug + Send + 'static,
{
    pub fn new(backoff: BackoffConfig, rate_limit: RateLimitConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    delayed: HashMap::new(),
                    held: HashSet::new(),
                    failures: HashMap::new(),
                    limiter: TokenBucket::new(rate_limit),
                    shutting_down: false,
                }),
                notify: Notify::new(),
                backoff,
            }),
        }
    }

    pub async fn add(&self, key: K) {
        let mut state = self.shared.state.lock().await;
        if state.shutting_down {
            return;
        }
        if state.enqueue(key) {
            drop(state);
            self.shared.notify.notify_waiters();
        }
    }

    /// Queue `key` once `delay` has passed.
    pub async fn add_after(&self, key: K, delay: Duration) {
        if delay.is_zero() {
            return self.add(key).await;
        }
        let at = Instant::now() + delay;
        let mut state = self.shared.state.lock().await;
        if state.shutting_down || state.dirty.contains(&key) || state.held.contains(&key) {
            return;
        }
        let entry = state.delayed.entry(key).or_insert(at);
        if at < *entry {
            *entry = at;
        }
        drop(state);
        // waiters recompute their sleep deadline
        self.shared.notify.notify_waiters();
    }

    /// Queue `key` after its backoff delay and count a failure.
    ///
    /// The key is held until the delay passes. Returns the delay that was
    /// applied.
    pub async fn add_rate_limited(&self, key: K) -> Duration {
        let mut state = self.shared.state.lock().await;
        let failures = state.failures.entry(key.clone()).or_insert(0);
        let attempt = *failures;
        *failures = failures.saturating_add(1);
        let delay = self
            .shared
            .backoff
            .backoff(attempt)
            .max(state.limiter.reserve());
        debug!(?key, delay_ms = delay.as_millis() as u64, "Rate-limited requeue");
        if !state.shutting_down {
            state.hold(key, Instant::now() + delay);
        }
        drop(state);
        self.shared.notify.notify_waiters();
        delay
    }

    /// Queue `key` after `delay` and hold it until then without counting a
    /// failure.
    pub async fn add_held(&self, key: K, delay: Duration) {
        let mut state = self.shared.state.lock().await;
        if state.shutting_down {
            return;
        }
        state.hold(key, Instant::now() + delay);
        drop(state);
        self.shared.notify.notify_waiters();
    }

    /// Reset the failure count of `key` and release any hold on it.
    pub async fn forget(&self, key: &K) {
        let mut state = self.shared.state.lock().await;
        state.failures.remove(key);
        state.held.remove(key);
    }

    pub async fn failures(&self, key: &K) -> u32 {
        self.shared
            .state
            .lock()
            .await
            .failures
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Wait for the next key. Returns `None` once the queue is shut down.
    ///
    /// The caller owns the key until it calls [`WorkQueue::done`].
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);

            let deadline = {
                let mut state = self.shared.state.lock().await;
                if state.shutting_down {
                    return None;
                }
                state.promote_due(Instant::now());
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                // register before releasing the lock so no add is missed
                notified.as_mut().enable();
                state.next_deadline()
            };

            match deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Release `key`. A key that was added while held is queued again.
    pub async fn done(&self, key: &K) {
        let mut state = self.shared.state.lock().await;
        state.processing.remove(key);
        if state.dirty.contains(key) && !state.shutting_down {
            state.queue.push_back(key.clone());
            drop(state);
            self.shared.notify.notify_waiters();
        }
    }

    /// Keys ready to be handed out
    pub async fn len(&self) -> usize {
        self.shared.state.lock().await.queue.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Keys waiting for a delay to pass
    pub async fn delayed_len(&self) -> usize {
        self.shared.state.lock().await.delayed.len()
    }

    /// Stop handing out keys. Pending and delayed entries are dropped;
    /// keys already held finish normally.
    pub async fn shut_down(&self) {
        let mut state = self.shared.state.lock().await;
        state.shutting_down = true;
        state.queue.clear();
        state.dirty.clear();
        state.delayed.clear();
        state.held.clear();
        drop(state);
        self.shared.notify.notify_waiters();
    }

    pub async fn is_shutting_down(&self) -> bool {
        self.shared.state.lock().await.shutting_down
    }
}
