//! Versioned in-memory resource store
//!
//! Every write bumps a store-wide revision counter and stamps it on the
//! written object as its `resourceVersion`, so versions are strictly
//! increasing per resource and never reused after delete/recreate.
//! Writes that carry an expected version fail with [`StoreError::Conflict`]
//! when the stored object has moved on; callers re-read and retry.

use crate::error::{Result, StoreError};
use crate::event::{ObjectRef, WatchEvent};
use crate::index::OwnerIndex;
use crate::lease::Lease;
use crate::snapshot::StoreSnapshot;
use chrono::{DateTime, Utc};
use driftwood_core::{KeyPrefix, ObjectMeta, Resource, ResourceKey, ResourceStatus};
use futures_util::Stream;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, broadcast};

const DEFAULT_EVENT_CAPACITY: usize = 1024;
const APPLY_ATTEMPTS: usize = 8;

/// Result of a delete request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Finalizers remain; the resource is marked terminating at this version
    Terminating(u64),
    /// The resource had no finalizers and is gone
    Removed,
}

#[derive(Debug, Default)]
struct Inner {
    resources: BTreeMap<ResourceKey, Resource>,
    index: OwnerIndex,
    leases: BTreeMap<String, Lease>,
    revision: u64,
}

impl Inner {
    fn next_version(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    fn current(&self, key: &ResourceKey) -> Result<&Resource> {
        self.resources
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    fn check_version(key: &ResourceKey, actual: u64, expected: u64) -> Result<()> {
        if actual != expected {
            return Err(StoreError::Conflict {
                key: key.clone(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Validate the owner references of `meta` for the resource at `key`.
    ///
    /// Returns the controlling owner.
    fn validate_owner(&self, key: &ResourceKey, meta: &ObjectMeta) -> Result<Option<ResourceKey>> {
        let invalid = |reason: String| StoreError::InvalidOwner {
            key: key.clone(),
            reason,
        };

        let controllers: Vec<_> = meta.owner_references.iter().filter(|r| r.controller).collect();
        if controllers.len() > 1 {
            return Err(invalid("more than one controlling owner".to_string()));
        }
        let Some(reference) = controllers.first() else {
            return Ok(None);
        };

        let owner = reference.key();
        if self.index.owner_of(key) == Some(&owner) {
            return Ok(Some(owner));
        }

        let owner_resource = self
            .resources
            .get(&owner)
            .ok_or_else(|| invalid(format!("owner {} does not exist", owner)))?;
        if owner_resource.is_terminating() {
            return Err(invalid(format!("owner {} is terminating", owner)));
        }
        self.index.check_edge(key, &owner).map_err(invalid)?;

        Ok(Some(owner))
    }

    fn insert_new(&mut self, mut resource: Resource) -> Result<(u64, WatchEvent)> {
        let key = resource.key();
        if self.resources.contains_key(&key) {
            return Err(StoreError::AlreadyExists(key));
        }
        let owner = self.validate_owner(&key, &resource.metadata)?;

        let version = self.next_version();
        resource.metadata.generation = 1;
        resource.metadata.resource_version = version;
        resource.metadata.deletion_requested = false;

        self.index.set_owner(&key, owner.as_ref());
        let event = WatchEvent::Added(self.object_ref(&resource));
        self.resources.insert(key, resource);
        Ok((version, event))
    }

    fn object_ref(&self, resource: &Resource) -> ObjectRef {
        let key = resource.key();
        ObjectRef {
            owner: self.index.owner_of(&key).cloned(),
            key,
            resource_version: resource.metadata.resource_version,
            generation: resource.metadata.generation,
            terminating: resource.is_terminating(),
        }
    }

    /// Remove `key` and cascade termination to everything it owns.
    fn remove(&mut self, key: &ResourceKey, events: &mut Vec<WatchEvent>) {
        let Some(resource) = self.resources.remove(key) else {
            return;
        };
        let mut object = self.object_ref(&resource);
        object.resource_version = self.next_version();
        self.index.remove(key);
        tracing::debug!(key = %key, "Resource removed");
        events.push(WatchEvent::Deleted(object));

        for child in self.index.owned_by(key) {
            self.terminate(&child, events);
        }
    }

    /// Mark `key` terminating, removing it right away when it has no finalizers.
    fn terminate(&mut self, key: &ResourceKey, events: &mut Vec<WatchEvent>) {
        let Some(resource) = self.resources.get(key) else {
            return;
        };
        if resource.is_terminating() {
            return;
        }
        if resource.metadata.finalizers.is_empty() {
            self.remove(key, events);
            return;
        }

        let version = self.next_version();
        if let Some(resource) = self.resources.get_mut(key) {
            resource.metadata.deletion_requested = true;
            resource.metadata.resource_version = version;
        }
        if let Some(resource) = self.resources.get(key) {
            events.push(WatchEvent::Modified(self.object_ref(resource)));
        }
    }
}

/// Shared handle to the store. Clones share the same state.
#[derive(Clone)]
pub struct ResourceStore {
    inner: Arc<RwLock<Inner>>,
    events: broadcast::Sender<WatchEvent>,
}

impl Default for ResourceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create a store whose watchers lag after `capacity` unread events.
    pub fn with_event_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            events,
        }
    }

    fn publish(&self, events: Vec<WatchEvent>) {
        for event in events {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
    }

    pub async fn get(&self, key: &ResourceKey) -> Result<Resource> {
        self.inner.read().await.current(key).cloned()
    }

    pub async fn try_get(&self, key: &ResourceKey) -> Option<Resource> {
        self.inner.read().await.resources.get(key).cloned()
    }

    /// Highest resource version handed out so far
    pub async fn revision(&self) -> u64 {
        self.inner.read().await.revision
    }

    /// Create a new resource. Fails with `AlreadyExists` if the key is taken.
    #[tracing::instrument(skip(self, resource), fields(key = %resource.key()))]
    pub async fn create(&self, resource: Resource) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let (version, event) = inner.insert_new(resource)?;
        tracing::debug!(version, "Resource created");

        self.publish(vec![event]);
        Ok(version)
    }

    /// Write the desired state of a resource (upsert).
    ///
    /// `expected` is the resource version the caller read, or `None` when the
    /// caller believes the resource does not exist yet. A mismatch in either
    /// direction is a conflict (`expected = 0` in the error means "absent").
    ///
    /// Replaces `spec`, `apiVersion` and labels, merges annotations, and
    /// replaces owner references when the incoming resource carries any.
    /// Status, finalizers and store-managed fields are preserved. `generation`
    /// increments only when `spec` changes. A write that changes nothing
    /// returns the current version without bumping it.
    #[tracing::instrument(skip(self, resource), fields(key = %resource.key()))]
    pub async fn put(&self, resource: Resource, expected: Option<u64>) -> Result<u64> {
        let key = resource.key();
        let mut inner = self.inner.write().await;

        let Some(existing) = inner.resources.get(&key) else {
            if expected.is_some() {
                return Err(StoreError::NotFound(key));
            }
            let (version, event) = inner.insert_new(resource)?;
            tracing::debug!(version, "Resource created");
            self.publish(vec![event]);
            return Ok(version);
        };

        let actual = existing.metadata.resource_version;
        Inner::check_version(&key, actual, expected.unwrap_or(0))?;
        if existing.is_terminating() {
            return Err(StoreError::Terminating(key));
        }

        let mut next = existing.clone();
        next.api_version = resource.api_version;
        next.metadata.labels = resource.metadata.labels;
        next.metadata
            .annotations
            .extend(resource.metadata.annotations);
        if !resource.metadata.owner_references.is_empty() {
            next.metadata.owner_references = resource.metadata.owner_references;
        }
        let spec_changed = next.spec != resource.spec;
        next.spec = resource.spec;

        if next == *existing {
            return Ok(actual);
        }

        let owner = inner.validate_owner(&key, &next.metadata)?;
        if spec_changed {
            next.metadata.generation += 1;
        }
        let version = inner.next_version();
        next.metadata.resource_version = version;

        inner.index.set_owner(&key, owner.as_ref());
        let event = WatchEvent::Modified(inner.object_ref(&next));
        inner.resources.insert(key, next);
        tracing::debug!(version, spec_changed, "Resource updated");

        self.publish(vec![event]);
        Ok(version)
    }

    /// Replace the observed status. Never changes `generation`.
    #[tracing::instrument(skip(self, status))]
    pub async fn update_status(
        &self,
        key: &ResourceKey,
        status: ResourceStatus,
        expected: u64,
    ) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let existing = inner.current(key)?;
        let actual = existing.metadata.resource_version;
        Inner::check_version(key, actual, expected)?;
        if existing.status == status {
            return Ok(actual);
        }

        let version = inner.next_version();
        let event = {
            let Some(resource) = inner.resources.get_mut(key) else {
                return Err(StoreError::NotFound(key.clone()));
            };
            resource.status = status;
            resource.metadata.resource_version = version;
            let resource = resource.clone();
            WatchEvent::Modified(inner.object_ref(&resource))
        };
        tracing::debug!(version, "Status updated");

        self.publish(vec![event]);
        Ok(version)
    }

    /// Mutate labels, annotations, finalizers or owner references.
    ///
    /// Identity and store-managed fields are restored after `mutate` runs.
    /// Returns `None` when the write emptied the finalizers of a terminating
    /// resource and it was physically removed.
    #[tracing::instrument(skip(self, mutate))]
    pub async fn update_metadata<F>(
        &self,
        key: &ResourceKey,
        expected: u64,
        mutate: F,
    ) -> Result<Option<u64>>
    where
        F: FnOnce(&mut ObjectMeta),
    {
        let mut inner = self.inner.write().await;
        let existing = inner.current(key)?;
        let actual = existing.metadata.resource_version;
        Inner::check_version(key, actual, expected)?;

        let mut meta = existing.metadata.clone();
        mutate(&mut meta);
        meta.name = existing.metadata.name.clone();
        meta.namespace = existing.metadata.namespace.clone();
        meta.generation = existing.metadata.generation;
        meta.resource_version = existing.metadata.resource_version;
        meta.deletion_requested = existing.metadata.deletion_requested;

        if meta == existing.metadata {
            return Ok(Some(actual));
        }

        let mut events = Vec::new();
        if meta.deletion_requested && meta.finalizers.is_empty() {
            inner.remove(key, &mut events);
            self.publish(events);
            return Ok(None);
        }

        let owner = inner.validate_owner(key, &meta)?;
        let version = inner.next_version();
        meta.resource_version = version;
        inner.index.set_owner(key, owner.as_ref());
        if let Some(resource) = inner.resources.get_mut(key) {
            resource.metadata = meta;
        }
        if let Some(resource) = inner.resources.get(key) {
            events.push(WatchEvent::Modified(inner.object_ref(resource)));
        }
        tracing::debug!(version, "Metadata updated");

        self.publish(events);
        Ok(Some(version))
    }

    /// Request deletion (two-phase).
    ///
    /// A resource with finalizers is only marked terminating; it is removed by
    /// the metadata write that clears its last finalizer. Deleting an already
    /// terminating resource is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, key: &ResourceKey, expected: Option<u64>) -> Result<DeleteOutcome> {
        let mut inner = self.inner.write().await;
        let existing = inner.current(key)?;
        let actual = existing.metadata.resource_version;
        if let Some(expected) = expected {
            Inner::check_version(key, actual, expected)?;
        }
        if existing.is_terminating() {
            return Ok(DeleteOutcome::Terminating(actual));
        }

        let mut events = Vec::new();
        inner.terminate(key, &mut events);
        let outcome = match inner.resources.get(key) {
            Some(resource) => {
                tracing::debug!("Resource marked terminating");
                DeleteOutcome::Terminating(resource.metadata.resource_version)
            }
            None => DeleteOutcome::Removed,
        };

        self.publish(events);
        Ok(outcome)
    }

    /// Consistent snapshot of every resource matching `prefix`, in key order.
    pub async fn list(&self, prefix: &KeyPrefix) -> Vec<Resource> {
        self.inner
            .read()
            .await
            .resources
            .iter()
            .filter(|(k, _)| prefix.matches(k))
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub async fn keys(&self, prefix: &KeyPrefix) -> Vec<ResourceKey> {
        self.inner
            .read()
            .await
            .resources
            .keys()
            .filter(|k| prefix.matches(k))
            .cloned()
            .collect()
    }

    /// Keys of the resources `owner` controls
    pub async fn owned_by(&self, owner: &ResourceKey) -> Vec<ResourceKey> {
        self.inner.read().await.index.owned_by(owner)
    }

    /// Resources `owner` controls, in key order
    pub async fn children(&self, owner: &ResourceKey) -> Vec<Resource> {
        let inner = self.inner.read().await;
        inner
            .index
            .owned_by(owner)
            .iter()
            .filter_map(|k| inner.resources.get(k).cloned())
            .collect()
    }

    pub async fn owner_of(&self, key: &ResourceKey) -> Option<ResourceKey> {
        self.inner.read().await.index.owner_of(key).cloned()
    }

    /// Subscribe to change events for `prefix`.
    ///
    /// Events for resources whose controlling owner matches `prefix` are
    /// delivered too. The stream is infinite while the store lives; a slow
    /// subscriber receives [`WatchEvent::Lagged`] and should relist.
    pub fn watch(&self, prefix: KeyPrefix) -> impl Stream<Item = WatchEvent> + Send + use<> {
        let rx = self.events.subscribe();
        futures_util::stream::unfold((rx, prefix), |(mut rx, prefix)| async move {
            loop {
                match rx.recv().await {
                    Ok(event) if event.matches(&prefix) => return Some((event, (rx, prefix))),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Watcher lagged behind store events");
                        return Some((WatchEvent::Lagged(missed), (rx, prefix)));
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
    }

    /// Create or update from a manifest, re-reading on conflict.
    pub async fn apply(&self, resource: Resource) -> Result<u64> {
        let key = resource.key();
        let mut last_error = None;
        for _ in 0..APPLY_ATTEMPTS {
            let expected = self
                .try_get(&key)
                .await
                .map(|r| r.metadata.resource_version);
            match self.put(resource.clone(), expected).await {
                Err(e) if e.is_conflict() => last_error = Some(e),
                other => return other,
            }
        }
        Err(last_error.unwrap_or(StoreError::NotFound(key)))
    }

    /// Take or renew the lease `name` for `holder`.
    ///
    /// A lease is available when absent, already held by `holder`, or expired.
    #[tracing::instrument(skip(self))]
    pub async fn acquire_lease(
        &self,
        name: &str,
        holder: &str,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<Lease> {
        let duration = chrono::Duration::from_std(duration)
            .map_err(|e| StoreError::StateError(format!("invalid lease duration: {}", e)))?;
        let mut inner = self.inner.write().await;

        let lease = match inner.leases.get(name) {
            Some(current) if current.is_held_by(holder) => Lease {
                renewed_at: now,
                expires_at: now + duration,
                ..current.clone()
            },
            Some(current) if !current.is_expired(now) => {
                return Err(StoreError::LeaseHeld {
                    name: name.to_string(),
                    holder: current.holder.clone(),
                    expires_at: current.expires_at,
                });
            }
            Some(current) => {
                tracing::warn!(previous = %current.holder, "Taking over expired lease");
                Lease {
                    transitions: current.transitions + 1,
                    ..Lease::new(name, holder, now, duration)
                }
            }
            None => Lease::new(name, holder, now, duration),
        };

        inner.leases.insert(name.to_string(), lease.clone());
        Ok(lease)
    }

    /// Extend a lease the caller already holds.
    pub async fn renew_lease(
        &self,
        name: &str,
        holder: &str,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<Lease> {
        {
            let inner = self.inner.read().await;
            if !inner.leases.get(name).is_some_and(|l| l.is_held_by(holder)) {
                return Err(StoreError::LeaseLost {
                    name: name.to_string(),
                    holder: holder.to_string(),
                });
            }
        }
        self.acquire_lease(name, holder, duration, now).await
    }

    /// Give up a lease. Releasing a lease held by someone else is an error.
    pub async fn release_lease(&self, name: &str, holder: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        match inner.leases.get(name) {
            None => Ok(()),
            Some(lease) if lease.is_held_by(holder) => {
                inner.leases.remove(name);
                Ok(())
            }
            Some(_) => Err(StoreError::LeaseLost {
                name: name.to_string(),
                holder: holder.to_string(),
            }),
        }
    }

    pub async fn lease(&self, name: &str) -> Option<Lease> {
        self.inner.read().await.leases.get(name).cloned()
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        let inner = self.inner.read().await;
        StoreSnapshot::new(inner.revision, inner.resources.values().cloned().collect())
    }

    /// Replace the contents with `snapshot`. Leases are not restored.
    pub async fn restore(&self, snapshot: StoreSnapshot) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.resources.clear();
        inner.index.clear();

        let mut revision = snapshot.revision;
        for resource in snapshot.resources {
            revision = revision.max(resource.metadata.resource_version);
            inner.resources.insert(resource.key(), resource);
        }
        let edges: Vec<(ResourceKey, ResourceKey)> = inner
            .resources
            .values()
            .filter_map(|r| r.controller_owner().map(|o| (r.key(), o)))
            .collect();
        for (child, owner) in edges {
            inner.index.set_owner(&child, Some(&owner));
        }
        inner.revision = revision;

        let events: Vec<WatchEvent> = inner
            .resources
            .values()
            .map(|r| WatchEvent::Added(inner.object_ref(r)))
            .collect();
        tracing::info!(resources = events.len(), revision, "Store restored from snapshot");

        self.publish(events);
        Ok(())
    }
}
