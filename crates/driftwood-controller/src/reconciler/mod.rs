//! Per-kind reconcilers
//!
//! A reconciler runs one pass for one key and reports when it wants to be
//! called again. It never retries internally: every error ends the pass and
//! the dispatcher decides the requeue from the error class.

pub mod claim;
pub mod composite;
pub mod managed;

pub use claim::ClaimReconciler;
pub use composite::CompositeReconciler;
pub use managed::ManagedReconciler;

use crate::config::ControllerConfig;
use crate::error::Result;
use async_trait::async_trait;
use driftwood_composition::CompositionEngine;
use driftwood_core::{Catalog, FINALIZER, Resource, ResourceKey};
use driftwood_provider::{CredentialCache, ProviderRegistry};
use driftwood_store::ResourceStore;
use std::sync::Arc;
use std::time::Duration;

/// When to run the next pass for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    /// Nothing pending; the periodic resync is enough
    None,
    After(Duration),
}

#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Kind this reconciler is responsible for
    fn kind(&self) -> &str;

    async fn reconcile(&self, key: &ResourceKey) -> Result<Requeue>;
}

/// Everything a pass needs. Shared by all reconcilers of a manager.
pub struct Context {
    pub store: ResourceStore,
    pub providers: Arc<ProviderRegistry>,
    pub catalog: Arc<Catalog>,
    pub engine: CompositionEngine,
    pub credentials: CredentialCache,
    pub config: ControllerConfig,
}

impl Context {
    pub fn new(
        store: ResourceStore,
        providers: ProviderRegistry,
        catalog: Catalog,
        config: ControllerConfig,
    ) -> Self {
        Self {
            store,
            providers: Arc::new(providers),
            catalog: Arc::new(catalog),
            engine: CompositionEngine::default(),
            credentials: CredentialCache::new(config.credential_ttl),
            config,
        }
    }

    pub fn with_engine(mut self, engine: CompositionEngine) -> Self {
        self.engine = engine;
        self
    }
}

/// Add the shared finalizer if missing. Returns the resource as stored
/// after the write.
pub(crate) async fn ensure_finalizer(store: &ResourceStore, mut resource: Resource) -> Result<Resource> {
    if resource.has_finalizer(FINALIZER) {
        return Ok(resource);
    }
    let key = resource.key();
    match store
        .update_metadata(&key, resource.metadata.resource_version, |meta| {
            meta.finalizers.push(FINALIZER.to_string());
        })
        .await?
    {
        Some(version) => {
            resource.add_finalizer(FINALIZER);
            resource.metadata.resource_version = version;
            Ok(resource)
        }
        None => Ok(store.get(&key).await?),
    }
}

/// Remove the shared finalizer. `None` means the resource is gone.
pub(crate) async fn remove_finalizer(store: &ResourceStore, resource: &Resource) -> Result<Option<u64>> {
    let version = store
        .update_metadata(&resource.key(), resource.metadata.resource_version, |meta| {
            meta.finalizers.retain(|f| f != FINALIZER);
        })
        .await?;
    Ok(version)
}
