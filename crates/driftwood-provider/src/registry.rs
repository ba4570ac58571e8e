//! Provider registry
//!
//! Maps provider names to clients and managed kinds to providers.

use crate::client::ProviderClient;
use crate::error::{ProviderError, Result};
use driftwood_core::Catalog;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn ProviderClient>>,
    kinds: BTreeMap<String, String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own [`ProviderClient::name`].
    pub fn register(&mut self, provider: Arc<dyn ProviderClient>) {
        let name = provider.name().to_string();
        debug!(provider = %name, "Registered provider");
        self.providers.insert(name, provider);
    }

    /// Route a managed kind to a provider.
    pub fn bind_kind(&mut self, kind: impl Into<String>, provider: impl Into<String>) {
        self.kinds.insert(kind.into(), provider.into());
    }

    /// Bind every `managed-kind` declared in the catalog.
    ///
    /// Fails when a declaration names a provider that was never registered.
    pub fn bind_catalog(&mut self, catalog: &Catalog) -> Result<()> {
        for (kind, provider) in &catalog.managed_kinds {
            if !self.providers.contains_key(provider) {
                return Err(ProviderError::ProviderNotFound(format!(
                    "managed kind '{}' refers to unregistered provider '{}'",
                    kind, provider
                )));
            }
            self.bind_kind(kind.clone(), provider.clone());
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderClient>> {
        self.providers.get(name).cloned()
    }

    pub fn provider_name_for(&self, kind: &str) -> Option<&str> {
        self.kinds.get(kind).map(String::as_str)
    }

    pub fn for_kind(&self, kind: &str) -> Result<Arc<dyn ProviderClient>> {
        let name = self.provider_name_for(kind).ok_or_else(|| {
            ProviderError::ProviderNotFound(format!("no provider bound to kind '{}'", kind))
        })?;
        self.get(name)
            .ok_or_else(|| ProviderError::ProviderNotFound(name.to_string()))
    }

    pub fn is_managed_kind(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    pub fn managed_kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(String::as_str)
    }

    pub fn provider_names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("kinds", &self.kinds)
            .finish()
    }
}
