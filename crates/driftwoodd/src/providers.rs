//! デーモンのプロバイダー構成
//!
//! カタログの `managed-kind` が参照するプロバイダーはすべてシミュレーター
//! (`MemoryProvider`) として登録します。`managed-kind` 宣言のない子kindは
//! `sim` に割り当てます。

use driftwood_core::Catalog;
use driftwood_provider::ProviderRegistry;
use driftwood_provider_memory::MemoryProvider;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

pub const SIM_PROVIDER: &str = "sim";

pub fn sim_registry(catalog: &Catalog) -> anyhow::Result<ProviderRegistry> {
    let undeclared: BTreeSet<&str> = catalog
        .composed_kinds()
        .filter(|kind| !catalog.managed_kinds.contains_key(*kind))
        .collect();

    let mut names: BTreeSet<&str> = catalog.managed_kinds.values().map(String::as_str).collect();
    if !undeclared.is_empty() {
        names.insert(SIM_PROVIDER);
    }

    let mut registry = ProviderRegistry::new();
    for name in &names {
        registry.register(Arc::new(MemoryProvider::new(*name)));
    }
    registry.bind_catalog(catalog)?;
    for kind in undeclared {
        debug!(kind, "Binding undeclared managed kind to sim provider");
        registry.bind_kind(kind, SIM_PROVIDER);
    }

    info!(
        providers = names.len(),
        kinds = registry.managed_kinds().count(),
        "Simulated providers ready"
    );
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftwood_core::parse_catalog_str;

    #[test]
    fn test_binds_declared_and_composed_kinds() {
        let catalog = parse_catalog_str(
            r#"
            definition "buckets.example.org" {
                composite-kind "StorageBucket"
            }
            composition "bucket" {
                composite-kind "StorageBucket"
                resource "bucket" kind="Bucket" {
                    base { forProvider { acl "private"; } }
                }
                resource "policy" kind="BucketPolicy"
            }
            managed-kind "Bucket" provider="objects"
            "#,
        )
        .unwrap();

        let registry = sim_registry(&catalog).unwrap();
        assert_eq!(registry.provider_name_for("Bucket"), Some("objects"));
        assert_eq!(registry.provider_name_for("BucketPolicy"), Some(SIM_PROVIDER));
        assert_eq!(
            registry.provider_names().collect::<Vec<_>>(),
            vec!["objects", SIM_PROVIDER]
        );
    }

    #[test]
    fn test_empty_catalog_registers_nothing() {
        let registry = sim_registry(&Catalog::default()).unwrap();
        assert_eq!(registry.provider_names().count(), 0);
    }
}
