use crate::commands::load_catalog;
use anyhow::Context;
use colored::Colorize;
use driftwood_composition::{CompositionEngine, PriorState, select_composition};
use driftwood_core::{Catalog, Resource};
use std::path::Path;

/// マニフェスト中の Composite を展開し、子リソースを YAML で標準出力へ書く
pub fn handle(catalog_path: &Path, manifest: &Path) -> anyhow::Result<()> {
    let catalog = load_catalog(catalog_path)?;
    let resources = driftwood_core::load_manifests(manifest)
        .with_context(|| format!("マニフェストを読み込めません: {}", manifest.display()))?;

    let engine = CompositionEngine::default();
    let mut documents = Vec::new();
    for resource in &resources {
        if !catalog.is_composite_kind(&resource.kind) {
            eprintln!(
                "{} {} は Composite ではないためスキップ",
                "⚠".yellow(),
                resource.key()
            );
            continue;
        }
        for child in compose_one(&catalog, &engine, resource)? {
            documents.push(serde_yaml::to_string(&child)?);
        }
    }

    print!("{}", documents.join("---\n"));
    Ok(())
}

/// ストアが空の状態での1パス分の展開
///
/// 前提となる子がまだ存在しないため、sequence ステップで保留された子は出力されない。
pub fn compose_one(
    catalog: &Catalog,
    engine: &CompositionEngine,
    resource: &Resource,
) -> anyhow::Result<Vec<Resource>> {
    let key = resource.key();
    let definition = catalog
        .definition_for_composite(&resource.kind)
        .with_context(|| format!("{} の定義が見つかりません", key))?;

    let mut composite = resource.clone();
    composite.spec = definition
        .validate_spec(&resource.spec)
        .with_context(|| format!("{} の spec が不正です", key))?;

    let selection = select_composition(catalog, &composite)?;
    eprintln!(
        "{} {} ← {} ({})",
        "▶".cyan(),
        key,
        selection.composition.name.cyan(),
        selection.selected_by
    );

    let composed = engine.compose(&composite, selection.composition, &PriorState::new())?;
    for template in &composed.withheld {
        eprintln!("  {} {} は保留中", "…".dimmed(), template);
    }

    Ok(composed
        .resources
        .iter()
        .map(|child| child.to_resource(&key))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftwood_core::{ResourceKey, parse_catalog_str};
    use serde_json::json;

    const CATALOG: &str = r#"
        definition "caches.example.org" {
            composite-kind "Cache"
            field "tier" type="string" default="basic"
            default-composition "redis"
        }
        composition "redis" {
            composite-kind "Cache"
            resource "cluster" kind="CacheCluster" {
                base { forProvider { engine "redis"; } }
                patch from="spec.tier" to="spec.forProvider.tier"
            }
            resource "subnet" kind="SubnetGroup"
        }
    "#;

    #[test]
    fn test_compose_applies_defaults_and_patches() {
        let catalog = parse_catalog_str(CATALOG).unwrap();
        let cache = Resource::new("example.org/v1", &ResourceKey::new("Cache", "sessions"), json!({}));

        let children = compose_one(&catalog, &CompositionEngine::default(), &cache).unwrap();
        let names: Vec<_> = children.iter().map(|c| c.metadata.name.as_str()).collect();
        assert_eq!(names, vec!["sessions-cluster", "sessions-subnet"]);
        assert_eq!(children[0].spec["forProvider"]["tier"], "basic");
        assert_eq!(
            children[0].controller_owner(),
            Some(ResourceKey::new("Cache", "sessions"))
        );
    }

    #[test]
    fn test_compose_rejects_unknown_kind() {
        let catalog = parse_catalog_str(CATALOG).unwrap();
        let queue = Resource::new("example.org/v1", &ResourceKey::new("Queue", "jobs"), json!({}));
        assert!(compose_one(&catalog, &CompositionEngine::default(), &queue).is_err());
    }
}
