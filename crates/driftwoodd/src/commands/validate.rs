use crate::commands::load_catalog;
use colored::Colorize;
use driftwood_composition::select_composition;
use driftwood_core::{Catalog, Resource};
use std::path::Path;

pub fn handle(catalog_path: &Path, manifests: Option<&Path>) -> anyhow::Result<()> {
    println!("{}", "カタログを検証中...".blue());

    let catalog = match load_catalog(catalog_path) {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ カタログエラー".red().bold());
            eprintln!("  {:#}", e);
            std::process::exit(1);
        }
    };

    println!("{}", "✓ カタログは正常です！".green().bold());
    println!();
    println!("サマリー:");
    println!("  定義 (XRD): {}個", catalog.definitions.len());
    for definition in catalog.definitions.values() {
        let claim = definition
            .claim_kind
            .as_deref()
            .map(|c| format!(", claim: {}", c))
            .unwrap_or_default();
        println!(
            "    - {} ({}{})",
            definition.name.cyan(),
            definition.composite_kind,
            claim
        );
    }
    println!("  Composition: {}個", catalog.compositions.len());
    for composition in catalog.compositions.values() {
        println!(
            "    - {} ({} → {}個のリソース)",
            composition.name.cyan(),
            composition.composite_kind,
            composition.resources.len()
        );
    }
    println!("  ProviderConfig: {}個", catalog.provider_configs.len());
    println!("  Managed kind: {}個", catalog.managed_kinds.len());

    let Some(path) = manifests else {
        return Ok(());
    };

    println!();
    println!("{}", "マニフェストを検証中...".blue());
    let resources = match driftwood_core::load_manifests(path) {
        Ok(resources) => resources,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ マニフェストエラー".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    let mut failed = 0;
    for resource in &resources {
        match check_manifest(&catalog, resource) {
            Ok(()) => println!("  {} {}", "✓".green(), resource.key()),
            Err(message) => {
                failed += 1;
                eprintln!("  {} {}: {}", "✗".red(), resource.key(), message);
            }
        }
    }

    if failed > 0 {
        eprintln!();
        eprintln!(
            "{}",
            format!("✗ {}個中{}個のマニフェストが不正です", resources.len(), failed)
                .red()
                .bold()
        );
        std::process::exit(1);
    }

    println!(
        "{}",
        format!("✓ {}個のマニフェストは正常です！", resources.len())
            .green()
            .bold()
    );
    Ok(())
}

/// マニフェスト1件をカタログに照らして検証
///
/// Composite と Claim はスキーマと Composition の選択まで、
/// Managed resource は kind と ProviderConfig の存在を確認する。
pub fn check_manifest(catalog: &Catalog, resource: &Resource) -> Result<(), String> {
    let kind = resource.kind.as_str();

    let definition = catalog
        .definition_for_composite(kind)
        .or_else(|| catalog.definition_for_claim(kind));
    if let Some(definition) = definition {
        let spec = definition
            .validate_spec(&resource.spec)
            .map_err(|e| e.to_string())?;
        let mut composite = resource.clone();
        composite.kind = definition.composite_kind.clone();
        composite.spec = spec;
        select_composition(catalog, &composite).map_err(|e| e.to_string())?;
        return Ok(());
    }

    let managed = catalog.managed_kinds.contains_key(kind) || catalog.composed_kinds().any(|k| k == kind);
    if !managed {
        return Err(format!("kind '{}' はカタログに定義されていません", kind));
    }

    let config = resource
        .spec
        .pointer("/providerConfigRef/name")
        .and_then(|v| v.as_str())
        .unwrap_or("default");
    if !catalog.provider_configs.contains_key(config) {
        return Err(format!("ProviderConfig '{}' が見つかりません", config));
    }
    Ok(())
}
