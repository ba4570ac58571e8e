//! カタログ
//!
//! KDLで記述された XRD / Composition / ProviderConfig の集合。

use super::composition::Composition;
use super::definition::CompositeResourceDefinition;
use super::provider_config::ProviderConfig;
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    pub definitions: BTreeMap<String, CompositeResourceDefinition>,
    pub compositions: BTreeMap<String, Composition>,
    pub provider_configs: BTreeMap<String, ProviderConfig>,
    /// Managed kind → プロバイダー名
    pub managed_kinds: BTreeMap<String, String>,
}

impl Catalog {
    pub fn definition_for_composite(&self, kind: &str) -> Option<&CompositeResourceDefinition> {
        self.definitions.values().find(|d| d.composite_kind == kind)
    }

    pub fn definition_for_claim(&self, kind: &str) -> Option<&CompositeResourceDefinition> {
        self.definitions
            .values()
            .find(|d| d.claim_kind.as_deref() == Some(kind))
    }

    /// 指定Composite kindを対象とするComposition（名前順）
    pub fn compositions_for<'a, 'k>(
        &'a self,
        kind: &'k str,
    ) -> impl Iterator<Item = &'a Composition> + use<'a, 'k> {
        self.compositions
            .values()
            .filter(move |c| c.composite_kind == kind)
    }

    pub fn is_composite_kind(&self, kind: &str) -> bool {
        self.definition_for_composite(kind).is_some()
    }

    pub fn is_claim_kind(&self, kind: &str) -> bool {
        self.definition_for_claim(kind).is_some()
    }

    /// Compositionが生成する全ての子kind（`managed-kind` 宣言と合わせてManaged kindとみなす）
    pub fn composed_kinds(&self) -> impl Iterator<Item = &str> {
        self.compositions
            .values()
            .flat_map(|c| c.resources.iter().map(|r| r.kind.as_str()))
    }

    /// 既存のカタログに別のカタログを取り込む
    ///
    /// 既存のXRDを置き換える場合は [`CompositeResourceDefinition::check_update`] を通す。
    pub fn merge(&mut self, other: Catalog, instances_exist: impl Fn(&str) -> bool) -> Result<()> {
        for (name, definition) in other.definitions {
            if let Some(existing) = self.definitions.get(&name) {
                existing.check_update(&definition, instances_exist(&existing.composite_kind))?;
            }
            self.definitions.insert(name, definition);
        }
        self.compositions.extend(other.compositions);
        self.provider_configs.extend(other.provider_configs);
        self.managed_kinds.extend(other.managed_kinds);
        Ok(())
    }

    /// 参照整合性を検証
    pub fn validate(&self) -> Result<()> {
        for composition in self.compositions.values() {
            if !self.is_composite_kind(&composition.composite_kind) {
                return Err(CoreError::InvalidConfig(format!(
                    "composition '{}' targets unknown composite kind '{}'",
                    composition.name, composition.composite_kind
                )));
            }
            let mut seen = std::collections::BTreeSet::new();
            for resource in &composition.resources {
                if !seen.insert(resource.name.as_str()) {
                    return Err(CoreError::InvalidConfig(format!(
                        "composition '{}' declares resource '{}' twice",
                        composition.name, resource.name
                    )));
                }
                if self.is_composite_kind(&resource.kind) || self.is_claim_kind(&resource.kind) {
                    return Err(CoreError::InvalidConfig(format!(
                        "composition '{}' resource '{}' must be a managed kind, got '{}'",
                        composition.name, resource.name, resource.kind
                    )));
                }
            }
        }
        for definition in self.definitions.values() {
            if let Some(default) = &definition.default_composition
                && !self.compositions.contains_key(default)
            {
                return Err(CoreError::InvalidConfig(format!(
                    "definition '{}' names unknown default composition '{}'",
                    definition.name, default
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceTemplate;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::default();
        catalog.definitions.insert(
            "xdb".to_string(),
            CompositeResourceDefinition {
                name: "xdb".to_string(),
                composite_kind: "ApplicationDatabase".to_string(),
                claim_kind: Some("DatabaseClaim".to_string()),
                ..Default::default()
            },
        );
        for name in ["b-comp", "a-comp"] {
            catalog.compositions.insert(
                name.to_string(),
                Composition {
                    name: name.to_string(),
                    composite_kind: "ApplicationDatabase".to_string(),
                    resources: vec![ResourceTemplate {
                        name: "vpc".to_string(),
                        kind: "VPC".to_string(),
                        ..Default::default()
                    }],
                    ..Default::default()
                },
            );
        }
        catalog
    }

    #[test]
    fn test_lookup() {
        let catalog = catalog();
        assert!(catalog.is_composite_kind("ApplicationDatabase"));
        assert!(catalog.is_claim_kind("DatabaseClaim"));
        assert!(!catalog.is_composite_kind("VPC"));

        let names: Vec<&str> = catalog
            .compositions_for("ApplicationDatabase")
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["a-comp", "b-comp"]);
        assert!(catalog.validate().is_ok());
    }

    #[test]
    fn test_validate_unknown_target() {
        let mut catalog = catalog();
        catalog.compositions.insert(
            "orphan".to_string(),
            Composition {
                name: "orphan".to_string(),
                composite_kind: "Nope".to_string(),
                ..Default::default()
            },
        );
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn test_merge_rejects_incompatible_definition() {
        let mut catalog = catalog();
        let mut next = Catalog::default();
        next.definitions.insert(
            "xdb".to_string(),
            CompositeResourceDefinition {
                name: "xdb".to_string(),
                composite_kind: "OtherDatabase".to_string(),
                ..Default::default()
            },
        );
        assert!(catalog.clone().merge(next.clone(), |_| false).is_ok());
        assert!(catalog.merge(next, |_| true).is_err());
    }
}
