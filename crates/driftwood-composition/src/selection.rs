//! Composition selection
//!
//! Precedence: pinned annotation, `spec.compositionRef.name`,
//! `spec.compositionSelector.matchLabels` (smallest matching name), then the
//! definition's default composition.

use crate::error::{CompositionError, Result};
use driftwood_core::{Catalog, Composition, Resource, annotations};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectedBy {
    Pinned,
    Reference,
    Selector,
    Default,
}

impl std::fmt::Display for SelectedBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectedBy::Pinned => write!(f, "pinned"),
            SelectedBy::Reference => write!(f, "compositionRef"),
            SelectedBy::Selector => write!(f, "compositionSelector"),
            SelectedBy::Default => write!(f, "default"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Selection<'a> {
    pub composition: &'a Composition,
    pub selected_by: SelectedBy,
}

impl Selection<'_> {
    /// Whether the choice still has to be pinned on the composite.
    pub fn needs_pin(&self) -> bool {
        self.selected_by != SelectedBy::Pinned
    }
}

pub fn select_composition<'a>(catalog: &'a Catalog, composite: &Resource) -> Result<Selection<'a>> {
    let kind = composite.kind.as_str();
    let lookup = |name: &str, selected_by: SelectedBy| -> Result<Selection<'a>> {
        let composition = catalog
            .compositions
            .get(name)
            .ok_or_else(|| CompositionError::CompositionNotFound(name.to_string()))?;
        if composition.composite_kind != kind {
            return Err(CompositionError::KindMismatch {
                composition: name.to_string(),
                target: composition.composite_kind.clone(),
                kind: kind.to_string(),
            });
        }
        Ok(Selection {
            composition,
            selected_by,
        })
    };

    if let Some(pinned) = composite.annotation(annotations::COMPOSITION) {
        return lookup(pinned, SelectedBy::Pinned);
    }

    if let Some(name) = composite
        .spec
        .pointer("/compositionRef/name")
        .and_then(Value::as_str)
    {
        return lookup(name, SelectedBy::Reference);
    }

    if let Some(match_labels) = composite
        .spec
        .pointer("/compositionSelector/matchLabels")
        .and_then(Value::as_object)
    {
        let selector: BTreeMap<String, String> = match_labels
            .iter()
            .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
            .collect();
        if let Some(composition) = catalog
            .compositions_for(kind)
            .find(|c| c.matches_labels(&selector))
        {
            return Ok(Selection {
                composition,
                selected_by: SelectedBy::Selector,
            });
        }
    }

    if let Some(default) = catalog
        .definition_for_composite(kind)
        .and_then(|d| d.default_composition.as_deref())
    {
        return lookup(default, SelectedBy::Default);
    }

    Err(CompositionError::NoCompositionSelected(composite.key().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftwood_core::{CompositeResourceDefinition, ResourceKey};
    use serde_json::json;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::default();
        for (name, provider) in [("aws-database", "aws"), ("aws-database-ha", "aws"), ("gcp-database", "gcp")] {
            catalog.compositions.insert(
                name.to_string(),
                Composition {
                    name: name.to_string(),
                    composite_kind: "ApplicationDatabase".to_string(),
                    labels: BTreeMap::from([("provider".to_string(), provider.to_string())]),
                    ..Default::default()
                },
            );
        }
        catalog.definitions.insert(
            "applicationdatabases.example.org".to_string(),
            CompositeResourceDefinition {
                name: "applicationdatabases.example.org".to_string(),
                group: Some("example.org".to_string()),
                composite_kind: "ApplicationDatabase".to_string(),
                default_composition: Some("gcp-database".to_string()),
                ..Default::default()
            },
        );
        catalog
    }

    fn composite(spec: Value) -> Resource {
        Resource::new("example.org/v1", &ResourceKey::new("ApplicationDatabase", "orders"), spec)
    }

    #[test]
    fn test_precedence() {
        let catalog = catalog();

        let pinned = composite(json!({"compositionRef": {"name": "gcp-database"}}))
            .with_annotation(annotations::COMPOSITION, "aws-database");
        let selection = select_composition(&catalog, &pinned).unwrap();
        assert_eq!(selection.composition.name, "aws-database");
        assert!(!selection.needs_pin());

        let by_ref = composite(json!({"compositionRef": {"name": "aws-database-ha"}}));
        let selection = select_composition(&catalog, &by_ref).unwrap();
        assert_eq!(selection.composition.name, "aws-database-ha");
        assert_eq!(selection.selected_by, SelectedBy::Reference);

        let by_labels = composite(json!({"compositionSelector": {"matchLabels": {"provider": "aws"}}}));
        let selection = select_composition(&catalog, &by_labels).unwrap();
        assert_eq!(selection.composition.name, "aws-database");
        assert_eq!(selection.selected_by, SelectedBy::Selector);

        let fallback = composite(json!({"size": "small"}));
        let selection = select_composition(&catalog, &fallback).unwrap();
        assert_eq!(selection.composition.name, "gcp-database");
        assert_eq!(selection.selected_by, SelectedBy::Default);
    }

    #[test]
    fn test_unmatched_selector_falls_back_to_default() {
        let catalog = catalog();
        let unmatched = composite(json!({"compositionSelector": {"matchLabels": {"provider": "azure"}}}));
        assert_eq!(
            select_composition(&catalog, &unmatched).unwrap().composition.name,
            "gcp-database"
        );
    }

    #[test]
    fn test_errors() {
        let mut catalog = catalog();
        let missing = composite(json!({"compositionRef": {"name": "nope"}}));
        assert!(matches!(
            select_composition(&catalog, &missing),
            Err(CompositionError::CompositionNotFound(_))
        ));

        catalog.definitions.clear();
        assert!(matches!(
            select_composition(&catalog, &composite(json!({}))),
            Err(CompositionError::NoCompositionSelected(_))
        ));
    }
}
