//! Previously composed children
//!
//! What the store held for a composite's children at the start of a pass,
//! keyed by the template name that produced each child.

use driftwood_core::{READY, Resource, annotations};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct PriorState {
    children: BTreeMap<String, Resource>,
}

impl PriorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index children by their `composition-resource` annotation. Children
    /// without the annotation were not produced by a composition and are
    /// left out.
    pub fn from_children(children: impl IntoIterator<Item = Resource>) -> Self {
        let children = children
            .into_iter()
            .filter_map(|child| {
                let template = child.annotation(annotations::COMPOSITION_RESOURCE)?.to_string();
                Some((template, child))
            })
            .collect();
        Self { children }
    }

    pub fn insert(&mut self, template: impl Into<String>, child: Resource) {
        self.children.insert(template.into(), child);
    }

    pub fn get(&self, template: &str) -> Option<&Resource> {
        self.children.get(template)
    }

    pub fn is_ready(&self, template: &str) -> bool {
        self.get(template)
            .is_some_and(|child| child.status.conditions.is_true(READY))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Resource)> {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}
