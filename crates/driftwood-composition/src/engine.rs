//! Composition engine
//!
//! `compose(composite, composition, prior)` is a pure function: no clock,
//! no environment, no randomness. Identical inputs yield identical ordered
//! output, which keeps composite reconciliation idempotent.

use crate::error::{CompositionError, Result};
use crate::patch;
use crate::pipeline::{FunctionRegistry, FunctionRequest};
use crate::prior::PriorState;
use driftwood_core::{
    Composition, Resource, ResourceKey, TemplateProcessor, annotations,
};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// apiVersion for children whose template does not name one
pub const DEFAULT_CHILD_API_VERSION: &str = "sim.driftwood.io/v1";

/// Label carrying the owning composite's name on every child
pub const COMPOSITE_LABEL: &str = "driftwood.io/composite";

/// One child produced by a composition.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedResource {
    /// Template name within the composition
    pub template: String,
    pub key: ResourceKey,
    pub api_version: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub spec: Value,
}

impl ComposedResource {
    /// Desired child object, controlled by `owner`.
    pub fn to_resource(&self, owner: &ResourceKey) -> Resource {
        let mut resource = Resource::new(self.api_version.clone(), &self.key, self.spec.clone())
            .with_owner(owner);
        resource.metadata.labels = self.labels.clone();
        resource.metadata.annotations = self.annotations.clone();
        resource
    }
}

/// Engine output: children in composition order, plus the templates a
/// pipeline step held back this pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Composed {
    pub resources: Vec<ComposedResource>,
    pub withheld: BTreeSet<String>,
}

impl Composed {
    pub fn names(&self) -> Vec<&str> {
        self.resources.iter().map(|r| r.template.as_str()).collect()
    }

    pub fn get(&self, template: &str) -> Option<&ComposedResource> {
        self.resources.iter().find(|r| r.template == template)
    }

    /// Hold `template` back. An existing child keeps its prior spec and
    /// labels; a child that does not exist yet is dropped from the output.
    pub fn withhold(&mut self, template: &str, prior: Option<&Resource>) {
        match prior {
            Some(prior) => {
                if let Some(resource) = self.resources.iter_mut().find(|r| r.template == template) {
                    resource.spec = prior.spec.clone();
                    resource.labels = prior.metadata.labels.clone();
                }
            }
            None => self.resources.retain(|r| r.template != template),
        }
        self.withheld.insert(template.to_string());
    }

    /// Whether a stored child with this template name should survive
    /// garbage collection.
    pub fn retains(&self, template: &str) -> bool {
        self.withheld.contains(template) || self.get(template).is_some()
    }
}

#[derive(Debug, Clone)]
pub struct CompositionEngine {
    functions: FunctionRegistry,
}

impl Default for CompositionEngine {
    fn default() -> Self {
        Self::new(FunctionRegistry::with_builtins())
    }
}

impl CompositionEngine {
    pub fn new(functions: FunctionRegistry) -> Self {
        Self { functions }
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Derive the children of `composite`.
    ///
    /// Order of application per child: base, then patches in declaration
    /// order. Pipeline steps then run over the full child list in
    /// declaration order. Any failure aborts the whole composition.
    pub fn compose(
        &self,
        composite: &Resource,
        composition: &Composition,
        prior: &PriorState,
    ) -> Result<Composed> {
        if composition.composite_kind != composite.kind {
            return Err(CompositionError::KindMismatch {
                composition: composition.name.clone(),
                target: composition.composite_kind.clone(),
                kind: composite.kind.clone(),
            });
        }

        let document = serde_json::to_value(composite)?;
        let mut templates = TemplateProcessor::from_value(&json!({
            "name": composite.metadata.name,
            "namespace": composite.metadata.namespace,
            "labels": composite.metadata.labels,
            "spec": composite.spec,
        }))?;

        let mut resources = Vec::with_capacity(composition.resources.len());
        for template in &composition.resources {
            let base = match &template.base {
                Value::Null => Value::Object(Map::new()),
                other => other.clone(),
            };
            let mut child = json!({"metadata": {"labels": {}}, "spec": base});
            for p in template.patches.iter().filter(|p| p.applies_to_child()) {
                patch::apply_to_child(&template.name, p, &document, &mut templates, &mut child)?;
            }

            let mut labels = string_map(&template.name, child.pointer("/metadata/labels"))?;
            labels.insert(COMPOSITE_LABEL.to_string(), composite.metadata.name.clone());
            let annotations = BTreeMap::from([(
                annotations::COMPOSITION_RESOURCE.to_string(),
                template.name.clone(),
            )]);

            resources.push(ComposedResource {
                template: template.name.clone(),
                key: ResourceKey {
                    kind: template.kind.clone(),
                    namespace: composite.metadata.namespace.clone(),
                    name: child_name(&composite.metadata.name, &template.name),
                },
                api_version: template
                    .api_version
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CHILD_API_VERSION.to_string()),
                labels,
                annotations,
                spec: child.get("spec").cloned().unwrap_or(Value::Null),
            });
        }

        let mut composed = Composed {
            resources,
            withheld: BTreeSet::new(),
        };
        for step in &composition.pipeline {
            let function = self.functions.get(&step.function_ref)?;
            composed = function.run(
                composed,
                &FunctionRequest {
                    composite: &document,
                    config: &step.config,
                    prior,
                },
            )?;
        }

        debug!(
            composite = %composite.key(),
            composition = %composition.name,
            children = composed.resources.len(),
            withheld = composed.withheld.len(),
            "Composed children"
        );
        Ok(composed)
    }

    /// Status fields the composite receives from its children through
    /// `to-composite` patches.
    pub fn collect_status(
        &self,
        composition: &Composition,
        children: &PriorState,
    ) -> Result<Map<String, Value>> {
        let mut fields = Map::new();
        for template in &composition.resources {
            let Some(child) = children.get(&template.name) else {
                continue;
            };
            let document = serde_json::to_value(child)?;
            patch::collect_to_composite(&template.name, &template.patches, &document, &mut fields)?;
        }
        Ok(fields)
    }
}

/// `{composite}-{template}`
pub fn child_name(composite: &str, template: &str) -> String {
    format!("{}-{}", composite, template)
}

fn string_map(resource: &str, value: Option<&Value>) -> Result<BTreeMap<String, String>> {
    let Some(Value::Object(map)) = value else {
        return Ok(BTreeMap::new());
    };
    map.iter()
        .map(|(k, v)| match v {
            Value::String(s) => Ok((k.clone(), s.clone())),
            other => Err(CompositionError::Transform {
                resource: resource.to_string(),
                message: format!("label '{}' must be a string, got {}", k, other),
            }),
        })
        .collect()
}
