//! Pipeline functions
//!
//! Each step receives the previous step's output plus the original
//! composite document. A failing step aborts the whole composition; the
//! output of earlier steps is discarded with it.

use crate::engine::Composed;
use crate::error::{CompositionError, Result};
use crate::prior::PriorState;
use crate::transform::scalar_to_string;
use driftwood_core::FieldPath;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Input handed to every pipeline step alongside the composed resources.
pub struct FunctionRequest<'a> {
    /// The composite resource as a JSON document
    pub composite: &'a Value,
    /// The step's `config` block
    pub config: &'a Value,
    pub prior: &'a PriorState,
}

pub trait CompositionFunction: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, input: Composed, request: &FunctionRequest<'_>) -> Result<Composed>;
}

#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, Arc<dyn CompositionFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(AddLabels));
        registry.register(Arc::new(SetField));
        registry.register(Arc::new(Sequence));
        registry.register(Arc::new(RequireFields));
        registry
    }

    pub fn register(&mut self, function: Arc<dyn CompositionFunction>) {
        self.functions.insert(function.name().to_string(), function);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn CompositionFunction>> {
        self.functions
            .get(name)
            .cloned()
            .ok_or_else(|| CompositionError::UnknownFunction(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.functions.keys()).finish()
    }
}

/// `config` as an object, or an error naming the function.
fn config_object<'a>(
    function: &str,
    config: &'a Value,
) -> Result<&'a serde_json::Map<String, Value>> {
    config
        .as_object()
        .ok_or_else(|| CompositionError::function(function, "config must be a block of fields"))
}

/// A single string or a list of strings.
fn string_list(function: &str, field: &str, value: Option<&Value>) -> Result<Vec<String>> {
    let invalid = || CompositionError::function(function, format!("'{}' must list names", field));
    match value {
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(invalid))
            .collect(),
        _ => Err(invalid()),
    }
}

/// `add-labels`: merge config key/values into every child's labels.
pub struct AddLabels;

impl CompositionFunction for AddLabels {
    fn name(&self) -> &str {
        "add-labels"
    }

    fn run(&self, mut input: Composed, request: &FunctionRequest<'_>) -> Result<Composed> {
        let labels = config_object(self.name(), request.config)?
            .iter()
            .map(|(key, value)| {
                scalar_to_string(value)
                    .map(|value| (key.clone(), value))
                    .ok_or_else(|| {
                        CompositionError::function(self.name(), format!("label '{}' is not a scalar", key))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        for resource in &mut input.resources {
            resource.labels.extend(labels.iter().cloned());
        }
        Ok(input)
    }
}

/// `set-field`: `{ resource, path, value }` writes a literal into one child.
pub struct SetField;

impl CompositionFunction for SetField {
    fn name(&self) -> &str {
        "set-field"
    }

    fn run(&self, mut input: Composed, request: &FunctionRequest<'_>) -> Result<Composed> {
        let config = config_object(self.name(), request.config)?;
        let resource = config
            .get("resource")
            .and_then(Value::as_str)
            .ok_or_else(|| CompositionError::function(self.name(), "missing 'resource'"))?;
        let path = config
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| CompositionError::function(self.name(), "missing 'path'"))?;
        let value = config
            .get("value")
            .cloned()
            .ok_or_else(|| CompositionError::function(self.name(), "missing 'value'"))?;

        let path = FieldPath::parse(path)?;
        let target = path
            .strip_first()
            .filter(|_| path.starts_with_field("spec"))
            .ok_or_else(|| {
                CompositionError::function(self.name(), format!("path '{}' must be below spec", path))
            })?;

        // Withheld children are not in the output and cannot be modified.
        let Some(child) = input.resources.iter_mut().find(|r| r.template == resource) else {
            if input.withheld.contains(resource) {
                return Ok(input);
            }
            return Err(CompositionError::function(
                self.name(),
                format!("no resource named '{}'", resource),
            ));
        };
        target.set(&mut child.spec, value)?;
        Ok(input)
    }
}

/// `sequence`: `{ order: [a, b, c] }` withholds each child until every
/// earlier child is Ready in the prior state.
///
/// A withheld child that already exists keeps its prior spec; sequencing
/// never deletes anything.
pub struct Sequence;

impl CompositionFunction for Sequence {
    fn name(&self) -> &str {
        "sequence"
    }

    fn run(&self, mut input: Composed, request: &FunctionRequest<'_>) -> Result<Composed> {
        let config = config_object(self.name(), request.config)?;
        let order = string_list(self.name(), "order", config.get("order"))?;

        for name in &order {
            if !input.resources.iter().any(|r| &r.template == name) && !input.withheld.contains(name)
            {
                return Err(CompositionError::function(
                    self.name(),
                    format!("no resource named '{}'", name),
                ));
            }
        }

        let mut predecessors_ready = true;
        for name in &order {
            if !predecessors_ready {
                input.withhold(name, request.prior.get(name));
            }
            predecessors_ready &= request.prior.is_ready(name);
        }
        Ok(input)
    }
}

/// `require-fields`: fail unless every listed field is present in the
/// composite's spec.
pub struct RequireFields;

impl CompositionFunction for RequireFields {
    fn name(&self) -> &str {
        "require-fields"
    }

    fn run(&self, input: Composed, request: &FunctionRequest<'_>) -> Result<Composed> {
        let config = config_object(self.name(), request.config)?;
        let fields = string_list(self.name(), "fields", config.get("fields"))?;
        let spec = request.composite.get("spec").unwrap_or(&Value::Null);

        let missing: Vec<&str> = fields
            .iter()
            .map(String::as_str)
            .filter(|field| {
                FieldPath::parse(field)
                    .ok()
                    .and_then(|path| path.get(spec).cloned())
                    .is_none_or(|value| value.is_null())
            })
            .collect();
        if !missing.is_empty() {
            return Err(CompositionError::function(
                self.name(),
                format!("missing required fields: {}", missing.join(", ")),
            ));
        }
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ComposedResource;
    use chrono::Utc;
    use driftwood_core::{Condition, Resource, ResourceKey, annotations};
    use serde_json::json;

    fn composed(names: &[&str]) -> Composed {
        Composed {
            resources: names
                .iter()
                .map(|name| ComposedResource {
                    template: name.to_string(),
                    key: ResourceKey::new("VPC", format!("orders-{}", name)),
                    api_version: "sim.driftwood.io/v1".to_string(),
                    labels: BTreeMap::new(),
                    annotations: BTreeMap::new(),
                    spec: json!({"forProvider": {"name": name}}),
                })
                .collect(),
            withheld: Default::default(),
        }
    }

    fn run(function: &dyn CompositionFunction, input: Composed, config: Value, prior: &PriorState) -> Result<Composed> {
        let composite = json!({"spec": {"size": "small"}});
        function.run(
            input,
            &FunctionRequest {
                composite: &composite,
                config: &config,
                prior,
            },
        )
    }

    fn ready_child(template: &str, spec: Value) -> Resource {
        let mut child = Resource::new("v1", &ResourceKey::new("VPC", format!("orders-{}", template)), spec)
            .with_annotation(annotations::COMPOSITION_RESOURCE, template);
        child.status.conditions.set(Condition::available(Utc::now()));
        child
    }

    #[test]
    fn test_add_labels() {
        let output = run(&AddLabels, composed(&["a", "b"]), json!({"team": "platform"}), &PriorState::new()).unwrap();
        for resource in &output.resources {
            assert_eq!(resource.labels.get("team").map(String::as_str), Some("platform"));
        }
    }

    #[test]
    fn test_set_field() {
        let output = run(
            &SetField,
            composed(&["a", "b"]),
            json!({"resource": "b", "path": "spec.forProvider.multiAz", "value": true}),
            &PriorState::new(),
        )
        .unwrap();
        assert_eq!(output.resources[1].spec["forProvider"]["multiAz"], json!(true));
        assert!(output.resources[0].spec["forProvider"].get("multiAz").is_none());

        let err = run(
            &SetField,
            composed(&["a"]),
            json!({"resource": "zzz", "path": "spec.x", "value": 1}),
            &PriorState::new(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_sequence_withholds_until_ready() {
        let config = json!({"order": ["vpc", "rds"]});

        // nothing exists yet: only the first child is produced
        let output = run(&Sequence, composed(&["vpc", "rds"]), config.clone(), &PriorState::new()).unwrap();
        assert_eq!(output.names(), vec!["vpc"]);
        assert!(output.withheld.contains("rds"));

        // first child ready: everything is produced
        let mut prior = PriorState::new();
        prior.insert("vpc", ready_child("vpc", json!({})));
        let output = run(&Sequence, composed(&["vpc", "rds"]), config, &prior).unwrap();
        assert_eq!(output.names(), vec!["vpc", "rds"]);
        assert!(output.withheld.is_empty());
    }

    #[test]
    fn test_sequence_keeps_existing_withheld_child() {
        let mut prior = PriorState::new();
        let mut vpc = ready_child("vpc", json!({}));
        vpc.status.conditions = Default::default();
        prior.insert("vpc", vpc);
        prior.insert("rds", ready_child("rds", json!({"forProvider": {"old": true}})));

        let output = run(&Sequence, composed(&["vpc", "rds"]), json!({"order": ["vpc", "rds"]}), &prior).unwrap();
        assert_eq!(output.names(), vec!["vpc", "rds"]);
        assert_eq!(output.resources[1].spec, json!({"forProvider": {"old": true}}));
        assert!(output.withheld.contains("rds"));
    }

    #[test]
    fn test_require_fields() {
        let prior = PriorState::new();
        assert!(run(&RequireFields, composed(&["a"]), json!({"fields": "size"}), &prior).is_ok());
        let err = run(&RequireFields, composed(&["a"]), json!({"fields": ["size", "region"]}), &prior)
            .unwrap_err();
        assert!(err.to_string().contains("region"));
    }

    #[test]
    fn test_registry() {
        let registry = FunctionRegistry::with_builtins();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["add-labels", "require-fields", "sequence", "set-field"]
        );
        assert!(matches!(registry.get("nope"), Err(CompositionError::UnknownFunction(_))));
    }
}
