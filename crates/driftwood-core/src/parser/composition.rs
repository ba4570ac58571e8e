//! composition ノードのパース

use super::value::{
    children_to_json, first_string, kdl_value_to_json, prop_bool, prop_f64, prop_string, props,
};
use crate::error::{CoreError, Result};
use crate::model::{
    Composition, ConvertTarget, Patch, PatchPolicy, PipelineStep, ResourceTemplate, StringCase,
    Transform,
};
use kdl::KdlNode;
use std::collections::BTreeMap;

/// composition ノードをパース
pub fn parse_composition(node: &KdlNode) -> Result<(String, Composition)> {
    let name = first_string(node)
        .ok_or_else(|| CoreError::InvalidConfig("composition requires a name".to_string()))?;

    let mut composition = Composition {
        name: name.clone(),
        ..Default::default()
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "composite-kind" | "composite_kind" => {
                    composition.composite_kind = first_string(child).unwrap_or_default();
                }
                "labels" => {
                    // labels provider="aws" tier="gold"
                    for (key, value) in props(child) {
                        if let Some(v) = value.as_string() {
                            composition.labels.insert(key.to_string(), v.to_string());
                        }
                    }
                }
                "resource" => composition.resources.push(parse_resource(&name, child)?),
                "pipeline" => {
                    if let Some(steps) = child.children() {
                        for step in steps.nodes() {
                            if step.name().value() == "step" {
                                composition.pipeline.push(parse_step(&name, step)?);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }

    if composition.composite_kind.is_empty() {
        return Err(CoreError::InvalidConfig(format!(
            "composition '{}' requires composite-kind",
            name
        )));
    }

    Ok((name, composition))
}

/// resource "rds" kind="RDSInstance" { base {...} patch ... }
fn parse_resource(composition: &str, node: &KdlNode) -> Result<ResourceTemplate> {
    let name = first_string(node).ok_or_else(|| {
        CoreError::InvalidConfig(format!(
            "composition '{}': resource requires a name",
            composition
        ))
    })?;
    let kind = prop_string(node, "kind").ok_or_else(|| {
        CoreError::InvalidConfig(format!(
            "composition '{}': resource '{}' requires kind=",
            composition, name
        ))
    })?;

    let mut template = ResourceTemplate {
        name,
        kind,
        api_version: prop_string(node, "api-version"),
        base: serde_json::Value::Object(Default::default()),
        patches: Vec::new(),
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            let context = || format!("composition '{}' resource '{}'", composition, template.name);
            match child.name().value() {
                "base" => template.base = children_to_json(child),
                "patch" => {
                    let from = required_prop(child, "from", &context)?;
                    let to = required_prop(child, "to", &context)?;
                    let policy = if prop_bool(child, "optional").unwrap_or(false) {
                        PatchPolicy::Optional
                    } else {
                        PatchPolicy::Required
                    };
                    template.patches.push(Patch::FromComposite {
                        from,
                        to,
                        transforms: parse_transforms(child, &context)?,
                        policy,
                    });
                }
                "interpolate" => {
                    let template_str = first_string(child).ok_or_else(|| {
                        CoreError::InvalidConfig(format!(
                            "{}: interpolate requires a template string",
                            context()
                        ))
                    })?;
                    let to = required_prop(child, "to", &context)?;
                    template.patches.push(Patch::Interpolate {
                        template: template_str,
                        to,
                        transforms: parse_transforms(child, &context)?,
                    });
                }
                "to-composite" | "to_composite" => {
                    let from = required_prop(child, "from", &context)?;
                    let to = required_prop(child, "to", &context)?;
                    template.patches.push(Patch::ToComposite {
                        from,
                        to,
                        transforms: parse_transforms(child, &context)?,
                    });
                }
                _ => {}
            }
        }
    }

    Ok(template)
}

fn required_prop(node: &KdlNode, key: &str, context: &dyn Fn() -> String) -> Result<String> {
    prop_string(node, key).ok_or_else(|| {
        CoreError::InvalidConfig(format!(
            "{}: {} requires {}=",
            context(),
            node.name().value(),
            key
        ))
    })
}

/// パッチの子ブロックに並んだ変換をパース
fn parse_transforms(node: &KdlNode, context: &dyn Fn() -> String) -> Result<Vec<Transform>> {
    let Some(children) = node.children() else {
        return Ok(Vec::new());
    };

    let mut transforms = Vec::new();
    for child in children.nodes() {
        let transform = match child.name().value() {
            "map" => {
                // map small="db.t3.micro" medium="db.t3.medium" default="db.t3.small"
                let mut pairs = BTreeMap::new();
                let mut default = None;
                for (key, value) in props(child) {
                    if key == "default" {
                        default = Some(kdl_value_to_json(value));
                    } else {
                        pairs.insert(key.to_string(), kdl_value_to_json(value));
                    }
                }
                Transform::Map { pairs, default }
            }
            "math" => Transform::Math {
                multiply: prop_f64(child, "multiply"),
                add: prop_f64(child, "add"),
                clamp_min: prop_f64(child, "clamp-min"),
                clamp_max: prop_f64(child, "clamp-max"),
            },
            "string" => {
                let case = match prop_string(child, "case").as_deref() {
                    None => None,
                    Some("upper") => Some(StringCase::Upper),
                    Some("lower") => Some(StringCase::Lower),
                    Some(other) => {
                        return Err(CoreError::InvalidConfig(format!(
                            "{}: unknown string case '{}'",
                            context(),
                            other
                        )));
                    }
                };
                Transform::String {
                    format: prop_string(child, "format"),
                    case,
                    trim_prefix: prop_string(child, "trim-prefix"),
                    trim_suffix: prop_string(child, "trim-suffix"),
                }
            }
            "convert" => {
                let to = match prop_string(child, "to").as_deref() {
                    Some("string") => ConvertTarget::String,
                    Some("integer") | Some("int") => ConvertTarget::Integer,
                    Some("float") | Some("number") => ConvertTarget::Float,
                    Some("boolean") | Some("bool") => ConvertTarget::Boolean,
                    other => {
                        return Err(CoreError::InvalidConfig(format!(
                            "{}: convert requires to=string|integer|float|boolean, got {:?}",
                            context(),
                            other
                        )));
                    }
                };
                Transform::Convert { to }
            }
            other => {
                return Err(CoreError::InvalidConfig(format!(
                    "{}: unknown transform '{}'",
                    context(),
                    other
                )));
            }
        };
        transforms.push(transform);
    }

    Ok(transforms)
}

/// step "add-labels" { team "platform" }
fn parse_step(composition: &str, node: &KdlNode) -> Result<PipelineStep> {
    let function_ref = first_string(node).ok_or_else(|| {
        CoreError::InvalidConfig(format!(
            "composition '{}': pipeline step requires a function name",
            composition
        ))
    })?;
    Ok(PipelineStep {
        function_ref,
        config: children_to_json(node),
    })
}
