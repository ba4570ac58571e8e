//! definition ノードのパース

use super::value::{first_string, kdl_value_to_json, prop_bool, prop_string};
use crate::error::{CoreError, Result};
use crate::model::{CompositeResourceDefinition, FieldType, SchemaField};
use kdl::KdlNode;

/// definition ノードをパース
pub fn parse_definition(node: &KdlNode) -> Result<(String, CompositeResourceDefinition)> {
    let name = first_string(node)
        .ok_or_else(|| CoreError::InvalidConfig("definition requires a name".to_string()))?;

    let mut definition = CompositeResourceDefinition {
        name: name.clone(),
        ..Default::default()
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "group" => definition.group = first_string(child),
                "composite-kind" | "composite_kind" => {
                    definition.composite_kind = first_string(child).unwrap_or_default();
                }
                "claim-kind" | "claim_kind" => definition.claim_kind = first_string(child),
                "default-composition" | "default_composition" => {
                    definition.default_composition = first_string(child);
                }
                "field" => definition.fields.push(parse_field(&name, child)?),
                _ => {}
            }
        }
    }

    if definition.composite_kind.is_empty() {
        return Err(CoreError::InvalidConfig(format!(
            "definition '{}' requires composite-kind",
            name
        )));
    }

    Ok((name, definition))
}

/// field "size" type="string" required=#true default="small"
fn parse_field(definition: &str, node: &KdlNode) -> Result<SchemaField> {
    let name = first_string(node).ok_or_else(|| {
        CoreError::InvalidConfig(format!("definition '{}': field requires a name", definition))
    })?;

    let field_type = match prop_string(node, "type") {
        Some(t) => FieldType::parse(&t).ok_or_else(|| {
            CoreError::InvalidConfig(format!(
                "definition '{}': field '{}' has unknown type '{}'",
                definition, name, t
            ))
        })?,
        None => FieldType::Any,
    };

    Ok(SchemaField {
        name,
        field_type,
        required: prop_bool(node, "required").unwrap_or(false),
        default: node.get("default").map(kdl_value_to_json),
    })
}
