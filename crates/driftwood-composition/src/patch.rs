//! Patch application
//!
//! Child documents are built as `{"metadata": {...}, "spec": {...}}` so patch
//! targets read the same way they do on a stored object.

use crate::error::{CompositionError, Result};
use crate::transform;
use driftwood_core::{FieldPath, Patch, PatchPolicy, TemplateProcessor};
use serde_json::{Map, Value};

/// Apply one composite → child patch to `child`.
///
/// [`Patch::ToComposite`] is ignored here; see [`collect_to_composite`].
pub fn apply_to_child(
    resource: &str,
    patch: &Patch,
    composite: &Value,
    templates: &mut TemplateProcessor,
    child: &mut Value,
) -> Result<()> {
    let (value, to) = match patch {
        Patch::FromComposite { from, to, policy, .. } => {
            let path = FieldPath::parse(from)?;
            match path.get(composite) {
                Some(value) if !value.is_null() => (value.clone(), to),
                _ if *policy == PatchPolicy::Optional => return Ok(()),
                _ => {
                    return Err(CompositionError::MissingSource {
                        resource: resource.to_string(),
                        path: from.clone(),
                    });
                }
            }
        }
        Patch::Interpolate { template, to, .. } => {
            (Value::String(templates.render_str(template)?), to)
        }
        Patch::ToComposite { .. } => return Ok(()),
    };

    let value = transform::apply_all(patch.transforms(), value).map_err(|message| {
        CompositionError::Transform {
            resource: resource.to_string(),
            message,
        }
    })?;
    FieldPath::parse(to)?.set(child, value)?;
    Ok(())
}

/// Evaluate the `to-composite` patches of one template against the child's
/// stored document and write the results into `fields`.
///
/// `to` paths start with `status.`; that segment is stripped because
/// `fields` is the composite's free-form status map. A missing source is
/// skipped: the child may simply not have been observed yet.
pub fn collect_to_composite(
    resource: &str,
    patches: &[Patch],
    child: &Value,
    fields: &mut Map<String, Value>,
) -> Result<()> {
    for patch in patches {
        let Patch::ToComposite { from, to, transforms } = patch else {
            continue;
        };
        let Some(value) = FieldPath::parse(from)?.get(child).filter(|v| !v.is_null()) else {
            continue;
        };
        let value = transform::apply_all(transforms, value.clone()).map_err(|message| {
            CompositionError::Transform {
                resource: resource.to_string(),
                message,
            }
        })?;

        let target = FieldPath::parse(to)?;
        let target = if target.starts_with_field("status") {
            target.strip_first().ok_or_else(|| {
                CompositionError::InvalidComposite(format!(
                    "to-composite target '{}' must name a field below status",
                    to
                ))
            })?
        } else {
            target
        };

        let mut container = Value::Object(std::mem::take(fields));
        let written = target.set(&mut container, value);
        if let Value::Object(map) = container {
            *fields = map;
        }
        written?;
    }
    Ok(())
}
