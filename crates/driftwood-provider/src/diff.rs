//! Desired vs. observed comparison
//!
//! Only fields present in the desired document are compared. Fields the
//! external system adds on its own (ids, endpoints, timestamps) never cause
//! drift, and callers can suppress further fields with [`DiffPolicy::ignore`].

use driftwood_core::FieldPath;
use driftwood_core::fieldpath::Segment;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub path: String,
    pub desired: Value,
    /// `None` when the observed document lacks the field entirely
    pub observed: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct DiffPolicy {
    ignored: Vec<FieldPath>,
}

impl DiffPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never report differences at or below `path`.
    pub fn ignore(mut self, path: FieldPath) -> Self {
        self.ignored.push(path);
        self
    }

    pub fn ignored(&self) -> &[FieldPath] {
        &self.ignored
    }

    /// Walk `desired` and collect every leaf that differs from `observed`.
    pub fn diff(&self, desired: &Value, observed: &Value) -> Vec<FieldDiff> {
        let mut diffs = Vec::new();
        let mut path = Vec::new();
        self.walk(desired, Some(observed), &mut path, &mut diffs);
        diffs
    }

    pub fn is_up_to_date(&self, desired: &Value, observed: &Value) -> bool {
        self.diff(desired, observed).is_empty()
    }

    fn is_ignored(&self, path: &[Segment]) -> bool {
        self.ignored.iter().any(|ignored| ignored.is_prefix_of(path))
    }

    fn walk(
        &self,
        desired: &Value,
        observed: Option<&Value>,
        path: &mut Vec<Segment>,
        diffs: &mut Vec<FieldDiff>,
    ) {
        if !path.is_empty() && self.is_ignored(path) {
            return;
        }

        match (desired, observed) {
            (Value::Object(want), Some(Value::Object(have))) => {
                for (name, value) in want {
                    path.push(Segment::Field(name.clone()));
                    self.walk(value, have.get(name), path, diffs);
                    path.pop();
                }
            }
            // A null in desired means "unset": nothing to enforce.
            (Value::Null, _) => {}
            (want, have) if have.is_some_and(|have| values_equal(want, have)) => {}
            (want, have) => {
                let path = FieldPath::from_segments(path.clone())
                    .map(|p| p.to_string())
                    .unwrap_or_default();
                diffs.push(FieldDiff {
                    path,
                    desired: want.clone(),
                    observed: have.cloned(),
                });
            }
        }
    }
}

/// Equality that treats `20` and `20.0` as the same number.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => a == b,
    }
}
