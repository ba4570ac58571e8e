//! Action selection for managed resources

use crate::client::Observation;
use crate::diff::{DiffPolicy, FieldDiff};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type of action to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a new external object
    Create,
    /// Update an existing external object
    Update,
    /// Delete the external object
    Delete,
    /// No changes needed
    NoOp,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// A decided action together with the drift that motivated it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub action_type: ActionType,
    pub diffs: Vec<FieldDiff>,
}

impl Action {
    pub fn noop() -> Self {
        Self {
            action_type: ActionType::NoOp,
            diffs: Vec::new(),
        }
    }

    /// Decide what a live (not terminating) resource needs.
    pub fn plan(observation: &Observation, desired: &Value, policy: &DiffPolicy) -> Self {
        match observation {
            Observation::Absent => Self {
                action_type: ActionType::Create,
                diffs: Vec::new(),
            },
            Observation::Exists(object) => {
                let diffs = policy.diff(desired, &object.state);
                let action_type = if diffs.is_empty() {
                    ActionType::NoOp
                } else {
                    ActionType::Update
                };
                Self { action_type, diffs }
            }
        }
    }

    /// Decide what a terminating resource needs.
    pub fn plan_delete(observation: &Observation) -> Self {
        match observation {
            Observation::Absent => Self::noop(),
            Observation::Exists(_) => Self {
                action_type: ActionType::Delete,
                diffs: Vec::new(),
            },
        }
    }

    /// One-line description for events and logs
    pub fn summary(&self) -> String {
        match self.action_type {
            ActionType::Update => {
                let paths: Vec<&str> = self.diffs.iter().map(|d| d.path.as_str()).collect();
                format!("update ({})", paths.join(", "))
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ExternalObject;
    use serde_json::json;

    fn exists(state: Value) -> Observation {
        Observation::Exists(ExternalObject {
            external_id: "ext-1".to_string(),
            state,
            ready: true,
        })
    }

    #[test]
    fn test_plan() {
        let desired = json!({"size": 20});
        let policy = DiffPolicy::default();

        assert_eq!(
            Action::plan(&Observation::Absent, &desired, &policy).action_type,
            ActionType::Create
        );
        assert_eq!(
            Action::plan(&exists(json!({"size": 20, "id": "x"})), &desired, &policy).action_type,
            ActionType::NoOp
        );

        let action = Action::plan(&exists(json!({"size": 10})), &desired, &policy);
        assert_eq!(action.action_type, ActionType::Update);
        assert_eq!(action.summary(), "update (size)");
    }

    #[test]
    fn test_plan_delete() {
        assert_eq!(
            Action::plan_delete(&Observation::Absent).action_type,
            ActionType::NoOp
        );
        assert_eq!(
            Action::plan_delete(&exists(json!({}))).action_type,
            ActionType::Delete
        );
    }

    #[test]
    fn test_action_type_display() {
        assert_eq!(ActionType::Create.to_string(), "create");
        assert_eq!(ActionType::NoOp.to_string(), "no-op");
    }
}
