//! Planned actions for managed resources

use serde::{Deserialize, Serialize};

/// A planned action for a single managed resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Type of action to perform
    pub action_type: ActionType,

    /// Resource type (e.g., "influx_bucket", "influx_authorization")
    pub resource_type: String,

    /// Local resource name, as addressed by the host
    pub resource_name: String,

    /// Attribute-level changes that motivated the action
    pub changes: Vec<Change>,
}

impl Action {
    pub fn new(
        action_type: ActionType,
        resource_type: impl Into<String>,
        resource_name: impl Into<String>,
    ) -> Self {
        Self {
            action_type,
            resource_type: resource_type.into(),
            resource_name: resource_name.into(),
            changes: Vec::new(),
        }
    }

    pub fn with_changes(mut self, changes: Vec<Change>) -> Self {
        self.changes = changes;
        self
    }

    /// Get the full resource key (type.name)
    pub fn key(&self) -> String {
        crate::state::resource_key(&self.resource_type, &self.resource_name)
    }

    pub fn has_changes(&self) -> bool {
        self.action_type != ActionType::NoOp
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} will be {}", self.key(), self.action_type.past_participle())?;
        for change in &self.changes {
            write!(f, "\n  {}", change)?;
        }
        Ok(())
    }
}

/// Type of action to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a new resource
    Create,
    /// Update an existing resource in place
    Update,
    /// Delete and recreate (an immutable attribute changed)
    Replace,
    /// Delete a resource
    Delete,
    /// No changes needed
    NoOp,
}

impl ActionType {
    pub fn past_participle(&self) -> &'static str {
        match self {
            ActionType::Create => "created",
            ActionType::Update => "updated in-place",
            ActionType::Replace => "replaced",
            ActionType::Delete => "destroyed",
            ActionType::NoOp => "left unchanged",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Replace => write!(f, "replace"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// A single attribute difference between prior state and desired configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub attribute: String,
    pub from: Option<String>,
    pub to: Option<String>,
    /// Whether this change forces replacement
    pub forces_replacement: bool,
}

impl Change {
    pub fn new(attribute: impl Into<String>, from: Option<String>, to: Option<String>) -> Self {
        Self {
            attribute: attribute.into(),
            from,
            to,
            forces_replacement: false,
        }
    }

    pub fn forcing_replacement(mut self) -> Self {
        self.forces_replacement = true;
        self
    }
}

impl std::fmt::Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let from = self.from.as_deref().unwrap_or("(none)");
        let to = self.to.as_deref().unwrap_or("(none)");
        write!(f, "{}: {:?} -> {:?}", self.attribute, from, to)?;
        if self.forces_replacement {
            write!(f, " (forces replacement)")?;
        }
        Ok(())
    }
}

/// Derive the action type from a list of changes against an existing resource
pub fn classify(changes: &[Change]) -> ActionType {
    if changes.iter().any(|c| c.forces_replacement) {
        ActionType::Replace
    } else if changes.is_empty() {
        ActionType::NoOp
    } else {
        ActionType::Update
    }
}
