//! Policy definition, normalization, storage and the validated write path

pub mod normalize;
pub mod service;
pub mod store;

pub use normalize::normalize_rules;
pub use service::{PolicyChange, PolicyService};
pub use store::{InMemoryPolicyStore, PolicyStore};

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::types::{EntityKind, EntityRef, Operation, PolicyId};

/// Resource type that matches every resource
pub const ALL_RESOURCES: &str = "all";

/// Policy kinds; only access-control policies take part in decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PolicyKind {
    AccessControl,
    Lifecycle,
}

impl PolicyKind {
    /// Whether policies of this kind must carry at least one rule
    pub fn requires_rules(&self) -> bool {
        matches!(self, Self::AccessControl)
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccessControl => f.write_str("AccessControl"),
            Self::Lifecycle => f.write_str("Lifecycle"),
        }
    }
}

/// Rule effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Effect {
    /// Allow the operation
    Allow,
    /// Deny the operation
    Deny,
}

/// Atomic access condition inside a policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique within the owning policy
    pub name: String,

    /// Optional CEL condition; absent means "always"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Target resource types (`all` matches any)
    pub resources: Vec<String>,

    /// Target operations
    pub operations: Vec<Operation>,

    pub effect: Effect,

    /// Higher priority rules are evaluated first within a policy
    #[serde(default)]
    pub priority: i32,
}

impl Rule {
    pub fn new(name: impl Into<String>, effect: Effect) -> Self {
        Self {
            name: name.into(),
            condition: None,
            resources: Vec::new(),
            operations: Vec::new(),
            effect,
            priority: 0,
        }
    }

    pub fn allow(name: impl Into<String>) -> Self {
        Self::new(name, Effect::Allow)
    }

    pub fn deny(name: impl Into<String>) -> Self {
        Self::new(name, Effect::Deny)
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resources.push(resource.into());
        self
    }

    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Resource type match, case-insensitive
    pub fn matches_resource(&self, resource_type: &str) -> bool {
        self.resources.iter().any(|r| {
            r.eq_ignore_ascii_case(ALL_RESOURCES) || r.eq_ignore_ascii_case(resource_type)
        })
    }

    pub fn matches_operation(&self, operation: Operation) -> bool {
        self.operations.iter().any(|op| op.covers(operation))
    }

    /// Structural match: resource type and operation, condition not evaluated
    pub fn applies_to(&self, resource_type: &str, operation: Operation) -> bool {
        self.matches_resource(resource_type) && self.matches_operation(operation)
    }
}

/// Named collection of rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    pub name: String,
    pub kind: PolicyKind,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub rules: Vec<Rule>,
}

fn default_enabled() -> bool {
    true
}

impl Policy {
    pub fn new(name: impl Into<String>, kind: PolicyKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            enabled: true,
            rules: Vec::new(),
        }
    }

    pub fn access_control(name: impl Into<String>) -> Self {
        Self::new(name, PolicyKind::AccessControl)
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(EntityKind::Policy, self.id, &self.name)
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Rules in evaluation order: priority descending, then name
    pub fn rules_by_priority(&self) -> Vec<&Rule> {
        let mut rules: Vec<&Rule> = self.rules.iter().collect();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));
        rules
    }
}
