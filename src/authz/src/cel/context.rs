//! Evaluation context for CEL expressions

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::types::{EntityRef, Operation, ResourceContext, SubjectContext};

/// Variables bound while a rule condition is evaluated
///
/// Mirrors the access-control symbol table: `subject`, `resource` and
/// `operation`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvalContext {
    /// Subject attributes (id, name, effective roles, teams)
    pub subject: HashMap<String, Value>,

    /// Resource attributes (type, name, owner, tags, attributes)
    pub resource: HashMap<String, Value>,

    /// Requested operation
    pub operation: Option<String>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the context for one decision
    ///
    /// Optional resource fields are only bound when present, so a condition
    /// reading a missing owner fails evaluation instead of comparing against
    /// a placeholder.
    pub fn for_request(
        subject: &SubjectContext,
        effective_roles: &[EntityRef],
        resource: &ResourceContext,
        operation: Operation,
    ) -> Self {
        let mut subject_vars = HashMap::new();
        subject_vars.insert("id".to_string(), json!(subject.subject().id.to_string()));
        subject_vars.insert("name".to_string(), json!(subject.name()));
        subject_vars.insert(
            "roles".to_string(),
            json!(effective_roles.iter().map(|r| r.name.as_str()).collect::<Vec<_>>()),
        );
        subject_vars.insert(
            "teams".to_string(),
            json!(subject.teams().iter().map(|t| t.name.as_str()).collect::<Vec<_>>()),
        );

        let mut resource_vars = HashMap::new();
        resource_vars.insert("type".to_string(), json!(resource.resource_type));
        if let Some(name) = &resource.name {
            resource_vars.insert("name".to_string(), json!(name));
        }
        if let Some(owner) = &resource.owner {
            resource_vars.insert("owner".to_string(), json!(owner));
        }
        resource_vars.insert("tags".to_string(), json!(resource.tags));
        resource_vars.insert("attributes".to_string(), json!(resource.attributes));

        Self::new()
            .with_subject(subject_vars)
            .with_resource(resource_vars)
            .with_operation(operation.as_str())
    }

    pub fn with_subject(mut self, subject: HashMap<String, Value>) -> Self {
        self.subject = subject;
        self
    }

    pub fn with_resource(mut self, resource: HashMap<String, Value>) -> Self {
        self.resource = resource;
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Get all variables as a flat map for CEL evaluation
    pub fn to_variables(&self) -> HashMap<String, Value> {
        let mut vars = HashMap::new();
        vars.insert(
            "subject".to_string(),
            Value::Object(self.subject.clone().into_iter().collect()),
        );
        vars.insert(
            "resource".to_string(),
            Value::Object(self.resource.clone().into_iter().collect()),
        );
        if let Some(operation) = &self.operation {
            vars.insert("operation".to_string(), Value::String(operation.clone()));
        }
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Role, Subject, Team};

    #[test]
    fn test_eval_context_creation() {
        let ctx = EvalContext::new();
        assert!(ctx.subject.is_empty());
        assert!(ctx.resource.is_empty());
        assert!(ctx.operation.is_none());
    }

    #[test]
    fn test_for_request_binds_effective_roles() {
        let steward = Role::new("DataSteward");
        let consumer = Role::new("DataConsumer");
        let team = Team::new("Engineering");
        let subject = SubjectContext::new(Subject::new("alice").with_team(&team));

        let resource = ResourceContext::new("table")
            .with_owner("alice")
            .with_tag("PII.Sensitive");

        let ctx = EvalContext::for_request(
            &subject,
            &[steward.entity_ref(), consumer.entity_ref()],
            &resource,
            Operation::EditTags,
        );

        assert_eq!(ctx.subject["name"], json!("alice"));
        assert_eq!(ctx.subject["roles"], json!(["DataSteward", "DataConsumer"]));
        assert_eq!(ctx.subject["teams"], json!(["Engineering"]));
        assert_eq!(ctx.resource["owner"], json!("alice"));
        assert_eq!(ctx.resource["tags"], json!(["PII.Sensitive"]));
        assert_eq!(ctx.operation.as_deref(), Some("editTags"));
    }

    #[test]
    fn test_missing_owner_is_unbound() {
        let subject = SubjectContext::new(Subject::new("bob"));
        let ctx = EvalContext::for_request(
            &subject,
            &[],
            &ResourceContext::new("dashboard"),
            Operation::Read,
        );
        assert!(!ctx.resource.contains_key("owner"));
        assert!(!ctx.resource.contains_key("name"));

        let vars = ctx.to_variables();
        assert!(vars.contains_key("subject"));
        assert!(vars.contains_key("resource"));
        assert_eq!(vars["operation"], json!("read"));
    }
}
