//! Error types for the authorization engine

use crate::cel::CelError;
use crate::types::EntityKind;
use thiserror::Error;

/// Authorization engine errors
///
/// `Clone` so that one failed single-flight load can be handed to every
/// waiter on the same key.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuthzError {
    /// A policy write was rejected
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Subject, team, role or policy absent from its source of truth
    #[error("{kind} not found: {key}")]
    NotFound { kind: EntityKind, key: String },

    /// Backing directory load failed (never cached)
    #[error("Failed to load {cache} entry '{key}': {reason}")]
    CacheLoad {
        cache: &'static str,
        key: String,
        reason: String,
    },

    /// Unexpected failure while gathering or evaluating rules
    #[error("Policy evaluation failed: {0}")]
    Evaluation(String),

    /// Lookup attempted before `SubjectCache::start`
    #[error("Subject cache is not initialized")]
    CacheNotInitialized,

    /// Team hierarchy walk exceeded a configured bound
    #[error("Team hierarchy limit exceeded: {0}")]
    HierarchyLimit(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthzError {
    /// Shorthand for a `NotFound` error
    pub fn not_found(kind: EntityKind, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    /// True when the error means "unknown identity" rather than a failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Reasons a policy write is rejected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("policy '{policy}' of kind {kind} must contain at least one rule")]
    EmptyRules { policy: String, kind: String },

    #[error("policy '{policy}' contains more than one rule named '{rule}'")]
    DuplicateRule { policy: String, rule: String },

    #[error("rule '{rule}' field '{field}' must not be empty")]
    EmptyTargets { rule: String, field: &'static str },

    #[error("rule '{rule}' field 'condition': {source}")]
    Condition {
        rule: String,
        #[source]
        source: CelError,
    },

    #[error("{entity} '{name}' already exists")]
    AlreadyExists { entity: EntityKind, name: String },

    #[error("field '{field}' of {entity} '{name}' is read-only")]
    ReadOnlyField {
        entity: EntityKind,
        name: String,
        field: &'static str,
    },
}

impl ValidationError {
    /// Name of the offending rule, when the failure is rule-scoped
    pub fn rule(&self) -> Option<&str> {
        match self {
            Self::DuplicateRule { rule, .. }
            | Self::EmptyTargets { rule, .. }
            | Self::Condition { rule, .. } => Some(rule),
            Self::EmptyRules { .. }
            | Self::AlreadyExists { .. }
            | Self::ReadOnlyField { .. } => None,
        }
    }
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_error_names_rule_and_field() {
        let err = AuthzError::from(ValidationError::Condition {
            rule: "owner-only".to_string(),
            source: CelError::UnknownIdentifier("subject.name".to_string()),
        });

        let message = err.to_string();
        assert!(message.contains("owner-only"));
        assert!(message.contains("condition"));
        assert!(message.contains("subject.name"));
    }

    #[test]
    fn test_not_found_is_distinct() {
        let err = AuthzError::not_found(EntityKind::Subject, "alice");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "subject not found: alice");

        let err = AuthzError::Evaluation("boom".to_string());
        assert!(!err.is_not_found());
    }
}
