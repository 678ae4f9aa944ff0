//! Canonical ordering of a policy's rules

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::policy::{Policy, Rule};

/// Sort a rule's targets in place
///
/// Resources are ordered with the same ASCII case folding that
/// [`Rule::matches_resource`] uses (ties broken by the raw string so the order
/// is total) and operations by canonical name. Duplicates are
/// dropped.
pub fn normalize_rule(rule: &mut Rule) {
    rule.resources.sort_by(|a, b| {
        a.to_ascii_lowercase()
            .cmp(&b.to_ascii_lowercase())
            .then_with(|| a.cmp(b))
    });
    rule.resources.dedup();

    rule.operations.sort_by_key(|op| op.as_str());
    rule.operations.dedup();
}

/// Validate and canonicalize a policy's rule list
///
/// Checks that kinds requiring rules have some, that rule names are unique and
/// that every rule targets at least one resource and one operation. Sorts each
/// rule's targets and the rule list by name. Idempotent.
pub fn normalize_rules(policy: &mut Policy) -> Result<(), ValidationError> {
    if policy.kind.requires_rules() && policy.rules.is_empty() {
        return Err(ValidationError::EmptyRules {
            policy: policy.name.clone(),
            kind: policy.kind.to_string(),
        });
    }

    let mut seen = HashSet::new();
    for rule in &policy.rules {
        if !seen.insert(rule.name.as_str()) {
            return Err(ValidationError::DuplicateRule {
                policy: policy.name.clone(),
                rule: rule.name.clone(),
            });
        }
        if rule.resources.is_empty() {
            return Err(ValidationError::EmptyTargets {
                rule: rule.name.clone(),
                field: "resources",
            });
        }
        if rule.operations.is_empty() {
            return Err(ValidationError::EmptyTargets {
                rule: rule.name.clone(),
                field: "operations",
            });
        }
    }

    for rule in &mut policy.rules {
        normalize_rule(rule);
    }
    policy.rules.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(())
}
