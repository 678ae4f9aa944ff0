//! Validated policy write path
//!
//! Every write is normalized and every rule condition compiled before the
//! store is touched, so a policy with one bad rule is never persisted.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cel::{Engine as CelEngine, ValueType};
use crate::error::{AuthzError, Result, ValidationError};
use crate::policy::{normalize_rules, Policy, PolicyKind, PolicyStore};
use crate::types::{EntityKind, PolicyId};

/// Differences between a stored policy and its replacement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyChange {
    /// `Some((before, after))` when the enabled flag changed
    pub enabled: Option<(bool, bool)>,
    pub rules_added: Vec<String>,
    pub rules_deleted: Vec<String>,
    pub rules_modified: Vec<String>,
}

impl PolicyChange {
    pub fn between(old: &Policy, new: &Policy) -> Self {
        let old_rules: HashMap<&str, _> = old.rules.iter().map(|r| (r.name.as_str(), r)).collect();
        let new_rules: HashMap<&str, _> = new.rules.iter().map(|r| (r.name.as_str(), r)).collect();

        let mut change = Self {
            enabled: (old.enabled != new.enabled).then_some((old.enabled, new.enabled)),
            ..Default::default()
        };

        for rule in &new.rules {
            match old_rules.get(rule.name.as_str()) {
                None => change.rules_added.push(rule.name.clone()),
                Some(previous) if *previous != rule => {
                    change.rules_modified.push(rule.name.clone())
                }
                Some(_) => {}
            }
        }
        for rule in &old.rules {
            if !new_rules.contains_key(rule.name.as_str()) {
                change.rules_deleted.push(rule.name.clone());
            }
        }

        change
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_none()
            && self.rules_added.is_empty()
            && self.rules_deleted.is_empty()
            && self.rules_modified.is_empty()
    }
}

/// Policy create/update/delete with write-time validation
pub struct PolicyService {
    store: Arc<dyn PolicyStore>,
    cel: Arc<CelEngine>,
}

impl PolicyService {
    pub fn new(store: Arc<dyn PolicyStore>, cel: Arc<CelEngine>) -> Self {
        Self { store, cel }
    }

    /// Normalize and compile without persisting
    pub fn validate(&self, policy: &mut Policy) -> Result<()> {
        normalize_rules(policy)?;

        if policy.kind != PolicyKind::AccessControl {
            return Ok(());
        }

        for rule in &policy.rules {
            if let Some(condition) = &rule.condition {
                self.cel
                    .compile(condition, ValueType::Bool)
                    .map_err(|source| ValidationError::Condition {
                        rule: rule.name.clone(),
                        source,
                    })?;
            }
        }
        Ok(())
    }

    /// Validate and persist a new policy, returning the stored form
    ///
    /// An id already in the store is rejected; replacing goes through `update`.
    pub async fn create(&self, mut policy: Policy) -> Result<Policy> {
        self.validate(&mut policy)?;
        if !self.store.insert(policy.clone()).await? {
            return Err(ValidationError::AlreadyExists {
                entity: EntityKind::Policy,
                name: policy.name,
            }
            .into());
        }

        info!(policy = %policy.name, rules = policy.rules.len(), "Policy created");
        Ok(policy)
    }

    /// Validate and replace an existing policy
    ///
    /// The policy kind is read-only.
    pub async fn update(&self, mut policy: Policy) -> Result<(Policy, PolicyChange)> {
        let existing = self
            .store
            .get(&policy.id)
            .await?
            .ok_or_else(|| AuthzError::not_found(EntityKind::Policy, policy.id.to_string()))?;

        if existing.kind != policy.kind {
            return Err(ValidationError::ReadOnlyField {
                entity: EntityKind::Policy,
                name: existing.name,
                field: "kind",
            }
            .into());
        }

        self.validate(&mut policy)?;
        let change = PolicyChange::between(&existing, &policy);
        if change.is_empty() && existing == policy {
            debug!(policy = %policy.name, "Policy update is a no-op");
            return Ok((policy, change));
        }

        self.store.put(policy.clone()).await?;

        info!(
            policy = %policy.name,
            added = change.rules_added.len(),
            deleted = change.rules_deleted.len(),
            modified = change.rules_modified.len(),
            "Policy updated"
        );
        Ok((policy, change))
    }

    pub async fn delete(&self, id: &PolicyId) -> Result<()> {
        if !self.store.delete(id).await? {
            return Err(AuthzError::not_found(EntityKind::Policy, id.to_string()));
        }
        info!(policy_id = %id, "Policy deleted");
        Ok(())
    }

    pub async fn get(&self, id: &PolicyId) -> Result<Policy> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AuthzError::not_found(EntityKind::Policy, id.to_string()))
    }
}
