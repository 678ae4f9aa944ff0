//! Authorization decision types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::policy::{Effect, Policy, Rule};
use crate::types::PolicyId;

/// Why a decision came out the way it did
///
/// Deliberately carries no internal error detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// A rule matched and its effect was applied
    RuleMatched,
    /// No rule matched; denied by default
    NoMatchingRule,
    /// Evaluation failed; denied
    EvaluationFailed,
}

/// The rule that decided a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedRule {
    pub policy_id: PolicyId,
    pub policy_name: String,
    pub rule_name: String,
}

impl MatchedRule {
    pub fn new(policy: &Policy, rule: &Rule) -> Self {
        Self {
            policy_id: policy.id,
            policy_name: policy.name.clone(),
            rule_name: rule.name.clone(),
        }
    }
}

/// Authorization decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: Uuid,

    pub effect: Effect,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<MatchedRule>,

    pub reason: DecisionReason,

    /// Names of the subject's effective roles (direct + inherited)
    #[serde(default)]
    pub effective_roles: Vec<String>,

    pub timestamp: DateTime<Utc>,
}

impl Decision {
    fn new(
        effect: Effect,
        matched_rule: Option<MatchedRule>,
        reason: DecisionReason,
        effective_roles: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            effect,
            matched_rule,
            reason,
            effective_roles,
            timestamp: Utc::now(),
        }
    }

    /// Decision rendered by a matching rule
    pub fn matched(policy: &Policy, rule: &Rule, effective_roles: Vec<String>) -> Self {
        Self::new(
            rule.effect,
            Some(MatchedRule::new(policy, rule)),
            DecisionReason::RuleMatched,
            effective_roles,
        )
    }

    /// Default deny when nothing matched
    pub fn no_match(effective_roles: Vec<String>) -> Self {
        Self::new(Effect::Deny, None, DecisionReason::NoMatchingRule, effective_roles)
    }

    /// Opaque deny after an internal failure
    pub fn failed() -> Self {
        Self::new(Effect::Deny, None, DecisionReason::EvaluationFailed, Vec::new())
    }

    pub fn is_allowed(&self) -> bool {
        self.effect == Effect::Allow
    }
}
