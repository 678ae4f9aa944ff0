//! Policy evaluation
//!
//! Resolves a subject's effective roles through the team hierarchy, gathers
//! the enabled access-control policies reachable from them, and combines the
//! matching rules into one decision. Anything that goes wrong after the subject
//! is known ends in a deny.

pub mod decision;
pub mod metrics;

pub use decision::{Decision, DecisionReason, MatchedRule};
pub use metrics::{DecisionMetrics, MetricsCollector};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::SubjectCache;
use crate::cel::{Engine as CelEngine, EvalContext};
use crate::config::{AuthzConfig, CombiningAlgorithm, EngineConfig};
use crate::error::{AuthzError, Result};
use crate::hierarchy::TeamHierarchyResolver;
use crate::policy::{Effect, Policy, PolicyKind, PolicyStore, Rule};
use crate::types::{Operation, PolicyId, ResourceContext, SubjectContext};

/// Main policy engine
///
/// ```text
/// decide → SubjectCache → TeamHierarchyResolver → role cache → PolicyStore
///        → candidate rules → CEL conditions → combining → Decision
/// ```
pub struct PolicyEngine {
    config: EngineConfig,
    cache: Arc<SubjectCache>,
    hierarchy: TeamHierarchyResolver,
    policy_store: Arc<dyn PolicyStore>,
    cel: Arc<CelEngine>,
    metrics: MetricsCollector,
}

impl PolicyEngine {
    pub fn new(
        config: &AuthzConfig,
        cache: Arc<SubjectCache>,
        policy_store: Arc<dyn PolicyStore>,
        cel: Arc<CelEngine>,
    ) -> Self {
        info!(combining = ?config.engine.combining, "PolicyEngine initialized");

        Self {
            config: config.engine.clone(),
            hierarchy: TeamHierarchyResolver::new(cache.clone(), config.hierarchy.clone()),
            cache,
            policy_store,
            cel,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn cache(&self) -> &Arc<SubjectCache> {
        &self.cache
    }

    pub fn hierarchy(&self) -> &TeamHierarchyResolver {
        &self.hierarchy
    }

    pub async fn metrics(&self) -> DecisionMetrics {
        self.metrics.snapshot().await
    }

    /// Decide whether `subject_name` may perform `operation` on `resource`
    ///
    /// # Errors
    /// `NotFound` for an unknown subject and `CacheLoad` when the subject
    /// cannot be loaded; callers must not read either as a deny. Every later
    /// failure is returned as a denying [`Decision`].
    pub async fn decide(
        &self,
        subject_name: &str,
        resource: &ResourceContext,
        operation: Operation,
    ) -> Result<Decision> {
        let subject = self.cache.subject_context(subject_name).await?;
        Ok(self.decide_for_context(&subject, resource, operation).await)
    }

    /// Decide for an already resolved subject; never fails open
    pub async fn decide_for_context(
        &self,
        subject: &SubjectContext,
        resource: &ResourceContext,
        operation: Operation,
    ) -> Decision {
        let start = Instant::now();

        debug!(
            subject = subject.name(),
            resource_type = %resource.resource_type,
            %operation,
            "Evaluating access request"
        );

        let (decision, failed) = match self.evaluate(subject, resource, operation).await {
            Ok(decision) => (decision, false),
            Err(e) => {
                warn!(
                    subject = subject.name(),
                    resource_type = %resource.resource_type,
                    %operation,
                    error = %e,
                    "Policy evaluation failed, denying"
                );
                (Decision::failed(), true)
            }
        };

        self.metrics
            .record_decision(decision.is_allowed(), failed, start.elapsed())
            .await;

        debug!(
            subject = subject.name(),
            effect = ?decision.effect,
            reason = ?decision.reason,
            "Access decision"
        );
        decision
    }

    async fn evaluate(
        &self,
        subject: &SubjectContext,
        resource: &ResourceContext,
        operation: Operation,
    ) -> Result<Decision> {
        let hierarchy = self.hierarchy.walk(subject.teams()).await?;
        let effective_roles = hierarchy.effective_roles(subject.roles());
        let role_names: Vec<String> = effective_roles.iter().map(|r| r.name.clone()).collect();

        let mut reachable: HashSet<PolicyId> = hierarchy.policies.iter().map(|p| p.id).collect();
        for role_ref in &effective_roles {
            let role = self.cache.role(&role_ref.id).await?;
            reachable.extend(role.policies.iter().map(|p| p.id));
        }

        let policies: Vec<Policy> = self
            .policy_store
            .list_enabled(PolicyKind::AccessControl)
            .await?
            .into_iter()
            .filter(|p| reachable.contains(&p.id))
            .collect();

        let candidates: Vec<(&Policy, &Rule)> = policies
            .iter()
            .flat_map(|policy| {
                policy
                    .rules_by_priority()
                    .into_iter()
                    .map(move |rule| (policy, rule))
            })
            .filter(|(_, rule)| rule.applies_to(&resource.resource_type, operation))
            .collect();

        debug!(
            roles = role_names.len(),
            policies = policies.len(),
            candidates = candidates.len(),
            "Collected candidate rules"
        );

        let ctx = EvalContext::for_request(subject, &effective_roles, resource, operation);
        self.combine(&candidates, &ctx, role_names)
    }

    fn combine(
        &self,
        candidates: &[(&Policy, &Rule)],
        ctx: &EvalContext,
        roles: Vec<String>,
    ) -> Result<Decision> {
        let mut first_allow: Option<(&Policy, &Rule)> = None;

        for &(policy, rule) in candidates {
            if !self.condition_holds(policy, rule, ctx)? {
                continue;
            }

            match (self.config.combining, rule.effect) {
                (CombiningAlgorithm::FirstMatch, _)
                | (CombiningAlgorithm::DenyOverrides, Effect::Deny) => {
                    return Ok(Decision::matched(policy, rule, roles));
                }
                (CombiningAlgorithm::DenyOverrides, Effect::Allow) => {
                    first_allow.get_or_insert((policy, rule));
                }
            }
        }

        Ok(match first_allow {
            Some((policy, rule)) => Decision::matched(policy, rule, roles),
            None => Decision::no_match(roles),
        })
    }

    fn condition_holds(&self, policy: &Policy, rule: &Rule, ctx: &EvalContext) -> Result<bool> {
        let Some(condition) = &rule.condition else {
            return Ok(true);
        };

        self.cel.evaluate_condition(condition, ctx).map_err(|e| {
            AuthzError::Evaluation(format!(
                "rule '{}' of policy '{}': {}",
                rule.name, policy.name, e
            ))
        })
    }
}
