//! Policy storage

use async_trait::async_trait;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::policy::{Policy, PolicyKind};
use crate::types::PolicyId;

/// Policy store trait
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Get a policy by ID
    async fn get(&self, id: &PolicyId) -> Result<Option<Policy>>;

    /// Store a policy, replacing any previous version
    async fn put(&self, policy: Policy) -> Result<()>;

    /// Store a policy only if its id is unused; returns whether it was stored
    async fn insert(&self, policy: Policy) -> Result<bool>;

    /// List all policies
    async fn list(&self) -> Result<Vec<Policy>>;

    /// Delete a policy; returns whether it existed
    async fn delete(&self, id: &PolicyId) -> Result<bool>;

    /// Enabled policies of `kind`, sorted by name
    async fn list_enabled(&self, kind: PolicyKind) -> Result<Vec<Policy>>;
}

/// In-memory policy store implementation
pub struct InMemoryPolicyStore {
    policies: Arc<RwLock<HashMap<PolicyId, Policy>>>,
}

impl InMemoryPolicyStore {
    /// Create a new in-memory policy store
    pub fn new() -> Self {
        Self {
            policies: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryPolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn get(&self, id: &PolicyId) -> Result<Option<Policy>> {
        let policies = self.policies.read().await;
        Ok(policies.get(id).cloned())
    }

    async fn put(&self, policy: Policy) -> Result<()> {
        let mut policies = self.policies.write().await;
        policies.insert(policy.id, policy);
        Ok(())
    }

    async fn insert(&self, policy: Policy) -> Result<bool> {
        let mut policies = self.policies.write().await;
        match policies.entry(policy.id) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(policy);
                Ok(true)
            }
        }
    }

    async fn list(&self) -> Result<Vec<Policy>> {
        let policies = self.policies.read().await;
        Ok(policies.values().cloned().collect())
    }

    async fn delete(&self, id: &PolicyId) -> Result<bool> {
        let mut policies = self.policies.write().await;
        Ok(policies.remove(id).is_some())
    }

    async fn list_enabled(&self, kind: PolicyKind) -> Result<Vec<Policy>> {
        let policies = self.policies.read().await;
        let mut enabled: Vec<Policy> = policies
            .values()
            .filter(|p| p.enabled && p.kind == kind)
            .cloned()
            .collect();

        // Name first, id as tie-break so the order is stable
        enabled.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        Ok(enabled)
    }
}
