//! Team hierarchy resolution
//!
//! Teams form a user-editable parent graph that may contain cycles. The walk
//! uses an explicit stack and a visited set keyed by team id, so every team is
//! loaded at most once and a cycle simply stops expanding.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::SubjectCache;
use crate::config::HierarchyConfig;
use crate::error::{AuthzError, Result};
use crate::types::{EntityRef, SubjectContext, TeamId};

/// Everything collected from one hierarchy walk
///
/// All lists are deduplicated and keep first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeamHierarchy {
    /// Teams visited, in traversal order
    pub teams: Vec<EntityRef>,
    /// Default roles of every visited team
    pub roles: Vec<EntityRef>,
    /// Policies attached to every visited team
    pub policies: Vec<EntityRef>,
}

impl TeamHierarchy {
    /// Direct roles followed by inherited ones not already present
    pub fn effective_roles(&self, direct: &[EntityRef]) -> Vec<EntityRef> {
        let mut seen = HashSet::new();
        direct
            .iter()
            .chain(self.roles.iter())
            .filter(|role| seen.insert(role.id))
            .cloned()
            .collect()
    }
}

/// Append items whose id has not been seen yet
fn extend_unique(target: &mut Vec<EntityRef>, seen: &mut HashSet<Uuid>, items: &[EntityRef]) {
    for item in items {
        if seen.insert(item.id) {
            target.push(item.clone());
        }
    }
}

/// Walks team parents through the team cache
pub struct TeamHierarchyResolver {
    cache: Arc<SubjectCache>,
    config: HierarchyConfig,
}

impl TeamHierarchyResolver {
    pub fn new(cache: Arc<SubjectCache>, config: HierarchyConfig) -> Self {
        Self { cache, config }
    }

    /// Walk `teams` and all of their ancestors
    ///
    /// # Errors
    /// `HierarchyLimit` past the configured depth, team count or wall-clock
    /// bound; any team lookup failure (including a dangling parent reference).
    pub async fn walk(&self, teams: &[EntityRef]) -> Result<TeamHierarchy> {
        let timeout = self.config.walk_timeout();
        match tokio::time::timeout(timeout, self.walk_unbounded(teams)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(?timeout, "Team hierarchy walk timed out");
                Err(AuthzError::HierarchyLimit(format!(
                    "walk exceeded {:?}",
                    timeout
                )))
            }
        }
    }

    async fn walk_unbounded(&self, start: &[EntityRef]) -> Result<TeamHierarchy> {
        let mut hierarchy = TeamHierarchy::default();
        let mut visited: HashSet<TeamId> = HashSet::new();
        let mut seen_roles = HashSet::new();
        let mut seen_policies = HashSet::new();

        // Reversed so the first listed team is expanded first
        let mut stack: Vec<(EntityRef, usize)> =
            start.iter().rev().map(|team| (team.clone(), 0)).collect();

        while let Some((team_ref, depth)) = stack.pop() {
            if !visited.insert(team_ref.id) {
                continue;
            }
            if depth >= self.config.max_depth {
                return Err(AuthzError::HierarchyLimit(format!(
                    "team '{}' is deeper than {} levels",
                    team_ref.name, self.config.max_depth
                )));
            }
            if visited.len() > self.config.max_teams {
                return Err(AuthzError::HierarchyLimit(format!(
                    "more than {} teams reachable",
                    self.config.max_teams
                )));
            }

            let team = self.cache.team(&team_ref.id).await?;
            extend_unique(&mut hierarchy.roles, &mut seen_roles, &team.default_roles);
            extend_unique(&mut hierarchy.policies, &mut seen_policies, &team.policies);
            hierarchy.teams.push(team.entity_ref());

            for parent in team.parents.iter().rev() {
                if !visited.contains(&parent.id) {
                    stack.push((parent.clone(), depth + 1));
                }
            }
        }

        debug!(
            teams = hierarchy.teams.len(),
            roles = hierarchy.roles.len(),
            policies = hierarchy.policies.len(),
            "Resolved team hierarchy"
        );
        Ok(hierarchy)
    }

    /// Default roles inherited through `teams` and their ancestors
    pub async fn inherited_roles(&self, teams: &[EntityRef]) -> Result<Vec<EntityRef>> {
        Ok(self.walk(teams).await?.roles)
    }

    /// Policies attached to `teams` and their ancestors
    pub async fn inherited_policies(&self, teams: &[EntityRef]) -> Result<Vec<EntityRef>> {
        Ok(self.walk(teams).await?.policies)
    }

    /// Direct roles ∪ inherited roles for a subject
    pub async fn effective_roles(&self, subject: &SubjectContext) -> Result<Vec<EntityRef>> {
        let hierarchy = self.walk(subject.teams()).await?;
        Ok(hierarchy.effective_roles(subject.roles()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::directory::InMemoryDirectory;
    use crate::types::{Role, Team};

    async fn resolver(
        directory: Arc<InMemoryDirectory>,
        config: HierarchyConfig,
    ) -> TeamHierarchyResolver {
        let cache = Arc::new(SubjectCache::new(CacheConfig::default(), directory));
        cache.start().await;
        TeamHierarchyResolver::new(cache, config)
    }

    #[tokio::test]
    async fn test_diamond_visits_shared_ancestor_once() {
        let directory = Arc::new(InMemoryDirectory::new());
        let r_root = Role::new("Root");
        let r_left = Role::new("Left");
        let root = Team::new("Root").with_default_role(&r_root);
        let left = Team::new("Left").with_parent(&root).with_default_role(&r_left);
        let right = Team::new("Right").with_parent(&root).with_default_role(&r_root);
        let leaf = Team::new("Leaf").with_parent(&left).with_parent(&right);
        for team in [&root, &left, &right, &leaf] {
            directory.upsert_team(team.clone());
        }

        let resolver = resolver(directory.clone(), HierarchyConfig::default()).await;
        let hierarchy = resolver.walk(&[leaf.entity_ref()]).await.unwrap();

        let names: Vec<&str> = hierarchy.teams.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Leaf", "Left", "Root", "Right"]);
        assert_eq!(hierarchy.roles, vec![r_left.entity_ref(), r_root.entity_ref()]);
        assert_eq!(directory.lookups(), 4);
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let directory = Arc::new(InMemoryDirectory::new());
        let mut chain = vec![Team::new("t0")];
        for i in 1..5 {
            let team = Team::new(format!("t{}", i)).with_parent(&chain[i - 1]);
            chain.push(team);
        }
        for team in &chain {
            directory.upsert_team(team.clone());
        }

        let config = HierarchyConfig {
            max_depth: 3,
            ..Default::default()
        };
        let resolver = resolver(directory, config).await;

        let err = resolver.walk(&[chain[4].entity_ref()]).await.unwrap_err();
        assert!(matches!(err, AuthzError::HierarchyLimit(_)));

        assert!(resolver.walk(&[chain[2].entity_ref()]).await.is_ok());
    }

    #[tokio::test]
    async fn test_team_count_limit() {
        let directory = Arc::new(InMemoryDirectory::new());
        let parents: Vec<Team> = (0..5).map(|i| Team::new(format!("p{}", i))).collect();
        let mut child = Team::new("child");
        for parent in &parents {
            child = child.with_parent(parent);
            directory.upsert_team(parent.clone());
        }
        directory.upsert_team(child.clone());

        let config = HierarchyConfig {
            max_teams: 4,
            ..Default::default()
        };
        let resolver = resolver(directory, config).await;

        let err = resolver.walk(&[child.entity_ref()]).await.unwrap_err();
        assert!(matches!(err, AuthzError::HierarchyLimit(_)));
    }

    #[tokio::test]
    async fn test_dangling_parent_is_an_error() {
        let directory = Arc::new(InMemoryDirectory::new());
        let ghost = Team::new("Ghost");
        let team = Team::new("Eng").with_parent(&ghost);
        directory.upsert_team(team.clone());

        let resolver = resolver(directory, HierarchyConfig::default()).await;
        let err = resolver.walk(&[team.entity_ref()]).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_effective_roles_direct_first() {
        let r1 = Role::new("R1").entity_ref();
        let r2 = Role::new("R2").entity_ref();
        let hierarchy = TeamHierarchy {
            roles: vec![r1.clone(), r2.clone()],
            ..Default::default()
        };

        assert_eq!(hierarchy.effective_roles(&[r2.clone()]), vec![r2, r1]);
    }
}
