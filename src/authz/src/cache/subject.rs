//! Subject, team and role caches fronting the directory

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{CacheStats, LoadingCache};
use crate::config::CacheConfig;
use crate::directory::{DirectoryAdapter, FieldGroup};
use crate::error::{AuthzError, Result};
use crate::types::{EntityKind, Role, RoleId, SubjectContext, Team, TeamId};

/// Statistics for the three caches
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectCacheStats {
    pub subjects: CacheStats,
    pub teams: CacheStats,
    pub roles: CacheStats,
}

/// Cache service with an explicit start/stop lifecycle
///
/// Lookups before [`SubjectCache::start`] fail with
/// `AuthzError::CacheNotInitialized`. Writers that change a subject's or
/// team's memberships or roles must call the matching `invalidate_*` method
/// before acknowledging the write.
pub struct SubjectCache {
    config: CacheConfig,
    directory: Arc<dyn DirectoryAdapter>,
    subjects: Arc<LoadingCache<String, SubjectContext>>,
    teams: Arc<LoadingCache<TeamId, Team>>,
    roles: Arc<LoadingCache<RoleId, Role>>,
    running: AtomicBool,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl SubjectCache {
    pub fn new(config: CacheConfig, directory: Arc<dyn DirectoryAdapter>) -> Self {
        Self {
            subjects: Arc::new(LoadingCache::new("subject", &config)),
            teams: Arc::new(LoadingCache::new("team", &config)),
            roles: Arc::new(LoadingCache::new("role", &config)),
            config,
            directory,
            running: AtomicBool::new(false),
            sweeper: Mutex::new(None),
        }
    }

    /// Start serving lookups; a second call logs and does nothing
    pub async fn start(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!("Subject cache already initialized");
            return;
        }

        if let Some(interval) = self.config.sweep_interval() {
            let subjects = self.subjects.clone();
            let teams = self.teams.clone();
            let roles = self.roles.clone();

            let handle = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let purged = subjects.purge_expired()
                        + teams.purge_expired()
                        + roles.purge_expired();
                    if purged > 0 {
                        debug!(purged, "Swept idle cache entries");
                    }
                }
            });
            *self.sweeper.lock() = Some(handle);
        }

        info!(
            capacity = self.config.capacity,
            idle_timeout_ms = self.config.idle_timeout_ms,
            shards = self.config.shards,
            "Subject cache started"
        );
    }

    /// Stop the sweeper and drop all entries; `start` may be called again
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
        self.invalidate_all();
        info!("Subject cache stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(AuthzError::CacheNotInitialized)
        }
    }

    /// Subject with its direct roles and teams
    ///
    /// # Errors
    /// `NotFound` when the directory has no such subject, `CacheLoad` for any
    /// other directory failure.
    pub async fn subject_context(&self, name: &str) -> Result<SubjectContext> {
        self.ensure_running()?;

        let directory = self.directory.clone();
        let key = name.to_string();
        self.subjects
            .get_with(key.clone(), move || async move {
                let subject = directory
                    .get_by_name(EntityKind::Subject, &key, FieldGroup::SUBJECT_CONTEXT)
                    .await
                    .and_then(|entity| entity.into_subject())
                    .map_err(|e| load_error("subject", &key, e))?;
                Ok(SubjectContext::new(subject))
            })
            .await
    }

    /// Team with its parents, default roles and attached policies
    pub async fn team(&self, id: &TeamId) -> Result<Team> {
        self.ensure_running()?;

        let directory = self.directory.clone();
        let id = *id;
        self.teams
            .get_with(id, move || async move {
                directory
                    .get_by_id(EntityKind::Team, &id, FieldGroup::TEAM_HIERARCHY)
                    .await
                    .and_then(|entity| entity.into_team())
                    .map_err(|e| load_error("team", &id.to_string(), e))
            })
            .await
    }

    /// Role with its policy references
    pub async fn role(&self, id: &RoleId) -> Result<Role> {
        self.ensure_running()?;

        let directory = self.directory.clone();
        let id = *id;
        self.roles
            .get_with(id, move || async move {
                directory
                    .get_by_id(EntityKind::Role, &id, FieldGroup::ROLE_POLICIES)
                    .await
                    .and_then(|entity| entity.into_role())
                    .map_err(|e| load_error("role", &id.to_string(), e))
            })
            .await
    }

    pub fn invalidate_subject(&self, name: &str) {
        self.subjects.invalidate(&name.to_string());
    }

    pub fn invalidate_team(&self, id: &TeamId) {
        self.teams.invalidate(id);
    }

    pub fn invalidate_role(&self, id: &RoleId) {
        self.roles.invalidate(id);
    }

    pub fn invalidate_all(&self) {
        self.subjects.invalidate_all();
        self.teams.invalidate_all();
        self.roles.invalidate_all();
    }

    /// Sweep idle entries from all three caches
    pub fn purge_expired(&self) -> usize {
        self.subjects.purge_expired() + self.teams.purge_expired() + self.roles.purge_expired()
    }

    pub fn stats(&self) -> SubjectCacheStats {
        SubjectCacheStats {
            subjects: self.subjects.stats(),
            teams: self.teams.stats(),
            roles: self.roles.stats(),
        }
    }
}

impl Drop for SubjectCache {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}

/// `NotFound` passes through; anything else is a load failure
fn load_error(cache: &'static str, key: &str, error: AuthzError) -> AuthzError {
    match error {
        AuthzError::NotFound { .. } | AuthzError::CacheLoad { .. } => error,
        other => AuthzError::CacheLoad {
            cache,
            key: key.to_string(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;
    use crate::types::Subject;

    #[tokio::test]
    async fn test_lookup_before_start_fails() {
        let cache = SubjectCache::new(CacheConfig::default(), Arc::new(InMemoryDirectory::new()));
        let err = cache.subject_context("alice").await.unwrap_err();
        assert_eq!(err, AuthzError::CacheNotInitialized);
    }

    #[tokio::test]
    async fn test_not_found_passes_through() {
        let cache = SubjectCache::new(CacheConfig::default(), Arc::new(InMemoryDirectory::new()));
        cache.start().await;

        let err = cache.subject_context("ghost").await.unwrap_err();
        assert_eq!(err, AuthzError::not_found(EntityKind::Subject, "ghost"));
    }

    #[tokio::test]
    async fn test_projection_applied() {
        let directory = Arc::new(InMemoryDirectory::new());
        let team = Team::new("Eng");
        let role = Role::new("R");
        directory.upsert_subject(Subject::new("alice").with_team(&team).with_role(&role));

        let cache = SubjectCache::new(CacheConfig::default(), directory);
        cache.start().await;

        let ctx = cache.subject_context("alice").await.unwrap();
        assert_eq!(ctx.teams(), &[team.entity_ref()]);
        assert_eq!(ctx.roles(), &[role.entity_ref()]);
    }

    #[test]
    fn test_load_error_mapping() {
        let err = load_error("team", "t1", AuthzError::Internal("socket closed".to_string()));
        assert!(matches!(err, AuthzError::CacheLoad { cache: "team", .. }));

        let err = load_error("team", "t1", AuthzError::not_found(EntityKind::Team, "t1"));
        assert!(err.is_not_found());
    }
}
