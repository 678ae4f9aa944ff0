//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use teamgate_authz::{
    AuthzConfig, AuthzError, CacheConfig, CelEngine, DirectoryAdapter, Entity, EntityKind,
    FieldGroup, InMemoryDirectory, InMemoryPolicyStore, PolicyEngine, PolicyService, Result,
    SubjectCache,
};
use uuid::Uuid;

/// Directory that reads its answer up front, then waits before returning it
pub struct SlowDirectory {
    pub inner: InMemoryDirectory,
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl SlowDirectory {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: InMemoryDirectory::new(),
            delay,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectoryAdapter for SlowDirectory {
    async fn get_by_name(
        &self,
        kind: EntityKind,
        name: &str,
        fields: &[FieldGroup],
    ) -> Result<Entity> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = self.inner.get_by_name(kind, name, fields).await;
        tokio::time::sleep(self.delay).await;
        result
    }

    async fn get_by_id(
        &self,
        kind: EntityKind,
        id: &Uuid,
        fields: &[FieldGroup],
    ) -> Result<Entity> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = self.inner.get_by_id(kind, id, fields).await;
        tokio::time::sleep(self.delay).await;
        result
    }
}

/// Directory whose first `failures` calls fail with a transport error
pub struct FlakyDirectory {
    pub inner: InMemoryDirectory,
    pub failures: usize,
    pub calls: AtomicUsize,
}

impl FlakyDirectory {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: InMemoryDirectory::new(),
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    fn fail_now(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst) < self.failures
    }
}

#[async_trait]
impl DirectoryAdapter for FlakyDirectory {
    async fn get_by_name(
        &self,
        kind: EntityKind,
        name: &str,
        fields: &[FieldGroup],
    ) -> Result<Entity> {
        if self.fail_now() {
            return Err(AuthzError::Internal("connection reset".to_string()));
        }
        self.inner.get_by_name(kind, name, fields).await
    }

    async fn get_by_id(
        &self,
        kind: EntityKind,
        id: &Uuid,
        fields: &[FieldGroup],
    ) -> Result<Entity> {
        if self.fail_now() {
            return Err(AuthzError::Internal("connection reset".to_string()));
        }
        self.inner.get_by_id(kind, id, fields).await
    }
}

/// A started cache over `directory`
pub async fn started_cache(
    config: CacheConfig,
    directory: Arc<dyn DirectoryAdapter>,
) -> Arc<SubjectCache> {
    let cache = Arc::new(SubjectCache::new(config, directory));
    cache.start().await;
    cache
}

/// Everything needed to drive decisions end to end
pub struct Harness {
    pub directory: Arc<InMemoryDirectory>,
    pub store: Arc<InMemoryPolicyStore>,
    pub policies: PolicyService,
    pub engine: PolicyEngine,
}

impl Harness {
    pub async fn new(config: AuthzConfig) -> Self {
        let directory = Arc::new(InMemoryDirectory::new());
        let store = Arc::new(InMemoryPolicyStore::new());
        let cel = Arc::new(CelEngine::new());

        let cache = started_cache(config.cache.clone(), directory.clone()).await;
        let engine = PolicyEngine::new(&config, cache, store.clone(), cel.clone());
        let policies = PolicyService::new(store.clone(), cel);

        Self {
            directory,
            store,
            policies,
            engine,
        }
    }

    pub async fn with_defaults() -> Self {
        Self::new(AuthzConfig::default()).await
    }
}
