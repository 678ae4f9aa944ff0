//! # Teamgate Authorization Core
//!
//! Access-control decisions for subjects organised in teams.
//!
//! ## Features
//!
//! - **Write-time validation** of CEL rule conditions against a fixed symbol table
//! - **Deterministic rule normalization** for stable evaluation and diffing
//! - **Single-flight caching** of subjects, teams and roles with LRU eviction and idle expiry
//! - **Cycle-safe team hierarchy** resolution with explicit bounds
//! - **Fail-closed evaluation**: internal failures always deny
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use teamgate_authz::{
//!     AuthzConfig, CelEngine, InMemoryDirectory, InMemoryPolicyStore, Operation, Policy,
//!     PolicyEngine, PolicyService, ResourceContext, Role, Rule, Subject, SubjectCache,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AuthzConfig::default();
//!     let directory = Arc::new(InMemoryDirectory::new());
//!     let store = Arc::new(InMemoryPolicyStore::new());
//!     let cel = Arc::new(CelEngine::new());
//!
//!     let policy = PolicyService::new(store.clone(), cel.clone())
//!         .create(
//!             Policy::access_control("OwnerPolicy").with_rule(
//!                 Rule::allow("owner-edits")
//!                     .with_resource("all")
//!                     .with_operation(Operation::EditAll)
//!                     .with_condition("resource.owner == subject.name"),
//!             ),
//!         )
//!         .await?;
//!
//!     let role = Role::new("DataSteward").with_policy(policy.entity_ref());
//!     directory.upsert_role(role.clone());
//!     directory.upsert_subject(Subject::new("alice").with_role(&role));
//!
//!     let cache = Arc::new(SubjectCache::new(config.cache.clone(), directory));
//!     cache.start().await;
//!
//!     let engine = PolicyEngine::new(&config, cache, store, cel);
//!     let table = ResourceContext::new("table").with_owner("alice");
//!     let decision = engine.decide("alice", &table, Operation::EditTags).await?;
//!
//!     assert!(decision.is_allowed());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cel; // CEL condition compiler and evaluator
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod hierarchy;
pub mod logging;
pub mod policy;
pub mod types;

// Re-export commonly used types
pub use cache::{CacheStats, LoadingCache, SubjectCache};
pub use cel::{CompiledPredicate, Engine as CelEngine, SymbolTable, ValueType};
pub use config::{AuthzConfig, CacheConfig, CombiningAlgorithm, EngineConfig, HierarchyConfig};
pub use directory::{DirectoryAdapter, Entity, FieldGroup, InMemoryDirectory};
pub use engine::{Decision, DecisionReason, MatchedRule, PolicyEngine};
pub use error::{AuthzError, Result, ValidationError};
pub use hierarchy::{TeamHierarchy, TeamHierarchyResolver};
pub use policy::{
    normalize_rules, Effect, InMemoryPolicyStore, Policy, PolicyChange, PolicyKind, PolicyService,
    PolicyStore, Rule,
};
pub use types::{
    EntityKind, EntityRef, Operation, PolicyId, ResourceContext, Role, RoleId, Subject,
    SubjectContext, SubjectId, Team, TeamId,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
