//! Directory adapter contract
//!
//! The directory is the source of truth for subjects, teams and roles. The
//! core only reads from it, asking for a typed projection of field groups.

pub mod memory;

pub use memory::InMemoryDirectory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AuthzError, Result};
use crate::types::{EntityKind, Role, Subject, Team};

/// Named groups of reference fields an entity load may include
///
/// Fields outside the projection come back empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldGroup {
    /// Subject direct roles
    Roles,
    /// Subject direct teams
    Teams,
    /// Team default roles
    DefaultRoles,
    /// Team or role policies
    Policies,
    /// Team parents
    Parents,
}

impl FieldGroup {
    /// Projection used when building a subject context
    pub const SUBJECT_CONTEXT: &'static [FieldGroup] = &[FieldGroup::Roles, FieldGroup::Teams];

    /// Projection used by the hierarchy walk
    pub const TEAM_HIERARCHY: &'static [FieldGroup] =
        &[FieldGroup::DefaultRoles, FieldGroup::Policies, FieldGroup::Parents];

    /// Projection used when resolving role policies
    pub const ROLE_POLICIES: &'static [FieldGroup] = &[FieldGroup::Policies];
}

/// Entity returned by the directory
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Subject(Subject),
    Team(Team),
    Role(Role),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Subject(_) => EntityKind::Subject,
            Self::Team(_) => EntityKind::Team,
            Self::Role(_) => EntityKind::Role,
        }
    }

    pub fn into_subject(self) -> Result<Subject> {
        match self {
            Self::Subject(subject) => Ok(subject),
            other => Err(unexpected(EntityKind::Subject, other.kind())),
        }
    }

    pub fn into_team(self) -> Result<Team> {
        match self {
            Self::Team(team) => Ok(team),
            other => Err(unexpected(EntityKind::Team, other.kind())),
        }
    }

    pub fn into_role(self) -> Result<Role> {
        match self {
            Self::Role(role) => Ok(role),
            other => Err(unexpected(EntityKind::Role, other.kind())),
        }
    }
}

fn unexpected(expected: EntityKind, found: EntityKind) -> AuthzError {
    AuthzError::Internal(format!(
        "directory returned a {} where a {} was expected",
        found, expected
    ))
}

/// Read access to subjects, teams and roles
///
/// Absent entities are reported as `AuthzError::NotFound`; any other error is
/// treated as a load failure by the caches.
#[async_trait]
pub trait DirectoryAdapter: Send + Sync {
    async fn get_by_name(
        &self,
        kind: EntityKind,
        name: &str,
        fields: &[FieldGroup],
    ) -> Result<Entity>;

    async fn get_by_id(&self, kind: EntityKind, id: &Uuid, fields: &[FieldGroup]) -> Result<Entity>;
}
