//! In-memory directory

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use crate::directory::{DirectoryAdapter, Entity, FieldGroup};
use crate::error::{AuthzError, Result};
use crate::types::{EntityKind, Role, Subject, Team};

/// Directory backed by concurrent maps
///
/// Counts every successful or failed lookup so tests can assert how many
/// backing loads a cache performed.
#[derive(Default)]
pub struct InMemoryDirectory {
    subjects: DashMap<Uuid, Subject>,
    teams: DashMap<Uuid, Team>,
    roles: DashMap<Uuid, Role>,
    lookups: AtomicU64,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_subject(&self, subject: Subject) {
        self.subjects.insert(subject.id, subject);
    }

    pub fn upsert_team(&self, team: Team) {
        self.teams.insert(team.id, team);
    }

    pub fn upsert_role(&self, role: Role) {
        self.roles.insert(role.id, role);
    }

    pub fn remove(&self, kind: EntityKind, id: &Uuid) -> bool {
        match kind {
            EntityKind::Subject => self.subjects.remove(id).is_some(),
            EntityKind::Team => self.teams.remove(id).is_some(),
            EntityKind::Role => self.roles.remove(id).is_some(),
            EntityKind::Policy => false,
        }
    }

    /// Number of lookups served so far
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::SeqCst)
    }

    fn find_by_name(&self, kind: EntityKind, name: &str) -> Option<Entity> {
        match kind {
            EntityKind::Subject => self
                .subjects
                .iter()
                .find(|s| s.name == name)
                .map(|s| Entity::Subject(s.value().clone())),
            EntityKind::Team => self
                .teams
                .iter()
                .find(|t| t.name == name)
                .map(|t| Entity::Team(t.value().clone())),
            EntityKind::Role => self
                .roles
                .iter()
                .find(|r| r.name == name)
                .map(|r| Entity::Role(r.value().clone())),
            EntityKind::Policy => None,
        }
    }

    fn find_by_id(&self, kind: EntityKind, id: &Uuid) -> Option<Entity> {
        match kind {
            EntityKind::Subject => {
                self.subjects.get(id).map(|s| Entity::Subject(s.value().clone()))
            }
            EntityKind::Team => self.teams.get(id).map(|t| Entity::Team(t.value().clone())),
            EntityKind::Role => self.roles.get(id).map(|r| Entity::Role(r.value().clone())),
            EntityKind::Policy => None,
        }
    }
}

/// Clear every reference field not named in `fields`
fn project(entity: Entity, fields: &[FieldGroup]) -> Entity {
    let keep = |group: FieldGroup| fields.contains(&group);
    match entity {
        Entity::Subject(mut subject) => {
            if !keep(FieldGroup::Roles) {
                subject.roles.clear();
            }
            if !keep(FieldGroup::Teams) {
                subject.teams.clear();
            }
            Entity::Subject(subject)
        }
        Entity::Team(mut team) => {
            if !keep(FieldGroup::DefaultRoles) {
                team.default_roles.clear();
            }
            if !keep(FieldGroup::Policies) {
                team.policies.clear();
            }
            if !keep(FieldGroup::Parents) {
                team.parents.clear();
            }
            Entity::Team(team)
        }
        Entity::Role(mut role) => {
            if !keep(FieldGroup::Policies) {
                role.policies.clear();
            }
            Entity::Role(role)
        }
    }
}

#[async_trait]
impl DirectoryAdapter for InMemoryDirectory {
    async fn get_by_name(
        &self,
        kind: EntityKind,
        name: &str,
        fields: &[FieldGroup],
    ) -> Result<Entity> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.find_by_name(kind, name)
            .map(|entity| project(entity, fields))
            .ok_or_else(|| AuthzError::not_found(kind, name))
    }

    async fn get_by_id(
        &self,
        kind: EntityKind,
        id: &Uuid,
        fields: &[FieldGroup],
    ) -> Result<Entity> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.find_by_id(kind, id)
            .map(|entity| project(entity, fields))
            .ok_or_else(|| AuthzError::not_found(kind, id.to_string()))
    }
}
