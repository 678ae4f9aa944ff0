//! Core authorization types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique subject identifier
pub type SubjectId = Uuid;

/// Unique team identifier
pub type TeamId = Uuid;

/// Unique role identifier
pub type RoleId = Uuid;

/// Unique policy identifier
pub type PolicyId = Uuid;

/// Kinds of entity the core reads from its collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Subject,
    Team,
    Role,
    Policy,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Subject => "subject",
            Self::Team => "team",
            Self::Role => "role",
            Self::Policy => "policy",
        };
        f.write_str(name)
    }
}

/// Reference to another entity
///
/// Equality and hashing consider the id only; the name is carried for
/// logging and for building evaluation contexts.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: Uuid,
    pub kind: EntityKind,
    pub name: String,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
        }
    }
}

impl PartialEq for EntityRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.kind == other.kind
    }
}

impl std::hash::Hash for EntityRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.kind.hash(state);
    }
}

/// An authenticated identity (user, bot, service account)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub name: String,

    /// Directly assigned roles
    #[serde(default)]
    pub roles: Vec<EntityRef>,

    /// Direct team memberships
    #[serde(default)]
    pub teams: Vec<EntityRef>,
}

impl Subject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            roles: Vec::new(),
            teams: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: &Role) -> Self {
        self.roles.push(role.entity_ref());
        self
    }

    pub fn with_team(mut self, team: &Team) -> Self {
        self.teams.push(team.entity_ref());
        self
    }

    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(EntityKind::Subject, self.id, &self.name)
    }
}

/// A group of subjects in a directed, possibly cyclic, parent hierarchy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,

    #[serde(default)]
    pub parents: Vec<EntityRef>,

    /// Roles every member of this team (and of its descendants) inherits
    #[serde(default)]
    pub default_roles: Vec<EntityRef>,

    /// Policies attached directly to the team
    #[serde(default)]
    pub policies: Vec<EntityRef>,
}

impl Team {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            parents: Vec::new(),
            default_roles: Vec::new(),
            policies: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: &Team) -> Self {
        self.parents.push(parent.entity_ref());
        self
    }

    pub fn with_default_role(mut self, role: &Role) -> Self {
        self.default_roles.push(role.entity_ref());
        self
    }

    pub fn with_policy(mut self, policy: EntityRef) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(EntityKind::Team, self.id, &self.name)
    }
}

/// Named bundle of policies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,

    #[serde(default)]
    pub policies: Vec<EntityRef>,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            policies: Vec::new(),
        }
    }

    pub fn with_policy(mut self, policy: EntityRef) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(EntityKind::Role, self.id, &self.name)
    }
}

/// Cached view of a subject used for access-control decisions
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectContext {
    subject: Subject,
}

impl SubjectContext {
    pub fn new(subject: Subject) -> Self {
        Self { subject }
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn name(&self) -> &str {
        &self.subject.name
    }

    /// Directly assigned roles
    pub fn roles(&self) -> &[EntityRef] {
        &self.subject.roles
    }

    /// Direct team memberships
    pub fn teams(&self) -> &[EntityRef] {
        &self.subject.teams
    }
}

/// Operations a rule can grant or deny
///
/// Ordered by canonical name when rules are normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    All,
    Create,
    Read,
    Update,
    Delete,
    ViewAll,
    ViewUsage,
    EditAll,
    EditDescription,
    EditOwner,
    EditTags,
    EditPolicy,
    EditUsers,
    EditTeams,
    EditRole,
}

impl Operation {
    pub const ALL: [Operation; 15] = [
        Self::All,
        Self::Create,
        Self::Read,
        Self::Update,
        Self::Delete,
        Self::ViewAll,
        Self::ViewUsage,
        Self::EditAll,
        Self::EditDescription,
        Self::EditOwner,
        Self::EditTags,
        Self::EditPolicy,
        Self::EditUsers,
        Self::EditTeams,
        Self::EditRole,
    ];

    /// Canonical identifier, also the serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::ViewAll => "viewAll",
            Self::ViewUsage => "viewUsage",
            Self::EditAll => "editAll",
            Self::EditDescription => "editDescription",
            Self::EditOwner => "editOwner",
            Self::EditTags => "editTags",
            Self::EditPolicy => "editPolicy",
            Self::EditUsers => "editUsers",
            Self::EditTeams => "editTeams",
            Self::EditRole => "editRole",
        }
    }

    fn is_view(&self) -> bool {
        matches!(self, Self::Read | Self::ViewAll | Self::ViewUsage)
    }

    fn is_edit(&self) -> bool {
        matches!(
            self,
            Self::Update
                | Self::EditAll
                | Self::EditDescription
                | Self::EditOwner
                | Self::EditTags
                | Self::EditPolicy
                | Self::EditUsers
                | Self::EditTeams
                | Self::EditRole
        )
    }

    /// Whether a rule listing `self` applies to a request for `requested`
    pub fn covers(&self, requested: Operation) -> bool {
        match self {
            Self::All => true,
            Self::ViewAll => requested.is_view(),
            Self::EditAll => requested.is_edit(),
            other => *other == requested,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown operation '{}'", s))
    }
}

/// Resource being accessed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceContext {
    /// Resource type (table, dashboard, pipeline, ...)
    #[serde(rename = "type")]
    pub resource_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Owning subject or team name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Additional attributes (tier, sensitivity, ...)
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
}

impl ResourceContext {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}
