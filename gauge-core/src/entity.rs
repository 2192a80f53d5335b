//! Entity and team member identity types.
//!
//! An [`EntityId`] names a simulated entity as reported by the training
//! application. A [`TeamMemberRef`] names the logical role an entity plays,
//! as resolved by a host-supplied [`TeamMemberResolver`].

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Display name used for the implicit single learner.
pub const LEARNER: &str = "learner";

/// Identity of a simulated entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityId {
    /// The implicit single learner when there is no team organization.
    Learner,
    /// An entity addressed by simulation site, application and entity number.
    Sim {
        site: u16,
        application: u16,
        entity: u16,
    },
}

impl EntityId {
    /// Create a simulation entity identifier.
    pub const fn new(site: u16, application: u16, entity: u16) -> Self {
        Self::Sim {
            site,
            application,
            entity,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Learner => f.write_str(LEARNER),
            Self::Sim {
                site,
                application,
                entity,
            } => write!(f, "{site}:{application}:{entity}"),
        }
    }
}

/// Reference to a team role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamMemberRef {
    /// All watched members together (scorer binding).
    Aggregate,
    /// The implicit single learner.
    Learner,
    /// A named role in the team organization.
    Member(String),
}

impl TeamMemberRef {
    pub fn member(name: impl Into<String>) -> Self {
        Self::Member(name.into())
    }

    /// Name used in explanations and score labels.
    pub fn display_name(&self) -> &str {
        match self {
            Self::Aggregate => "all",
            Self::Learner => LEARNER,
            Self::Member(name) if name.trim().is_empty() => LEARNER,
            Self::Member(name) => name,
        }
    }

    /// Role name if this is a named member.
    pub fn member_name(&self) -> Option<&str> {
        match self {
            Self::Member(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for TeamMemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Maps raw entity identities to team roles.
///
/// Implemented by the host's team organization lookup.
pub trait TeamMemberResolver: Send + Sync {
    /// The role currently bound to `entity`, if any.
    fn resolve(&self, entity: &EntityId) -> Option<TeamMemberRef>;

    /// The role played by the learner running this session, if known.
    fn learner_role(&self) -> Option<String> {
        None
    }
}

/// Fixed entity-to-role table.
#[derive(Debug, Clone, Default)]
pub struct StaticTeamRoster {
    roles: HashMap<EntityId, String>,
    learner_role: Option<String>,
}

impl StaticTeamRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `entity` to the role `name`.
    #[must_use]
    pub fn with_member(mut self, entity: EntityId, name: impl Into<String>) -> Self {
        self.roles.insert(entity, name.into());
        self
    }

    /// Mark `name` as the role the learner plays.
    #[must_use]
    pub fn with_learner_role(mut self, name: impl Into<String>) -> Self {
        self.learner_role = Some(name.into());
        self
    }
}

impl TeamMemberResolver for StaticTeamRoster {
    fn resolve(&self, entity: &EntityId) -> Option<TeamMemberRef> {
        match entity {
            EntityId::Learner => Some(TeamMemberRef::Learner),
            sim => self.roles.get(sim).cloned().map(TeamMemberRef::Member),
        }
    }

    fn learner_role(&self) -> Option<String> {
        self.learner_role.clone()
    }
}

/// A user participating in the session, used to address score records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMember {
    pub username: String,
    /// Role this user plays; `None` in single-player sessions.
    pub team_member: Option<String>,
}

impl SessionMember {
    pub fn new(username: impl Into<String>, team_member: Option<&str>) -> Self {
        Self {
            username: username.into(),
            team_member: team_member.map(str::to_string),
        }
    }
}
