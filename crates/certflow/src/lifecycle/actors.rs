//! Actor roles and the directory the coordinator resolves them from.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Administrator,
    TechnicalManager,
    Surveyor,
    Client,
}

impl Role {
    /// Only technical managers may close out a survey.
    pub fn can_finalize_survey(self) -> bool {
        self == Role::TechnicalManager
    }

    pub fn can_perform_survey(self) -> bool {
        self == Role::Surveyor
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Administrator => write!(f, "ADMINISTRATOR"),
            Role::TechnicalManager => write!(f, "TECHNICAL_MANAGER"),
            Role::Surveyor => write!(f, "SURVEYOR"),
            Role::Client => write!(f, "CLIENT"),
        }
    }
}

/// Resolves an actor identifier to its role. Unknown actors yield `None`.
pub trait ActorDirectory: Send + Sync {
    fn actor_role(&self, actor_id: &str) -> Option<Role>;
}

/// Directory backed by a map, populated by the embedding application.
#[derive(Debug, Default)]
pub struct InMemoryActorDirectory {
    roles: RwLock<HashMap<String, Role>>,
}

impl InMemoryActorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration.
    pub fn with_actor(self, actor_id: impl Into<String>, role: Role) -> Self {
        self.register(actor_id, role);
        self
    }

    pub fn register(&self, actor_id: impl Into<String>, role: Role) {
        if let Ok(mut roles) = self.roles.write() {
            roles.insert(actor_id.into(), role);
        }
    }

    pub fn remove(&self, actor_id: &str) -> Option<Role> {
        self.roles.write().ok()?.remove(actor_id)
    }
}

impl ActorDirectory for InMemoryActorDirectory {
    fn actor_role(&self, actor_id: &str) -> Option<Role> {
        self.roles.read().ok()?.get(actor_id).copied()
    }
}
