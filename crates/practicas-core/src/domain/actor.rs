//! Caller identity. Authentication happens outside the core; these values
//! are trusted as given.

use std::fmt;

use serde::{Deserialize, Serialize};

use practicas_state::AuthorRole;

/// Role of an already-authorized caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Estudiante,
    Docente,
    Empleador,
    Coordinador,
    /// Scheduled jobs and other non-human callers.
    Sistema,
}

impl Role {
    /// Institutional staff may drive any edge of the lifecycle.
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Coordinador | Role::Sistema)
    }

    /// The evaluation slot this role writes to, if any.
    pub fn author_role(self) -> Option<AuthorRole> {
        match self {
            Role::Docente => Some(AuthorRole::Docente),
            Role::Empleador => Some(AuthorRole::Empleador),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Estudiante => "ESTUDIANTE",
            Role::Docente => "DOCENTE",
            Role::Empleador => "EMPLEADOR",
            Role::Coordinador => "COORDINADOR",
            Role::Sistema => "SISTEMA",
        };
        f.write_str(s)
    }
}

/// Who is asking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    pub actor_id: String,
    pub role: Role,
}

impl ActorContext {
    pub fn new(actor_id: impl Into<String>, role: Role) -> Self {
        Self {
            actor_id: actor_id.into(),
            role,
        }
    }

    pub fn coordinator(actor_id: impl Into<String>) -> Self {
        Self::new(actor_id, Role::Coordinador)
    }

    pub fn system() -> Self {
        Self::new("system", Role::Sistema)
    }
}
