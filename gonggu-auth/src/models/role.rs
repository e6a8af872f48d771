//! Role hierarchy for profiles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Trust level stored on a profile.
///
/// `Owner` is never granted through the profile store alone: the owner
/// session additionally requires the configured allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    OrganizerPending,
    Organizer,
    Admin,
    Owner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::OrganizerPending => "organizer_pending",
            Role::Organizer => "organizer",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "organizer_pending" => Ok(Role::OrganizerPending),
            "organizer" => Ok(Role::Organizer),
            "admin" => Ok(Role::Admin),
            "owner" => Ok(Role::Owner),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Single role check used by every guard.
///
/// A role satisfies the allowed set when it is listed, or when it is `Owner`
/// and `Admin` is listed. No other role implies another.
pub fn satisfies(role: Role, allowed: &[Role]) -> bool {
    allowed
        .iter()
        .any(|&permitted| permitted == role || (role == Role::Owner && permitted == Role::Admin))
}
