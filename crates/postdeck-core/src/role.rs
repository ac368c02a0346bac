//! Dashboard roles.
//!
//! Roles travel as snake_case strings (`client`, `moderator`,
//! `community_manager`, `administrator`, `super_administrator`). Anything
//! else decodes to [`Role::Unknown`] rather than failing, so workflow queries
//! stay total over whatever the backend sends.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// The role of the user acting on a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Client,
    Moderator,
    CommunityManager,
    Administrator,
    SuperAdministrator,
    #[default]
    Unknown,
}

impl Role {
    /// Every recognized role, in ascending order of privilege.
    pub const ALL: [Role; 5] = [
        Role::Client,
        Role::CommunityManager,
        Role::Moderator,
        Role::Administrator,
        Role::SuperAdministrator,
    ];

    /// The wire name of this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Moderator => "moderator",
            Role::CommunityManager => "community_manager",
            Role::Administrator => "administrator",
            Role::SuperAdministrator => "super_administrator",
            Role::Unknown => "unknown",
        }
    }

    /// Moderators and administrators review content; clients and community
    /// managers do not.
    pub fn is_staff(&self) -> bool {
        matches!(
            self,
            Role::Moderator | Role::Administrator | Role::SuperAdministrator
        )
    }

    pub fn is_client(&self) -> bool {
        matches!(self, Role::Client)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "client" => Role::Client,
            "moderator" => Role::Moderator,
            "community_manager" => Role::CommunityManager,
            "administrator" | "admin" => Role::Administrator,
            "super_administrator" | "super_admin" => Role::SuperAdministrator,
            _ => Role::Unknown,
        }
    }
}

impl FromStr for Role {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Role::from(s))
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        Role::from(s.as_str())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

/// Role flags as reported by the credential validation endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleFlags {
    pub is_client: bool,
    pub is_moderator: bool,
    pub is_community_manager: bool,
    pub is_administrator: bool,
    pub is_super_administrator: bool,
}

impl RoleFlags {
    /// Collapse the flags into the most privileged role they grant.
    pub fn primary_role(&self) -> Role {
        if self.is_super_administrator {
            Role::SuperAdministrator
        } else if self.is_administrator {
            Role::Administrator
        } else if self.is_moderator {
            Role::Moderator
        } else if self.is_community_manager {
            Role::CommunityManager
        } else if self.is_client {
            Role::Client
        } else {
            Role::Unknown
        }
    }
}
