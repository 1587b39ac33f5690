//! # Caller Identity
//!
//! Who is calling, with which role, and which permissions their token
//! carries. Authentication happens outside the core; by the time an
//! `Identity` reaches the workflow it is trusted.

use crate::MeritError;
use crate::types::UserId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Caller role.
///
/// Role names arrive as free text. The three known roles accept both their
/// English and Indonesian spellings; anything else is kept verbatim in
/// `Other` so it can be reported back in a `Forbidden` message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Student,
    Advisor,
    Other(String),
}

impl Role {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "admin" => Self::Admin,
            "mahasiswa" | "student" => Self::Student,
            "dosen wali" | "dosen_wali" | "advisor" | "lecturer" => Self::Advisor,
            _ => Self::Other(raw.trim().to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Admin => "Admin",
            Self::Student => "Mahasiswa",
            Self::Advisor => "Dosen Wali",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fine-grained permission carried by the caller's token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "achievement:read")]
    Read,
    #[serde(rename = "achievement:create")]
    Create,
    #[serde(rename = "achievement:update")]
    Update,
    #[serde(rename = "achievement:delete")]
    Delete,
    #[serde(rename = "achievement:verify")]
    Verify,
}

impl Permission {
    pub const ALL: [Permission; 5] = [
        Permission::Read,
        Permission::Create,
        Permission::Update,
        Permission::Delete,
        Permission::Verify,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "achievement:read",
            Self::Create => "achievement:create",
            Self::Update => "achievement:update",
            Self::Delete => "achievement:delete",
            Self::Verify => "achievement:verify",
        }
    }

    /// Permissions granted to a role when the token does not list any.
    #[must_use]
    pub fn defaults_for(role: &Role) -> BTreeSet<Permission> {
        match role {
            Role::Admin => Self::ALL.into_iter().collect(),
            Role::Student => [Self::Read, Self::Create, Self::Update, Self::Delete].into(),
            Role::Advisor => [Self::Read, Self::Verify].into(),
            Role::Other(_) => BTreeSet::new(),
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s.trim())
            .ok_or_else(|| format!("unknown permission '{}'", s))
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
    pub permissions: BTreeSet<Permission>,
}

impl Identity {
    /// Identity with the role's default permission set.
    #[must_use]
    pub fn new(user_id: UserId, role: Role) -> Self {
        let permissions = Permission::defaults_for(&role);
        Self {
            user_id,
            role,
            permissions,
        }
    }

    #[must_use]
    pub fn with_permissions(mut self, permissions: BTreeSet<Permission>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn require_role(&self, role: &Role) -> Result<(), MeritError> {
        if self.role == *role {
            Ok(())
        } else {
            Err(MeritError::Forbidden(format!(
                "role '{}' may not perform this operation",
                self.role
            )))
        }
    }

    pub fn require(&self, permission: Permission) -> Result<(), MeritError> {
        if self.permissions.contains(&permission) {
            Ok(())
        } else {
            Err(MeritError::Forbidden(format!(
                "missing permission {}",
                permission
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_accepts_both_spellings() {
        assert_eq!(Role::parse("Mahasiswa"), Role::Student);
        assert_eq!(Role::parse("student"), Role::Student);
        assert_eq!(Role::parse("Dosen Wali"), Role::Advisor);
        assert_eq!(Role::parse(" ADMIN "), Role::Admin);
        assert_eq!(Role::parse("Guest"), Role::Other("Guest".to_string()));
    }

    #[test]
    fn advisor_defaults_cannot_create() {
        let advisor = Identity::new(UserId::new("u-7"), Role::Advisor);
        assert!(advisor.require(Permission::Verify).is_ok());
        assert!(matches!(
            advisor.require(Permission::Create),
            Err(MeritError::Forbidden(_))
        ));
    }

    #[test]
    fn unknown_roles_get_nothing() {
        let guest = Identity::new(UserId::new("u-9"), Role::parse("Guest"));
        assert!(guest.permissions.is_empty());
    }

    #[test]
    fn permission_parses_wire_name() {
        assert_eq!(
            "achievement:verify".parse::<Permission>(),
            Ok(Permission::Verify)
        );
        assert!("achievement:launch".parse::<Permission>().is_err());
    }
}
