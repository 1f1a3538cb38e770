//! Authenticated identity handed over by the session layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Identifier of a dashboard user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wraps a user id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capability set of an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular dashboard user.
    User,
    /// Administrator with cross-user read access.
    Admin,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// User id.
    pub id: UserId,
    /// Role granted by the session layer.
    pub role: Role,
}

impl Identity {
    /// Creates a regular user identity.
    #[must_use]
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
            role: Role::User,
        }
    }

    /// Creates an administrator identity.
    #[must_use]
    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
            role: Role::Admin,
        }
    }

    /// Returns `true` for administrators.
    #[must_use]
    pub const fn is_elevated(&self) -> bool {
        matches!(self.role, Role::Admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("user".parse::<Role>(), Ok(Role::User));
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn only_admins_are_elevated() {
        assert!(Identity::admin("a").is_elevated());
        assert!(!Identity::user("u").is_elevated());
    }
}
