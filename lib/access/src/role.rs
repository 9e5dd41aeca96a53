//! Role types for back-office access control.
//!
//! Roles form a closed set: values arriving from the secondary store are
//! validated at the adapter boundary and invalid strings are rejected there
//! rather than propagating as free-form text. A user holds a set of roles
//! and exactly one of them is "active" at any time, governing which views
//! and routes they may reach.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A back-office role.
///
/// Roles are unique per user (set semantics). Order within a [`RoleSet`] is
/// insignificant except that the first element acts as a deterministic
/// fallback when no better active-role candidate exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Standard agent with access to their own listings and transactions.
    Agent,
    /// Finance staff with access to commission and payout views.
    Finance,
    /// Manager with oversight of a branch.
    Manager,
    /// Team leader with oversight of their team's pipeline.
    TeamLeader,
    /// Administrator with access to the admin namespace.
    Admin,
    /// Read-only access.
    Viewer,
}

impl Role {
    /// Returns true if this role grants access to the admin namespace.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }

    /// Returns the canonical string form, matching the secondary store's
    /// role column values.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Finance => "finance",
            Self::Manager => "manager",
            Self::TeamLeader => "team_leader",
            Self::Admin => "admin",
            Self::Viewer => "viewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a role string from the secondary store does not name
/// a known role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRoleError {
    /// The string that failed to parse.
    pub value: String,
}

impl fmt::Display for ParseRoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role: {}", self.value)
    }
}

impl std::error::Error for ParseRoleError {}

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent" => Ok(Self::Agent),
            "finance" => Ok(Self::Finance),
            "manager" => Ok(Self::Manager),
            "team_leader" => Ok(Self::TeamLeader),
            "admin" => Ok(Self::Admin),
            "viewer" => Ok(Self::Viewer),
            _ => Err(ParseRoleError {
                value: s.to_string(),
            }),
        }
    }
}

/// An ordered, duplicate-free set of roles assigned to a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSet {
    roles: Vec<Role>,
}

impl RoleSet {
    /// Creates an empty role set.
    #[must_use]
    pub fn new() -> Self {
        Self { roles: Vec::new() }
    }

    /// Creates a role set holding a single role.
    #[must_use]
    pub fn single(role: Role) -> Self {
        Self { roles: vec![role] }
    }

    /// Creates a role set from a list of roles, dropping duplicates while
    /// preserving first-occurrence order.
    #[must_use]
    pub fn from_roles(roles: impl IntoIterator<Item = Role>) -> Self {
        let mut set = Self::new();
        for role in roles {
            set.insert(role);
        }
        set
    }

    /// Parses a role set from raw store strings.
    ///
    /// # Errors
    ///
    /// Returns a `ParseRoleError` for the first string that does not name a
    /// known role.
    pub fn parse_all<S: AsRef<str>>(raw: &[S]) -> Result<Self, ParseRoleError> {
        let mut set = Self::new();
        for value in raw {
            set.insert(value.as_ref().parse()?);
        }
        Ok(set)
    }

    /// Inserts a role if not already present. Returns true if it was added.
    pub fn insert(&mut self, role: Role) -> bool {
        if self.roles.contains(&role) {
            false
        } else {
            self.roles.push(role);
            true
        }
    }

    /// Returns true if the set contains the given role.
    #[must_use]
    pub fn contains(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Returns the first role, the deterministic fallback for active-role
    /// selection.
    #[must_use]
    pub fn first(&self) -> Option<Role> {
        self.roles.first().copied()
    }

    /// Returns true if the set holds no roles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Returns the number of roles in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Returns the roles as a slice.
    #[must_use]
    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    /// Iterates over the roles in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.roles.iter().copied()
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        Self::from_roles(iter)
    }
}
