//! Role policy: pure decision logic for final role sets and active roles.
//!
//! The policy is deterministic and side-effect-free so it is unit-testable
//! without any store or provider mock. It is also the single home of the
//! special-admin override check; the engine and the route gate both delegate
//! here so the rule cannot drift between call sites.

use crate::role::{Role, RoleSet};

/// Outcome of a policy resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleResolution {
    /// The final role set.
    pub roles: RoleSet,
    /// The preferred active role, always a member of `roles`.
    pub active_role: Role,
}

/// Pure decision logic for role resolution.
///
/// Configured once from [`AccessConfig`](crate::config::AccessConfig) and
/// shared by the engine and the route gate.
#[derive(Debug, Clone)]
pub struct RolePolicy {
    special_admin_email: Option<String>,
    default_role: Role,
}

impl RolePolicy {
    /// Creates a policy with the given special-admin email (zero-or-one
    /// allow-list entry) and fallback default role.
    #[must_use]
    pub fn new(special_admin_email: Option<String>, default_role: Role) -> Self {
        Self {
            special_admin_email,
            default_role,
        }
    }

    /// Returns the configured default role.
    #[must_use]
    pub fn default_role(&self) -> Role {
        self.default_role
    }

    /// Returns true if the email matches the configured special-admin
    /// address, compared case-insensitively.
    #[must_use]
    pub fn is_special_admin(&self, email: Option<&str>) -> bool {
        match (&self.special_admin_email, email) {
            (Some(configured), Some(actual)) => configured.eq_ignore_ascii_case(actual),
            _ => false,
        }
    }

    /// Returns true if the user should be treated as an admin: either the
    /// role set contains `Admin` or the special-admin rule matches.
    ///
    /// Every admin check in the engine and route gate goes through this
    /// method so the override is applied with one piece of logic.
    #[must_use]
    pub fn grants_admin(&self, roles: &RoleSet, email: Option<&str>) -> bool {
        roles.contains(Role::Admin) || self.is_special_admin(email)
    }

    /// Computes the final role set and preferred active role.
    ///
    /// Rules, in order:
    /// 1. Start with the raw roles from the store (possibly empty).
    /// 2. Append `Admin` if the special-admin rule matches; additive only.
    /// 3. Fall back to the default role if the set is still empty.
    /// 4. Active role: `Admin` if present; else the previous active role if
    ///    still a member (stability across reloads); else the first element.
    #[must_use]
    pub fn resolve(
        &self,
        raw_roles: &RoleSet,
        email: Option<&str>,
        previous_active: Option<Role>,
    ) -> RoleResolution {
        let mut roles = raw_roles.clone();

        if self.is_special_admin(email) {
            roles.insert(Role::Admin);
        }

        if roles.is_empty() {
            roles = RoleSet::single(self.default_role);
        }

        let active_role = if roles.contains(Role::Admin) {
            Role::Admin
        } else if let Some(previous) = previous_active.filter(|r| roles.contains(*r)) {
            previous
        } else {
            // Non-empty by construction after the fallback above.
            roles.first().unwrap_or(self.default_role)
        };

        RoleResolution { roles, active_role }
    }
}
