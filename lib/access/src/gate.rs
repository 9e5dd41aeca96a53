//! Route gating over the session read model.
//!
//! The gate is a read-only consumer of [`SessionState`]: it never triggers
//! resolution or mutates the engine, it only decides what the router should
//! do with the current snapshot. Uncertain states surface as
//! [`RouteDecision::ShowLoading`] or [`RouteDecision::ShowError`] rather
//! than redirects, so a slow resolution never bounces the user between
//! pages.

use crate::notify::{NotificationKind, NotificationSink};
use crate::policy::RolePolicy;
use crate::role::Role;
use crate::session::{AuthPhase, SessionState};
use tracing::debug;

/// What a route demands of the current session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteRequirements {
    /// The route needs a signed-in user.
    pub require_authenticated: bool,
    /// The user must hold at least one of these roles. Empty means no role
    /// requirement.
    pub require_roles: Vec<Role>,
    /// The route lives under the administrative namespace and needs the
    /// active role to be admin.
    pub admin_namespace: bool,
}

impl RouteRequirements {
    /// Requirements for a route any signed-in user may visit.
    #[must_use]
    pub fn authenticated() -> Self {
        Self {
            require_authenticated: true,
            ..Self::default()
        }
    }

    /// Requirements for a route under the administrative namespace.
    #[must_use]
    pub fn admin() -> Self {
        Self {
            require_authenticated: true,
            admin_namespace: true,
            ..Self::default()
        }
    }

    /// Requires at least one of the given roles.
    #[must_use]
    pub fn with_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.require_roles = roles.into_iter().collect();
        self
    }
}

/// The gate's verdict for a navigation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Render the route.
    Allow,
    /// Send the user to the given path instead.
    RedirectTo(String),
    /// Auth state is still resolving; render a loading view, not a
    /// redirect.
    ShowLoading,
    /// Auth state failed to resolve; render an error view with a retry
    /// affordance, not a redirect.
    ShowError,
}

/// Decides whether the current session may reach a requested route.
#[derive(Debug)]
pub struct RouteGate<N> {
    policy: RolePolicy,
    sign_in_path: String,
    agent_home_path: String,
    notifier: N,
}

impl<N: NotificationSink> RouteGate<N> {
    /// Creates a gate sharing the engine's policy.
    #[must_use]
    pub fn new(
        policy: RolePolicy,
        sign_in_path: impl Into<String>,
        agent_home_path: impl Into<String>,
        notifier: N,
    ) -> Self {
        Self {
            policy,
            sign_in_path: sign_in_path.into(),
            agent_home_path: agent_home_path.into(),
            notifier,
        }
    }

    /// Evaluates a navigation attempt.
    ///
    /// The rules apply in order; the first that matches wins:
    ///
    /// 1. still loading: `ShowLoading`
    /// 2. resolution ended in an error (timeout included): `ShowError`
    /// 3. authentication required but nobody signed in: redirect to sign-in
    /// 4. administrative namespace without the admin role active: redirect
    ///    home with a notice
    /// 5. required roles none of which are held: redirect home with a
    ///    notice
    /// 6. `Allow`
    pub fn evaluate(&self, state: &SessionState, requirements: &RouteRequirements) -> RouteDecision {
        if state.loading && state.phase != AuthPhase::Errored {
            return RouteDecision::ShowLoading;
        }
        // A redirect issued while auth state is unknown sends the user to
        // the wrong place and back again once resolution lands; an errored
        // snapshot renders in place instead.
        if state.phase == AuthPhase::Errored {
            return RouteDecision::ShowError;
        }

        if requirements.require_authenticated && state.user.is_none() {
            debug!(path = %self.sign_in_path, "unauthenticated, redirecting to sign-in");
            self.notifier
                .notify(NotificationKind::Info, "Please sign in to continue.");
            return RouteDecision::RedirectTo(self.sign_in_path.clone());
        }

        if requirements.admin_namespace && !self.admin_active(state) {
            debug!(active_role = %state.active_role, "admin namespace denied");
            self.notifier.notify(
                NotificationKind::Error,
                "You do not have permission to access this page.",
            );
            return RouteDecision::RedirectTo(self.agent_home_path.clone());
        }

        if !requirements.require_roles.is_empty()
            && !requirements
                .require_roles
                .iter()
                .any(|&role| self.holds(state, role))
        {
            debug!("required roles not held");
            self.notifier.notify(
                NotificationKind::Error,
                "You do not have the required role for this page.",
            );
            return RouteDecision::RedirectTo(self.agent_home_path.clone());
        }

        RouteDecision::Allow
    }

    /// Admin-namespace test: the admin role must be the active one, or the
    /// special-admin rule must apply to the signed-in email.
    fn admin_active(&self, state: &SessionState) -> bool {
        state.active_role == Role::Admin || self.policy.is_special_admin(state.email())
    }

    /// Role requirement test with the same admin override the engine's
    /// membership check applies.
    fn holds(&self, state: &SessionState, role: Role) -> bool {
        if state.holds_role(role) {
            return true;
        }
        role == Role::Admin && self.policy.grants_admin(&state.roles, state.email())
    }
}
