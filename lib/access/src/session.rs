//! Session and session-state data model.
//!
//! `Session` is a handle owned by the identity provider; the engine stores a
//! copy and never mutates it. `SessionState` is the stable read model the
//! rest of the application consumes: a new value is published on every
//! transition (immutable-by-replacement), so consumers can rely on cheap
//! equality checks to detect change.

use crate::error::ResolutionError;
use crate::role::{Role, RoleSet};
use agentdesk_core::IdentityId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// An authenticated identity-provider session.
///
/// The provider owns the session lifecycle; agentdesk holds a snapshot taken
/// at event time. Absence of a session means "not signed in".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The provider's subject identifier for the signed-in user.
    subject: IdentityId,
    /// Email address, if the provider supplied one.
    email: Option<String>,
    /// Display name, if the provider supplied one.
    display_name: Option<String>,
    /// When the provider issued this session.
    issued_at: DateTime<Utc>,
}

impl Session {
    /// Creates a session snapshot from provider event data.
    #[must_use]
    pub fn new(subject: IdentityId, email: Option<String>, display_name: Option<String>) -> Self {
        Self {
            subject,
            email,
            display_name,
            issued_at: Utc::now(),
        }
    }

    /// Returns the provider subject identifier.
    #[must_use]
    pub fn subject(&self) -> &IdentityId {
        &self.subject
    }

    /// Returns the email address, if available.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Returns the display name, if available.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Returns when the provider issued this session.
    #[must_use]
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
}

/// Minimal user identity derived from a session at event time.
///
/// This shell is available synchronously when a sign-in event arrives, so
/// the UI can render a name and email before roles resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// The provider subject identifier.
    pub id: IdentityId,
    /// Email address; empty string when the provider supplied none.
    pub email: String,
    /// Display name; falls back to the email local part.
    pub display_name: String,
}

impl UserIdentity {
    /// Derives the identity shell from a session.
    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        let email = session.email().unwrap_or_default().to_string();
        let display_name = session
            .display_name()
            .map(str::to_string)
            .or_else(|| email.split('@').next().map(str::to_string))
            .unwrap_or_default();
        Self {
            id: session.subject().clone(),
            email,
            display_name,
        }
    }
}

/// A profile record from the secondary store.
///
/// `None` at the state level means the store had no record yet (first login)
/// or the fetch failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// The identity this profile belongs to.
    pub identity_id: IdentityId,
    /// Role assignments from the store, validated at the adapter boundary.
    pub roles: RoleSet,
    /// The store's notion of the user's primary role, if recorded.
    pub primary_role: Option<Role>,
    /// Store-specific metadata carried through untouched.
    pub metadata: JsonValue,
}

/// Lifecycle phase of the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthPhase {
    /// No resolution has been attempted yet.
    Uninitialized,
    /// A sign-in event arrived and role resolution is in flight.
    Loading,
    /// Resolution completed; the read model is stable.
    Ready,
    /// Resolution failed terminally (watchdog timeout or initialization
    /// error); recoverable only by caller-driven retry.
    Errored,
}

/// The stable read model for session and role state.
///
/// Mutated only by the session engine, and only by replacement: every
/// transition publishes a fresh value.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    /// The provider session, if signed in.
    pub session: Option<Session>,
    /// Minimal identity shell, available before roles resolve.
    pub user: Option<UserIdentity>,
    /// The secondary-store profile, once fetched.
    pub profile: Option<Profile>,
    /// The resolved role set.
    pub roles: RoleSet,
    /// The single role currently governing view access.
    ///
    /// Invariant: once `loading` is false and a user is present,
    /// `active_role` is a member of `roles`.
    pub active_role: Role,
    /// Lifecycle phase.
    pub phase: AuthPhase,
    /// True while resolution is in flight.
    pub loading: bool,
    /// The most recent resolution failure, if any. A recorded
    /// `TransientFetch` alongside `phase == Ready` means the engine fell
    /// back to policy-derived roles and the state is usable.
    pub error: Option<ResolutionError>,
}

impl SessionState {
    /// The empty starting shape: nothing resolved yet, resolution expected.
    #[must_use]
    pub fn uninitialized(default_role: Role) -> Self {
        Self {
            session: None,
            user: None,
            profile: None,
            roles: RoleSet::single(default_role),
            active_role: default_role,
            phase: AuthPhase::Uninitialized,
            loading: true,
            error: None,
        }
    }

    /// The signed-out shape: the empty shape with `loading` false.
    #[must_use]
    pub fn signed_out(default_role: Role) -> Self {
        Self {
            loading: false,
            ..Self::uninitialized(default_role)
        }
    }

    /// Returns true if a user is signed in.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Returns true if the resolved role set contains the given role.
    ///
    /// This is the memory-only membership check; the special-admin override
    /// is layered on top by the engine and route gate via the role policy.
    #[must_use]
    pub fn holds_role(&self, role: Role) -> bool {
        self.roles.contains(role)
    }

    /// Returns the signed-in user's email, if any.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.email.as_str())
    }
}
