//! Credential source interface: the identity provider as seen by the engine.
//!
//! The provider owns credential verification and session lifecycle; the
//! engine consumes lifecycle events and asks for tokens on demand. Event
//! delivery is a channel of [`AuthEvent`] values fed to
//! [`SessionEngine::run`](crate::engine::SessionEngine::run); the trait
//! covers the request/response operations.

use crate::error::CredentialError;
use crate::session::Session;
use agentdesk_core::AccessToken;
use async_trait::async_trait;

/// A session lifecycle event from the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// The user completed sign-in.
    SignedIn(Session),
    /// The provider refreshed the access token. Not a no-op: a refreshed
    /// token can carry updated claims, so it re-runs resolution.
    TokenRefreshed(Session),
    /// A pre-existing session was discovered at startup.
    InitialSession(Session),
    /// The session ended.
    SignedOut,
}

impl AuthEvent {
    /// Returns the session payload, if the event carries one.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::SignedIn(s) | Self::TokenRefreshed(s) | Self::InitialSession(s) => Some(s),
            Self::SignedOut => None,
        }
    }

    /// Returns a short name for tracing.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SignedIn(_) => "signed_in",
            Self::TokenRefreshed(_) => "token_refreshed",
            Self::InitialSession(_) => "initial_session",
            Self::SignedOut => "signed_out",
        }
    }
}

/// Operations the engine invokes on the identity provider.
///
/// Implementations wrap a concrete provider SDK; the in-memory test double
/// in the engine tests shows the expected semantics.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Returns the current session, or `None` when not signed in.
    async fn current_session(&self) -> Result<Option<Session>, CredentialError>;

    /// Returns a short-lived access token for the current session, or
    /// `None` when the provider cannot mint one right now.
    async fn access_token(&self) -> Result<Option<AccessToken>, CredentialError>;

    /// Asks the provider to end the session. Local state clearing does not
    /// wait for this call; see the engine's sign-out handling.
    async fn request_sign_out(&self) -> Result<(), CredentialError>;
}
