//! Strongly-typed wrappers for identity-provider-issued values.
//!
//! The identity provider owns the format of its identifiers and tokens;
//! agentdesk treats both as opaque strings. Newtypes keep them from being
//! confused with each other (or with arbitrary strings) at call sites.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for an authenticated identity, as issued by the
/// identity provider (the provider's subject claim).
///
/// Identity IDs are opaque; agentdesk never parses or generates them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(String);

impl IdentityId {
    /// Creates an identity ID from a provider-issued string.
    #[must_use]
    pub fn new(id: String) -> Self {
        Self(id)
    }

    /// Returns the identity ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for IdentityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for IdentityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A short-lived bearer token issued by the identity provider.
///
/// Tokens are opaque to agentdesk and are only forwarded to the secondary
/// store when reading or writing profile data. `Debug` and `Display`
/// deliberately redact the token value to keep it out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    /// Creates an access token from a provider-issued string.
    #[must_use]
    pub fn new(token: String) -> Self {
        Self(token)
    }

    /// Returns the raw token value for forwarding to a collaborator.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken(..)")
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken(..)")
    }
}

impl From<String> for AccessToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AccessToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
