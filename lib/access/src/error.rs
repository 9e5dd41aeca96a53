//! Error types for the agentdesk-access crate.
//!
//! The taxonomy follows the failure semantics of the resolution engine:
//! - `CredentialError`: the identity provider could not be reached or refused
//! - `StoreError`: the secondary store read/write failed
//! - `ResolutionError`: how a resolution attempt ended short of full success
//! - `RoleDenied`: a role switch or gate check rejected a requested role
//!
//! I/O errors are caught at the adapter boundary and translated into one of
//! these kinds before reaching the state machine; the state machine never
//! lets a raw I/O error escape its public operations.

use crate::role::Role;
use std::fmt;
use std::time::Duration;

/// Errors from the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// The provider could not be reached.
    ProviderUnavailable { reason: String },
    /// The provider rejected the request.
    Rejected { reason: String },
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProviderUnavailable { reason } => {
                write!(f, "identity provider unavailable: {reason}")
            }
            Self::Rejected { reason } => {
                write!(f, "identity provider rejected request: {reason}")
            }
        }
    }
}

impl std::error::Error for CredentialError {}

/// Errors from the secondary store.
///
/// A missing profile record is not an error; `get_profile` returns `None`
/// for that case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or timed out.
    Unavailable { reason: String },
    /// The store refused the operation (expired or insufficient token).
    PermissionDenied { reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "secondary store unavailable: {reason}"),
            Self::PermissionDenied { reason } => {
                write!(f, "secondary store permission denied: {reason}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// How a resolution attempt failed.
///
/// `TransientFetch` and `InvalidRole` are recovered locally by falling back
/// to the policy over an empty role set; they are recorded on the session
/// state for observability but do not block the user. `InitializationTimeout`
/// is terminal for the attempt and recoverable only by caller-driven retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// The secondary-store read failed (network, timeout, permission).
    TransientFetch { reason: String },
    /// The store returned a role string outside the closed role set.
    InvalidRole { value: String },
    /// The watchdog fired before resolution completed.
    InitializationTimeout { bound: Duration },
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransientFetch { reason } => {
                write!(f, "profile fetch failed: {reason}")
            }
            Self::InvalidRole { value } => {
                write!(f, "store returned unknown role: {value}")
            }
            Self::InitializationTimeout { bound } => {
                write!(
                    f,
                    "session resolution did not complete within {}ms",
                    bound.as_millis()
                )
            }
        }
    }
}

impl std::error::Error for ResolutionError {}

impl From<StoreError> for ResolutionError {
    fn from(e: StoreError) -> Self {
        Self::TransientFetch {
            reason: e.to_string(),
        }
    }
}

impl From<CredentialError> for ResolutionError {
    fn from(e: CredentialError) -> Self {
        Self::TransientFetch {
            reason: e.to_string(),
        }
    }
}

/// A rejected role switch.
///
/// This is a normal return value, not a fault: the caller asked for a role
/// the current user does not hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleDenied {
    /// The role that was requested.
    pub requested: Role,
}

impl fmt::Display for RoleDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "role not held: {}", self.requested)
    }
}

impl std::error::Error for RoleDenied {}
