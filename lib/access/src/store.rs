//! Role store adapter: reads and reconciles profile data in the secondary
//! store.
//!
//! The adapter wraps an injected [`RoleStore`] implementation and is the
//! validation boundary for role data: raw role strings are parsed into the
//! closed [`Role`] set here, so invalid values fail fast at ingestion
//! instead of propagating. A missing profile record is a normal outcome
//! (first login), not an error.

use crate::error::{ResolutionError, StoreError};
use crate::role::{Role, RoleSet};
use crate::session::Profile;
use agentdesk_core::{AccessToken, IdentityId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, instrument, warn};

/// A raw profile row as returned by the secondary store, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    /// The identity this row belongs to.
    pub identity_id: IdentityId,
    /// Raw role strings; validated by the adapter.
    pub roles: Vec<String>,
    /// Raw primary-role string, if recorded.
    pub primary_role: Option<String>,
    /// Store-specific metadata carried through untouched.
    #[serde(default)]
    pub metadata: JsonValue,
}

/// Operations the engine needs from the secondary store.
///
/// Implementations wrap the concrete database client; the in-memory doubles
/// in this crate's tests show the expected semantics.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Reads the profile row for an identity. `Ok(None)` means the store
    /// has no record yet.
    async fn get_profile(
        &self,
        identity: &IdentityId,
        token: Option<&AccessToken>,
    ) -> Result<Option<ProfileRecord>, StoreError>;

    /// Idempotently writes role assignments for an identity. Returns true
    /// if the store changed.
    async fn upsert_roles(
        &self,
        identity: &IdentityId,
        roles: &[Role],
        token: Option<&AccessToken>,
    ) -> Result<bool, StoreError>;

    /// Re-confirms a single role assignment against the store.
    async fn check_role(
        &self,
        identity: &IdentityId,
        role: Role,
        token: Option<&AccessToken>,
    ) -> Result<bool, StoreError>;
}

/// A validated fetch result: the profile (if a row existed) and its roles.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedRoles {
    /// The validated profile, or `None` when the store had no row.
    pub profile: Option<Profile>,
    /// The role assignments; empty when there was no row.
    pub roles: RoleSet,
}

/// Adapter between the session engine and the secondary store.
pub struct RoleStoreAdapter<S> {
    store: Arc<S>,
    syncs_in_flight: Arc<Mutex<HashSet<IdentityId>>>,
}

impl<S> Clone for RoleStoreAdapter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            syncs_in_flight: Arc::clone(&self.syncs_in_flight),
        }
    }
}

impl<S: RoleStore + 'static> RoleStoreAdapter<S> {
    /// Wraps a store implementation.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
            syncs_in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Reads and validates the profile and role assignments for an identity.
    ///
    /// # Errors
    ///
    /// Returns `TransientFetch` when the store is unreachable or refuses the
    /// read, and `InvalidRole` when a stored role string is outside the
    /// closed role set. A missing row is not an error.
    #[instrument(skip(self, token), fields(identity = %identity))]
    pub async fn fetch_profile_and_roles(
        &self,
        identity: &IdentityId,
        token: Option<&AccessToken>,
    ) -> Result<FetchedRoles, ResolutionError> {
        let record = self.store.get_profile(identity, token).await?;

        let Some(record) = record else {
            debug!("no profile record for identity");
            return Ok(FetchedRoles {
                profile: None,
                roles: RoleSet::new(),
            });
        };

        let roles = RoleSet::parse_all(&record.roles)
            .map_err(|e| ResolutionError::InvalidRole { value: e.value })?;
        let primary_role = record
            .primary_role
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(|e: crate::role::ParseRoleError| ResolutionError::InvalidRole {
                value: e.value,
            })?;

        debug!(role_count = roles.len(), "profile fetched");
        Ok(FetchedRoles {
            profile: Some(Profile {
                identity_id: record.identity_id,
                roles: roles.clone(),
                primary_role,
                metadata: record.metadata,
            }),
            roles,
        })
    }

    /// Kicks off a best-effort background reconciliation of resolved roles
    /// into the store.
    ///
    /// At most one sync per identity is in flight at a time; a request for
    /// an identity with a sync already pending is dropped (the next sign-in
    /// or refresh re-triggers synchronization). Failures are logged and
    /// never surfaced to the user; there are no retries.
    ///
    /// Returns true if a sync was started, false if it was dropped.
    pub fn spawn_role_sync(
        &self,
        identity: IdentityId,
        roles: RoleSet,
        token: Option<AccessToken>,
    ) -> bool {
        {
            let mut in_flight = self.syncs_in_flight.lock().unwrap();
            if !in_flight.insert(identity.clone()) {
                debug!(%identity, "role sync already in flight, dropping request");
                return false;
            }
        }

        let store = Arc::clone(&self.store);
        let in_flight = Arc::clone(&self.syncs_in_flight);
        tokio::spawn(async move {
            match store
                .upsert_roles(&identity, roles.roles(), token.as_ref())
                .await
            {
                Ok(changed) => debug!(%identity, changed, "role sync completed"),
                Err(e) => warn!(%identity, error = %e, "role sync failed, store left stale"),
            }
            in_flight.lock().unwrap().remove(&identity);
        });
        true
    }

    /// Re-confirms a role assignment against the store, for
    /// security-sensitive checks.
    ///
    /// # Errors
    ///
    /// Returns `TransientFetch` when the store cannot answer.
    pub async fn check_role(
        &self,
        identity: &IdentityId,
        role: Role,
        token: Option<&AccessToken>,
    ) -> Result<bool, ResolutionError> {
        Ok(self.store.check_role(identity, role, token).await?)
    }
}
