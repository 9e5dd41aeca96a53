//! The session state machine.
//!
//! The engine owns the [`SessionState`] read model and is its only writer.
//! Credential-source events drive transitions; role resolution runs off the
//! critical path and publishes its result only if it is still current.
//!
//! # Staleness
//!
//! Every sign-in and sign-out bumps a generation counter. Asynchronous
//! continuations (the profile fetch, the watchdog) capture the generation at
//! the start of their attempt and apply their result only when the counter
//! is unchanged, so a late-arriving resolution for a superseded session is
//! discarded on arrival rather than overwriting fresher state.
//!
//! # Locking
//!
//! State lives behind a `std::sync::Mutex` that is never held across an
//! await point; the membership checks and role switches the UI needs at
//! render time are therefore synchronous.

use crate::config::AccessConfig;
use crate::credential::{AuthEvent, CredentialSource};
use crate::error::{ResolutionError, RoleDenied};
use crate::notify::{NotificationKind, NotificationSink};
use crate::policy::RolePolicy;
use crate::role::{Role, RoleSet};
use crate::session::{AuthPhase, Profile, Session, SessionState, UserIdentity};
use crate::storage::{ACTIVE_ROLE_KEY, CACHED_EMAIL_KEY, DurableStorage};
use crate::store::{RoleStore, RoleStoreAdapter};
use crate::watchdog::Watchdog;
use agentdesk_core::AccessToken;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

struct EngineState {
    snapshot: SessionState,
    generation: u64,
    watchdog: Option<Watchdog>,
}

struct EngineShared<C, S, D, N> {
    credentials: C,
    store: RoleStoreAdapter<S>,
    storage: D,
    notifier: N,
    policy: RolePolicy,
    init_timeout: Duration,
    state: Mutex<EngineState>,
}

/// The session and role resolution engine.
///
/// Cheap to clone; clones share one state machine.
pub struct SessionEngine<C, S, D, N> {
    shared: Arc<EngineShared<C, S, D, N>>,
}

impl<C, S, D, N> Clone for SessionEngine<C, S, D, N> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C, S, D, N> SessionEngine<C, S, D, N>
where
    C: CredentialSource + 'static,
    S: RoleStore + 'static,
    D: DurableStorage + 'static,
    N: NotificationSink + 'static,
{
    /// Creates an engine over the injected collaborators.
    #[must_use]
    pub fn new(credentials: C, store: S, storage: D, notifier: N, config: &AccessConfig) -> Self {
        let policy = RolePolicy::new(config.special_admin_email.clone(), config.default_role);
        Self {
            shared: Arc::new(EngineShared {
                credentials,
                store: RoleStoreAdapter::new(store),
                storage,
                notifier,
                policy,
                init_timeout: config.init_timeout(),
                state: Mutex::new(EngineState {
                    snapshot: SessionState::uninitialized(config.default_role),
                    generation: 0,
                    watchdog: None,
                }),
            }),
        }
    }

    /// Returns the current read model.
    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.shared.state.lock().unwrap().snapshot.clone()
    }

    /// Returns the role policy shared with route gates.
    #[must_use]
    pub fn policy(&self) -> &RolePolicy {
        &self.shared.policy
    }

    /// Checks the credential source for an existing session and resolves it.
    ///
    /// Call once at application startup, before processing the event stream.
    pub async fn initialize(&self) {
        let bound = self.shared.init_timeout;
        match self.shared.credentials.current_session().await {
            Ok(Some(session)) => {
                debug!(subject = %session.subject(), "existing session found");
                self.resolve_session(session, bound).await;
            }
            Ok(None) => {
                debug!("no existing session");
                {
                    let mut state = self.shared.state.lock().unwrap();
                    state.generation += 1;
                    state.watchdog = None;
                    state.snapshot = SessionState::signed_out(self.shared.policy.default_role());
                }
                self.shared.storage.remove(CACHED_EMAIL_KEY);
            }
            Err(e) => {
                warn!(error = %e, "failed to read session from identity provider");
                {
                    let mut state = self.shared.state.lock().unwrap();
                    state.generation += 1;
                    state.watchdog = None;
                    let mut snapshot =
                        SessionState::signed_out(self.shared.policy.default_role());
                    snapshot.phase = AuthPhase::Errored;
                    snapshot.error = Some(ResolutionError::from(e));
                    state.snapshot = snapshot;
                }
                self.shared
                    .notifier
                    .notify(NotificationKind::Error, "Failed to initialize authentication.");
            }
        }
    }

    /// Applies a credential-source event with the default initialization
    /// bound.
    pub async fn handle_event(&self, event: AuthEvent) {
        let bound = self.shared.init_timeout;
        self.handle_event_with_bound(event, bound).await;
    }

    /// Applies a credential-source event with a caller-chosen watchdog
    /// bound (e.g. the shorter protected-route bound).
    pub async fn handle_event_with_bound(&self, event: AuthEvent, bound: Duration) {
        debug!(kind = event.kind(), "auth event");
        match event {
            AuthEvent::SignedOut => self.apply_signed_out(),
            AuthEvent::SignedIn(session)
            | AuthEvent::TokenRefreshed(session)
            | AuthEvent::InitialSession(session) => {
                self.resolve_session(session, bound).await;
            }
        }
    }

    /// Consumes the credential-source event stream until it closes.
    pub async fn run(&self, mut events: mpsc::Receiver<AuthEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        debug!("auth event stream closed");
    }

    /// Switches the active role.
    ///
    /// Synchronous: switching among already-resolved roles requires no
    /// network round-trip. The new active role is persisted so it survives
    /// reloads.
    ///
    /// # Errors
    ///
    /// Returns [`RoleDenied`] (and notifies) when the user does not hold
    /// the requested role.
    pub fn switch_role(&self, role: Role) -> Result<(), RoleDenied> {
        let switched = {
            let mut state = self.shared.state.lock().unwrap();
            if state.snapshot.roles.contains(role) {
                let mut next = state.snapshot.clone();
                next.active_role = role;
                state.snapshot = next;
                self.shared.storage.set(ACTIVE_ROLE_KEY, role.as_str());
                true
            } else {
                false
            }
        };

        if switched {
            self.shared
                .notifier
                .notify(NotificationKind::Success, &format!("Switched to {role} role"));
            Ok(())
        } else {
            self.shared
                .notifier
                .notify(NotificationKind::Error, &format!("You do not have the {role} role"));
            Err(RoleDenied { requested: role })
        }
    }

    /// Memory-only role check, safe for render-time decisions.
    ///
    /// True when the resolved set contains the role, or when the role is
    /// `Admin` and the special-admin rule matches the current email (the
    /// cached email seeds this check before resolution completes).
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        let email = {
            let state = self.shared.state.lock().unwrap();
            if state.snapshot.roles.contains(role) {
                return true;
            }
            state.snapshot.email().map(str::to_string)
        };

        if role == Role::Admin {
            let email = email.or_else(|| self.shared.storage.get(CACHED_EMAIL_KEY));
            return self.shared.policy.is_special_admin(email.as_deref());
        }
        false
    }

    /// Reconfirms a role against the secondary store, for
    /// security-sensitive checks.
    ///
    /// # Errors
    ///
    /// Returns `TransientFetch` when the provider or store cannot answer.
    pub async fn has_role_confirmed(&self, role: Role) -> Result<bool, ResolutionError> {
        let (identity, email) = {
            let state = self.shared.state.lock().unwrap();
            (
                state.snapshot.user.as_ref().map(|u| u.id.clone()),
                state.snapshot.email().map(str::to_string),
            )
        };

        if role == Role::Admin && self.shared.policy.is_special_admin(email.as_deref()) {
            return Ok(true);
        }
        let Some(identity) = identity else {
            return Ok(false);
        };

        let token = self.access_token().await?;
        self.shared
            .store
            .check_role(&identity, role, token.as_ref())
            .await
    }

    /// Returns true if the current user should see administrative views.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    /// Returns true if a user is signed in.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.shared.state.lock().unwrap().snapshot.is_authenticated()
    }

    /// Signs the user out.
    ///
    /// Clears local state synchronously, then asks the provider to end the
    /// session: a slow or failing provider must never leave the UI stuck
    /// logged in, so the signed-out shape is published before the provider
    /// call is awaited.
    pub async fn sign_out(&self) {
        self.apply_signed_out();
        if let Err(e) = self.shared.credentials.request_sign_out().await {
            warn!(error = %e, "provider sign-out failed after local state was cleared");
            self.shared.notifier.notify(
                NotificationKind::Error,
                "Sign out from the identity provider failed; you have been signed out locally.",
            );
        }
    }

    /// The synchronous sign-out transition: clears session, user, profile,
    /// resets roles to the default shape, disarms the watchdog, and clears
    /// the persisted hints. No network call is awaited here.
    fn apply_signed_out(&self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.generation += 1;
            state.watchdog = None;
            state.snapshot = SessionState::signed_out(self.shared.policy.default_role());
            self.shared.storage.remove(ACTIVE_ROLE_KEY);
            self.shared.storage.remove(CACHED_EMAIL_KEY);
        }
        debug!("local session state cleared");
    }

    /// Stores the session shell synchronously, then resolves roles and
    /// publishes the result if still current.
    async fn resolve_session(&self, session: Session, bound: Duration) {
        let shared = &self.shared;
        let user = UserIdentity::from_session(&session);
        let email = session.email().map(str::to_string);
        let previous_active: Option<Role> = shared
            .storage
            .get(ACTIVE_ROLE_KEY)
            .and_then(|v| v.parse().ok());

        // Synchronous part: session shell first, so the UI can render a
        // name and email before roles arrive.
        let generation = {
            let mut state = shared.state.lock().unwrap();
            state.generation += 1;
            let generation = state.generation;
            state.snapshot = SessionState {
                session: Some(session.clone()),
                user: Some(user.clone()),
                profile: None,
                roles: RoleSet::single(shared.policy.default_role()),
                active_role: shared.policy.default_role(),
                phase: AuthPhase::Loading,
                loading: true,
                error: None,
            };
            let engine = self.clone();
            state.watchdog = Some(Watchdog::arm(bound, async move {
                engine.on_watchdog_fired(generation, bound);
            }));
            // Written under the lock so a sign-out cannot interleave
            // between the snapshot update and the persisted hint.
            if let Some(email) = session.email() {
                shared.storage.set(CACHED_EMAIL_KEY, email);
            }
            generation
        };

        match self.fetch_roles(&session).await {
            Ok((profile, raw_roles, token)) => {
                let resolution =
                    shared
                        .policy
                        .resolve(&raw_roles, email.as_deref(), previous_active);
                let applied = self.apply_resolution(
                    generation,
                    &session,
                    &user,
                    profile,
                    &resolution.roles,
                    resolution.active_role,
                    None,
                );
                if applied {
                    shared
                        .store
                        .spawn_role_sync(session.subject().clone(), resolution.roles, token);
                    debug!(active_role = %resolution.active_role, "session ready");
                }
            }
            Err(e) => {
                // The store being momentarily unavailable must not lock the
                // user out: fall back to policy over an empty role set and
                // record the failure for observability.
                warn!(error = %e, "role resolution failed, applying fallback roles");
                let resolution =
                    shared
                        .policy
                        .resolve(&RoleSet::new(), email.as_deref(), previous_active);
                self.apply_resolution(
                    generation,
                    &session,
                    &user,
                    None,
                    &resolution.roles,
                    resolution.active_role,
                    Some(e),
                );
            }
        }
    }

    async fn fetch_roles(
        &self,
        session: &Session,
    ) -> Result<(Option<Profile>, RoleSet, Option<AccessToken>), ResolutionError> {
        let token = self.access_token().await?;
        let fetched = self
            .shared
            .store
            .fetch_profile_and_roles(session.subject(), token.as_ref())
            .await?;
        Ok((fetched.profile, fetched.roles, token))
    }

    async fn access_token(&self) -> Result<Option<AccessToken>, ResolutionError> {
        self.shared
            .credentials
            .access_token()
            .await
            .map_err(ResolutionError::from)
    }

    /// Publishes a resolution outcome if its generation is still current.
    /// Returns false when the result was stale and discarded.
    #[expect(clippy::too_many_arguments)]
    fn apply_resolution(
        &self,
        generation: u64,
        session: &Session,
        user: &UserIdentity,
        profile: Option<Profile>,
        roles: &RoleSet,
        active_role: Role,
        error: Option<ResolutionError>,
    ) -> bool {
        {
            let mut state = self.shared.state.lock().unwrap();
            if state.generation != generation {
                debug!(
                    stale = generation,
                    current = state.generation,
                    "discarding stale resolution"
                );
                return false;
            }
            state.watchdog = None;
            state.snapshot = SessionState {
                session: Some(session.clone()),
                user: Some(user.clone()),
                profile,
                roles: roles.clone(),
                active_role,
                phase: AuthPhase::Ready,
                loading: false,
                error,
            };
            // Persisted inside the same critical section as the generation
            // check; a write landing after a sign-out cleared the key would
            // resurrect it.
            self.shared
                .storage
                .set(ACTIVE_ROLE_KEY, active_role.as_str());
        }
        true
    }

    /// Forces the terminal timeout state when the watchdog outlives
    /// resolution for the same generation.
    fn on_watchdog_fired(&self, generation: u64, bound: Duration) {
        let fired = {
            let mut state = self.shared.state.lock().unwrap();
            if state.generation != generation || !state.snapshot.loading {
                false
            } else {
                state.watchdog = None;
                let mut snapshot = state.snapshot.clone();
                snapshot.phase = AuthPhase::Errored;
                snapshot.loading = false;
                snapshot.error = Some(ResolutionError::InitializationTimeout { bound });
                state.snapshot = snapshot;
                true
            }
        };
        if fired {
            warn!(bound_ms = bound.as_millis() as u64, "session resolution timed out");
            self.shared.notifier.notify(
                NotificationKind::Error,
                "Authentication verification timed out.",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CredentialError, StoreError};
    use crate::notify::MemorySink;
    use crate::storage::MemoryStorage;
    use crate::store::ProfileRecord;
    use agentdesk_core::IdentityId;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    const ADMIN_EMAIL: &str = "ops@agency.example";

    struct FakeCredentials {
        session: Option<Session>,
        fail_current_session: bool,
        fail_sign_out: bool,
        hang_sign_out: bool,
        sign_out_calls: AtomicUsize,
    }

    impl FakeCredentials {
        fn signed_out() -> Self {
            Self {
                session: None,
                fail_current_session: false,
                fail_sign_out: false,
                hang_sign_out: false,
                sign_out_calls: AtomicUsize::new(0),
            }
        }

        fn with_session(session: Session) -> Self {
            Self {
                session: Some(session),
                ..Self::signed_out()
            }
        }
    }

    #[async_trait]
    impl CredentialSource for FakeCredentials {
        async fn current_session(&self) -> Result<Option<Session>, CredentialError> {
            if self.fail_current_session {
                return Err(CredentialError::ProviderUnavailable {
                    reason: "dns failure".to_string(),
                });
            }
            Ok(self.session.clone())
        }

        async fn access_token(&self) -> Result<Option<AccessToken>, CredentialError> {
            Ok(self.session.as_ref().map(|_| AccessToken::from("tok")))
        }

        async fn request_sign_out(&self) -> Result<(), CredentialError> {
            self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
            if self.hang_sign_out {
                std::future::pending::<()>().await;
            }
            if self.fail_sign_out {
                return Err(CredentialError::ProviderUnavailable {
                    reason: "gateway timeout".to_string(),
                });
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeStore {
        record: Arc<Mutex<Option<ProfileRecord>>>,
        fail_reads: bool,
        read_gate: Option<Arc<Notify>>,
        read_started: Option<Arc<Notify>>,
    }

    impl FakeStore {
        fn with_roles(identity: &str, roles: &[&str]) -> Self {
            Self {
                record: Arc::new(Mutex::new(Some(ProfileRecord {
                    identity_id: IdentityId::from(identity),
                    roles: roles.iter().map(|s| s.to_string()).collect(),
                    primary_role: None,
                    metadata: serde_json::Value::Null,
                }))),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl RoleStore for FakeStore {
        async fn get_profile(
            &self,
            _identity: &IdentityId,
            _token: Option<&AccessToken>,
        ) -> Result<Option<ProfileRecord>, StoreError> {
            if let Some(started) = &self.read_started {
                started.notify_one();
            }
            if let Some(gate) = &self.read_gate {
                gate.notified().await;
            }
            if self.fail_reads {
                return Err(StoreError::Unavailable {
                    reason: "connection reset".to_string(),
                });
            }
            Ok(self.record.lock().unwrap().clone())
        }

        async fn upsert_roles(
            &self,
            _identity: &IdentityId,
            _roles: &[Role],
            _token: Option<&AccessToken>,
        ) -> Result<bool, StoreError> {
            Ok(true)
        }

        async fn check_role(
            &self,
            _identity: &IdentityId,
            role: Role,
            _token: Option<&AccessToken>,
        ) -> Result<bool, StoreError> {
            let record = self.record.lock().unwrap();
            Ok(record
                .as_ref()
                .is_some_and(|r| r.roles.iter().any(|s| s == role.as_str())))
        }
    }

    fn session(identity: &str, email: &str) -> Session {
        Session::new(IdentityId::from(identity), Some(email.to_string()), None)
    }

    fn config() -> AccessConfig {
        AccessConfig {
            special_admin_email: Some(ADMIN_EMAIL.to_string()),
            ..AccessConfig::default()
        }
    }

    type TestEngine =
        SessionEngine<FakeCredentials, FakeStore, Arc<MemoryStorage>, Arc<MemorySink>>;

    struct Harness {
        engine: TestEngine,
        storage: Arc<MemoryStorage>,
        sink: Arc<MemorySink>,
    }

    fn harness(credentials: FakeCredentials, store: FakeStore) -> Harness {
        let storage = Arc::new(MemoryStorage::new());
        let sink = Arc::new(MemorySink::new());
        let engine = SessionEngine::new(
            credentials,
            store,
            Arc::clone(&storage),
            Arc::clone(&sink),
            &config(),
        );
        Harness {
            engine,
            storage,
            sink,
        }
    }

    #[tokio::test]
    async fn cold_start_with_existing_session() {
        let s = session("u1", "not-admin@example.com");
        let h = harness(
            FakeCredentials::with_session(s),
            FakeStore::with_roles("u1", &["agent"]),
        );

        h.engine.initialize().await;

        let state = h.engine.snapshot();
        assert!(!state.loading);
        assert_eq!(state.phase, AuthPhase::Ready);
        assert_eq!(state.roles, RoleSet::single(Role::Agent));
        assert_eq!(state.active_role, Role::Agent);
        assert!(state.is_authenticated());
        assert!(state.error.is_none());
        assert_eq!(
            h.storage.get(CACHED_EMAIL_KEY),
            Some("not-admin@example.com".to_string())
        );
    }

    #[tokio::test]
    async fn cold_start_without_session() {
        let h = harness(FakeCredentials::signed_out(), FakeStore::default());
        h.engine.initialize().await;

        let state = h.engine.snapshot();
        assert_eq!(state, SessionState::signed_out(Role::Agent));
    }

    #[tokio::test]
    async fn provider_failure_at_startup_is_errored() {
        let credentials = FakeCredentials {
            fail_current_session: true,
            ..FakeCredentials::signed_out()
        };
        let h = harness(credentials, FakeStore::default());
        h.engine.initialize().await;

        let state = h.engine.snapshot();
        assert_eq!(state.phase, AuthPhase::Errored);
        assert!(!state.loading);
        assert!(matches!(
            state.error,
            Some(ResolutionError::TransientFetch { .. })
        ));
        assert!(h.sink.contains(NotificationKind::Error, "initialize"));
    }

    #[tokio::test]
    async fn special_admin_first_login_without_profile_row() {
        let s = session("u2", ADMIN_EMAIL);
        let h = harness(FakeCredentials::with_session(s.clone()), FakeStore::default());

        h.engine.handle_event(AuthEvent::SignedIn(s)).await;

        let state = h.engine.snapshot();
        assert_eq!(state.roles, RoleSet::single(Role::Admin));
        assert_eq!(state.active_role, Role::Admin);
        assert!(state.profile.is_none());
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn store_failure_falls_back_without_locking_the_user_out() {
        let s = session("u1", "not-admin@example.com");
        let store = FakeStore {
            fail_reads: true,
            ..FakeStore::default()
        };
        let h = harness(FakeCredentials::with_session(s.clone()), store);

        h.engine.handle_event(AuthEvent::SignedIn(s)).await;

        let state = h.engine.snapshot();
        assert_eq!(state.phase, AuthPhase::Ready);
        assert!(!state.loading);
        assert_eq!(state.roles, RoleSet::single(Role::Agent));
        assert_eq!(state.active_role, Role::Agent);
        assert!(matches!(
            state.error,
            Some(ResolutionError::TransientFetch { .. })
        ));
        // The fallback is silent.
        assert!(h.sink.entries().is_empty());
    }

    #[tokio::test]
    async fn token_refresh_re_resolves_roles() {
        let s = session("u1", "not-admin@example.com");
        let store = FakeStore::with_roles("u1", &["agent"]);
        let record = Arc::clone(&store.record);
        let h = harness(FakeCredentials::with_session(s.clone()), store);

        h.engine.handle_event(AuthEvent::SignedIn(s.clone())).await;
        assert_eq!(h.engine.snapshot().roles, RoleSet::single(Role::Agent));

        // Assignments changed between issue and refresh.
        record
            .lock()
            .unwrap()
            .as_mut()
            .unwrap()
            .roles
            .push("manager".to_string());
        h.engine.handle_event(AuthEvent::TokenRefreshed(s)).await;

        let state = h.engine.snapshot();
        assert_eq!(
            state.roles,
            RoleSet::from_roles([Role::Agent, Role::Manager])
        );
    }

    #[tokio::test]
    async fn sign_out_clears_synchronously() {
        let s = session("u1", "not-admin@example.com");
        let h = harness(
            FakeCredentials::with_session(s.clone()),
            FakeStore::with_roles("u1", &["agent"]),
        );
        h.engine.handle_event(AuthEvent::SignedIn(s)).await;
        assert!(h.engine.is_authenticated());

        h.engine.handle_event(AuthEvent::SignedOut).await;

        assert_eq!(h.engine.snapshot(), SessionState::signed_out(Role::Agent));
        assert_eq!(h.storage.get(ACTIVE_ROLE_KEY), None);
        assert_eq!(h.storage.get(CACHED_EMAIL_KEY), None);
    }

    #[tokio::test]
    async fn sign_out_survives_provider_failure() {
        let s = session("u1", "not-admin@example.com");
        let credentials = FakeCredentials {
            fail_sign_out: true,
            ..FakeCredentials::with_session(s.clone())
        };
        let h = harness(credentials, FakeStore::with_roles("u1", &["agent"]));
        h.engine.handle_event(AuthEvent::SignedIn(s)).await;

        h.engine.sign_out().await;

        assert_eq!(h.engine.snapshot(), SessionState::signed_out(Role::Agent));
        assert!(h.sink.contains(NotificationKind::Error, "signed out locally"));
    }

    #[tokio::test]
    async fn sign_out_clears_locally_while_provider_hangs() {
        let s = session("u1", "not-admin@example.com");
        let credentials = FakeCredentials {
            hang_sign_out: true,
            ..FakeCredentials::with_session(s.clone())
        };
        let h = harness(credentials, FakeStore::with_roles("u1", &["agent"]));
        h.engine.handle_event(AuthEvent::SignedIn(s)).await;
        assert!(h.engine.is_authenticated());

        let engine = h.engine.clone();
        let pending = tokio::spawn(async move { engine.sign_out().await });

        // The provider call never completes; local state must clear anyway.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!h.engine.is_authenticated());
        assert_eq!(h.engine.snapshot(), SessionState::signed_out(Role::Agent));
        assert_eq!(h.storage.get(ACTIVE_ROLE_KEY), None);
        assert!(!pending.is_finished());
        pending.abort();
    }

    #[tokio::test]
    async fn stale_resolution_is_discarded_after_sign_out() {
        let started = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        let s = session("u1", "not-admin@example.com");
        let store = FakeStore {
            read_started: Some(Arc::clone(&started)),
            read_gate: Some(Arc::clone(&gate)),
            ..FakeStore::with_roles("u1", &["agent", "manager"])
        };
        let h = harness(FakeCredentials::with_session(s.clone()), store);

        let engine = h.engine.clone();
        let resolution = tokio::spawn(async move {
            engine.handle_event(AuthEvent::SignedIn(s)).await;
        });

        // Wait until the profile fetch is in flight, then sign out under it.
        started.notified().await;
        h.engine.handle_event(AuthEvent::SignedOut).await;
        gate.notify_one();
        resolution.await.expect("resolution task");

        assert_eq!(h.engine.snapshot(), SessionState::signed_out(Role::Agent));
        // Neither persisted hint may be resurrected by the discarded result.
        assert_eq!(h.storage.get(ACTIVE_ROLE_KEY), None);
        assert_eq!(h.storage.get(CACHED_EMAIL_KEY), None);
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_forces_timeout_state() {
        let gate = Arc::new(Notify::new());
        let s = session("u1", "not-admin@example.com");
        let store = FakeStore {
            read_gate: Some(gate),
            ..FakeStore::with_roles("u1", &["agent"])
        };
        let h = harness(FakeCredentials::with_session(s.clone()), store);

        let engine = h.engine.clone();
        let pending = tokio::spawn(async move {
            engine
                .handle_event_with_bound(AuthEvent::SignedIn(s), Duration::from_secs(10))
                .await;
        });

        tokio::time::sleep(Duration::from_secs(11)).await;

        let state = h.engine.snapshot();
        assert_eq!(state.phase, AuthPhase::Errored);
        assert!(!state.loading);
        assert!(matches!(
            state.error,
            Some(ResolutionError::InitializationTimeout { .. })
        ));
        assert!(h.sink.contains(NotificationKind::Error, "timed out"));
        pending.abort();
    }

    #[tokio::test]
    async fn run_consumes_the_event_stream_until_it_closes() {
        let s = session("u1", "not-admin@example.com");
        let h = harness(
            FakeCredentials::signed_out(),
            FakeStore::with_roles("u1", &["agent", "finance"]),
        );
        let (tx, rx) = mpsc::channel(8);
        let engine = h.engine.clone();
        let driver = tokio::spawn(async move { engine.run(rx).await });

        tx.send(AuthEvent::SignedIn(s)).await.expect("send");
        for _ in 0..100 {
            tokio::task::yield_now().await;
            if h.engine.snapshot().phase == AuthPhase::Ready {
                break;
            }
        }
        let state = h.engine.snapshot();
        assert_eq!(
            state.roles,
            RoleSet::from_roles([Role::Agent, Role::Finance])
        );
        assert!(state.is_authenticated());

        tx.send(AuthEvent::SignedOut).await.expect("send");
        drop(tx);
        driver.await.expect("event loop");

        assert_eq!(h.engine.snapshot(), SessionState::signed_out(Role::Agent));
    }

    #[tokio::test]
    async fn switch_role_rejects_roles_not_held() {
        let s = session("u1", "not-admin@example.com");
        let h = harness(
            FakeCredentials::with_session(s.clone()),
            FakeStore::with_roles("u1", &["agent"]),
        );
        h.engine.handle_event(AuthEvent::SignedIn(s)).await;

        let err = h.engine.switch_role(Role::Admin).unwrap_err();
        assert_eq!(err.requested, Role::Admin);
        assert_eq!(h.engine.snapshot().active_role, Role::Agent);
        assert!(h.sink.contains(NotificationKind::Error, "admin"));
    }

    #[tokio::test]
    async fn switch_role_updates_and_persists() {
        let s = session("u1", "not-admin@example.com");
        let h = harness(
            FakeCredentials::with_session(s.clone()),
            FakeStore::with_roles("u1", &["agent", "finance"]),
        );
        h.engine.handle_event(AuthEvent::SignedIn(s)).await;

        h.engine.switch_role(Role::Finance).expect("role held");

        assert_eq!(h.engine.snapshot().active_role, Role::Finance);
        assert_eq!(h.storage.get(ACTIVE_ROLE_KEY), Some("finance".to_string()));
        assert!(h.sink.contains(NotificationKind::Success, "finance"));
    }

    #[tokio::test]
    async fn persisted_active_role_survives_restart() {
        let s = session("u1", "not-admin@example.com");
        let storage = Arc::new(MemoryStorage::new());
        storage.set(ACTIVE_ROLE_KEY, "finance");

        let engine = SessionEngine::new(
            FakeCredentials::with_session(s.clone()),
            FakeStore::with_roles("u1", &["agent", "finance"]),
            Arc::clone(&storage),
            Arc::new(MemorySink::new()),
            &config(),
        );
        engine.handle_event(AuthEvent::SignedIn(s)).await;

        assert_eq!(engine.snapshot().active_role, Role::Finance);
    }

    #[tokio::test]
    async fn revoked_persisted_role_falls_back_to_policy_choice() {
        let s = session("u1", "not-admin@example.com");
        let storage = Arc::new(MemoryStorage::new());
        storage.set(ACTIVE_ROLE_KEY, "manager");

        let engine = SessionEngine::new(
            FakeCredentials::with_session(s.clone()),
            FakeStore::with_roles("u1", &["agent", "finance"]),
            Arc::clone(&storage),
            Arc::new(MemorySink::new()),
            &config(),
        );
        engine.handle_event(AuthEvent::SignedIn(s)).await;

        let state = engine.snapshot();
        assert_eq!(state.active_role, Role::Agent);
        assert!(state.roles.contains(state.active_role));
    }

    #[tokio::test]
    async fn has_role_applies_special_admin_rule() {
        let s = session("u2", ADMIN_EMAIL);
        let h = harness(
            FakeCredentials::with_session(s.clone()),
            FakeStore::with_roles("u2", &["agent"]),
        );
        h.engine.handle_event(AuthEvent::SignedIn(s)).await;

        assert!(h.engine.has_role(Role::Agent));
        assert!(h.engine.has_role(Role::Admin));
        assert!(h.engine.is_admin());
        assert!(!h.engine.has_role(Role::Finance));
    }

    #[tokio::test]
    async fn has_role_confirmed_rechecks_the_store() {
        let s = session("u1", "not-admin@example.com");
        let h = harness(
            FakeCredentials::with_session(s.clone()),
            FakeStore::with_roles("u1", &["agent"]),
        );
        h.engine.handle_event(AuthEvent::SignedIn(s)).await;

        assert!(h.engine.has_role_confirmed(Role::Agent).await.unwrap());
        assert!(!h.engine.has_role_confirmed(Role::Admin).await.unwrap());
    }

    #[tokio::test]
    async fn active_role_membership_invariant_holds_across_transitions() {
        let s = session("u2", ADMIN_EMAIL);
        let h = harness(
            FakeCredentials::with_session(s.clone()),
            FakeStore::with_roles("u2", &["agent", "finance"]),
        );

        // The uninitialized shape seeds the default role.
        let state = h.engine.snapshot();
        assert!(state.roles.contains(state.active_role));

        h.engine.handle_event(AuthEvent::SignedIn(s)).await;
        let state = h.engine.snapshot();
        assert!(!state.loading);
        assert!(state.roles.contains(state.active_role));

        h.engine.handle_event(AuthEvent::SignedOut).await;
        let state = h.engine.snapshot();
        assert!(!state.loading);
        assert!(state.roles.contains(state.active_role));
    }
}
