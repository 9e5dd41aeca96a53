//! Session and role resolution for agentdesk.
//!
//! This crate provides:
//! - The session state machine (`SessionEngine`) turning identity-provider
//!   events into a stable `SessionState` read model
//! - Role-based access control (`Role`, `RoleSet`, `RolePolicy`)
//! - Route gating (`RouteGate`, `RouteDecision`)
//! - The collaborator interfaces the engine is built over
//!   (`CredentialSource`, `RoleStore`, `DurableStorage`, `NotificationSink`)
//!
//! # Resolution Model
//!
//! Authentication and role assignment live in two systems that answer at
//! different speeds: the identity provider knows *who* is signed in, the
//! role store knows *what* they may do. The engine publishes a minimal user
//! shell synchronously on every sign-in, resolves roles off the critical
//! path, and reconciles the two under a generation counter so a stale
//! resolution can never overwrite a newer session. A watchdog bounds the
//! loading phase so the UI is never stuck on a spinner.
//!
//! # Example
//!
//! ```
//! use agentdesk_access::{
//!     AccessConfig, MemoryStorage, NullSink, Role, RouteDecision, RouteGate,
//!     RouteRequirements, SessionEngine,
//! };
//! # use agentdesk_access::{CredentialSource, CredentialError, RoleStore, StoreError,
//! #     ProfileRecord, Session};
//! # use agentdesk_core::{AccessToken, IdentityId};
//! # use async_trait::async_trait;
//! # struct Provider;
//! # #[async_trait]
//! # impl CredentialSource for Provider {
//! #     async fn current_session(&self) -> Result<Option<Session>, CredentialError> {
//! #         Ok(Some(Session::new(
//! #             IdentityId::from("user-1"),
//! #             Some("jane@example.com".to_string()),
//! #             None,
//! #         )))
//! #     }
//! #     async fn access_token(&self) -> Result<Option<AccessToken>, CredentialError> {
//! #         Ok(None)
//! #     }
//! #     async fn request_sign_out(&self) -> Result<(), CredentialError> { Ok(()) }
//! # }
//! # struct Store;
//! # #[async_trait]
//! # impl RoleStore for Store {
//! #     async fn get_profile(
//! #         &self,
//! #         _identity: &IdentityId,
//! #         _token: Option<&AccessToken>,
//! #     ) -> Result<Option<ProfileRecord>, StoreError> {
//! #         Ok(None)
//! #     }
//! #     async fn upsert_roles(
//! #         &self,
//! #         _identity: &IdentityId,
//! #         _roles: &[Role],
//! #         _token: Option<&AccessToken>,
//! #     ) -> Result<bool, StoreError> {
//! #         Ok(true)
//! #     }
//! #     async fn check_role(
//! #         &self,
//! #         _identity: &IdentityId,
//! #         _role: Role,
//! #         _token: Option<&AccessToken>,
//! #     ) -> Result<bool, StoreError> {
//! #         Ok(false)
//! #     }
//! # }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let config = AccessConfig::default();
//! let engine = SessionEngine::new(Provider, Store, MemoryStorage::new(), NullSink, &config);
//! engine.initialize().await;
//!
//! let gate = RouteGate::new(
//!     engine.policy().clone(),
//!     config.sign_in_path.clone(),
//!     config.agent_home_path.clone(),
//!     NullSink,
//! );
//! let decision = gate.evaluate(&engine.snapshot(), &RouteRequirements::authenticated());
//! assert_eq!(decision, RouteDecision::Allow);
//! # }
//! ```

pub mod config;
pub mod credential;
pub mod engine;
pub mod error;
pub mod gate;
pub mod notify;
pub mod policy;
pub mod role;
pub mod session;
pub mod storage;
pub mod store;
pub mod watchdog;

// Re-export main types at crate root
pub use config::AccessConfig;
pub use credential::{AuthEvent, CredentialSource};
pub use engine::SessionEngine;
pub use error::{CredentialError, ResolutionError, RoleDenied, StoreError};
pub use gate::{RouteDecision, RouteGate, RouteRequirements};
pub use notify::{MemorySink, NotificationKind, NotificationSink, NullSink};
pub use policy::{RolePolicy, RoleResolution};
pub use role::{ParseRoleError, Role, RoleSet};
pub use session::{AuthPhase, Profile, Session, SessionState, UserIdentity};
pub use storage::{ACTIVE_ROLE_KEY, CACHED_EMAIL_KEY, DurableStorage, MemoryStorage};
pub use store::{FetchedRoles, ProfileRecord, RoleStore, RoleStoreAdapter};
pub use watchdog::Watchdog;
