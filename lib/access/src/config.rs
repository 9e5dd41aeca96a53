//! Configuration for the session and role resolution engine.
//!
//! Loaded from environment variables via the `config` crate; every field
//! other than the special-admin email has a default suitable for local
//! development.

use crate::role::Role;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine and route-gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Email granted unconditional admin access regardless of store state.
    /// `None` disables the override.
    #[serde(default)]
    pub special_admin_email: Option<String>,

    /// Role assigned when resolution yields an empty set, and the active
    /// role of the signed-out shape.
    #[serde(default = "default_role")]
    pub default_role: Role,

    /// Watchdog bound for whole-application initialization, in milliseconds.
    #[serde(default = "default_init_timeout_ms")]
    pub init_timeout_ms: u64,

    /// Watchdog bound for a single protected-route check, in milliseconds.
    #[serde(default = "default_route_timeout_ms")]
    pub route_timeout_ms: u64,

    /// Path unauthenticated users are redirected to.
    #[serde(default = "default_sign_in_path")]
    pub sign_in_path: String,

    /// Path users are redirected to when a route denies them.
    #[serde(default = "default_agent_home_path")]
    pub agent_home_path: String,
}

fn default_role() -> Role {
    Role::Agent
}

fn default_init_timeout_ms() -> u64 {
    15_000
}

fn default_route_timeout_ms() -> u64 {
    10_000
}

fn default_sign_in_path() -> String {
    "/sign-in".to_string()
}

fn default_agent_home_path() -> String {
    "/dashboard".to_string()
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            special_admin_email: None,
            default_role: default_role(),
            init_timeout_ms: default_init_timeout_ms(),
            route_timeout_ms: default_route_timeout_ms(),
            sign_in_path: default_sign_in_path(),
            agent_home_path: default_agent_home_path(),
        }
    }
}

impl AccessConfig {
    /// Loads configuration from `ACCESS__`-prefixed environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a present variable fails to parse.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("ACCESS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// The application-initialization watchdog bound.
    #[must_use]
    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    /// The protected-route-check watchdog bound.
    #[must_use]
    pub fn route_timeout(&self) -> Duration {
        Duration::from_millis(self.route_timeout_ms)
    }
}
