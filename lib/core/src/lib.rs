//! Core domain types and utilities for the agentdesk platform.
//!
//! This crate provides the foundational types and error handling shared
//! across the agentdesk real-estate back-office crates.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{AccessToken, IdentityId};
