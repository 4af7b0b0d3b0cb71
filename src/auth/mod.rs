//! Token session management.
//!
//! This module provides:
//! - `TokenSessionManager`: single-flight token refresh and the
//!   in-memory/persisted token state
//! - `expiry`: embedded-expiry judgment with a safety buffer
//!
//! The manager is the only component allowed to decide whether the
//! current session is usable; everything else either asks it for a
//! token or observes the resulting app state.

pub mod expiry;
pub mod manager;

pub use manager::TokenSessionManager;
