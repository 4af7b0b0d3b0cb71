//! Durable token persistence.
//!
//! This module provides:
//! - `TokenStore`: the capability interface the session core depends on
//! - `KeyringTokenStore`: OS keychain implementation (Keychain on macOS,
//!   Secret Service on Linux, Credential Manager on Windows)
//! - `MemoryTokenStore`: in-process map, used by tests and as an
//!   ephemeral fallback on targets without a keychain
//!
//! The core assumes individual reads and writes are atomic but performs
//! its own coordination; no locking is required of implementations
//! beyond that.

pub mod keyring;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use self::keyring::KeyringTokenStore;
pub use memory::MemoryTokenStore;

/// Store key for the persisted refresh token
pub const REFRESH_TOKEN_KEY: &str = "auth_refresh_token";

/// Store key for the persisted access token (restart fast path)
pub const ACCESS_TOKEN_KEY: &str = "auth_access_token";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("secure store backend error: {0}")]
    Backend(String),
}

// Storage problems are never session-destroying, so they surface as
// unclassified failures at the manager boundary.
impl From<StoreError> for crate::api::AuthError {
    fn from(err: StoreError) -> Self {
        crate::api::AuthError::Unknown(format!("storage: {err}"))
    }
}

/// Encrypted key-value persistence for session material.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a key. Must succeed when the key is absent.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Remove all session material.
    async fn clear(&self) -> Result<(), StoreError>;
}
