//! Explicit composition root.
//!
//! Builds the store, the HTTP client, the broadcaster, the manager and
//! the use cases and wires them together by passing references - no
//! ambient service lookup anywhere in the core.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api::AuthClient;
use crate::auth::TokenSessionManager;
use crate::config::Config;
use crate::state::{AuthNotifier, AuthStateBroadcaster};
use crate::store::{KeyringTokenStore, TokenStore};
use crate::usecase::{BootstrapUseCase, LoginUseCase, LogoutUseCase};

/// The fully wired session core. The application shell keeps one of
/// these for the life of the process; UI layers observe
/// `broadcaster` and invoke the use cases.
pub struct SessionStack {
    pub manager: TokenSessionManager,
    pub broadcaster: AuthStateBroadcaster,
    pub bootstrap: BootstrapUseCase,
    pub login: LoginUseCase,
    pub logout: LogoutUseCase,
}

impl SessionStack {
    /// Wire the stack against the OS keychain.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_store(config, Arc::new(KeyringTokenStore::new()))
    }

    /// Wire the stack against a caller-supplied store, e.g. an
    /// in-memory one on targets without a keychain.
    pub fn with_store(config: &Config, store: Arc<dyn TokenStore>) -> Result<Self> {
        let client = Arc::new(
            AuthClient::new(config.base_url.clone(), config.request_timeout())
                .context("Failed to build auth client")?,
        );

        let broadcaster = AuthStateBroadcaster::new();
        let notifier: Arc<dyn AuthNotifier> = Arc::new(broadcaster.clone());

        // The same client serves both trait seams; it performs no
        // bearer injection, which keeps the refresh path non-recursive.
        let manager = TokenSessionManager::new(store, client.clone(), notifier.clone());

        Ok(Self {
            manager: manager.clone(),
            broadcaster,
            bootstrap: BootstrapUseCase::new(manager.clone(), notifier.clone()),
            login: LoginUseCase::new(client.clone(), manager.clone(), notifier.clone()),
            logout: LogoutUseCase::new(client, manager, notifier),
        })
    }
}
