//! Session use cases: the named operations the application shell calls.
//!
//! Each use case orchestrates the token manager, the remote auth calls
//! and the state broadcaster into one operation with a defined
//! success/failure contract. UI layers never talk to the manager
//! directly; they run a use case and observe the resulting state.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::api::{AuthError, AuthGateway};
use crate::auth::TokenSessionManager;
use crate::models::TokenPair;
use crate::state::AuthNotifier;

/// Outcome of the startup check. Bootstrap never fails: either a valid
/// session was established or the user must log in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Authenticated,
    Unauthenticated,
}

/// Determines the initial auth state on app start.
pub struct BootstrapUseCase {
    manager: TokenSessionManager,
    notifier: Arc<dyn AuthNotifier>,
}

impl BootstrapUseCase {
    pub fn new(manager: TokenSessionManager, notifier: Arc<dyn AuthNotifier>) -> Self {
        Self { manager, notifier }
    }

    /// Resolve `Bootstrapping` into one of the two stable states. The
    /// manager handles the whole ladder: memory, persisted token,
    /// refresh. A transient failure just means "not authenticated right
    /// now" and destroys nothing.
    pub async fn run(&self) -> BootstrapOutcome {
        match self.manager.ensure_valid_access_token().await {
            Some(_) => {
                self.notifier.set_authenticated(None);
                BootstrapOutcome::Authenticated
            }
            None => {
                self.notifier.set_unauthenticated(None);
                BootstrapOutcome::Unauthenticated
            }
        }
    }
}

/// Exchanges credentials for a session.
pub struct LoginUseCase {
    auth: Arc<dyn AuthGateway>,
    manager: TokenSessionManager,
    notifier: Arc<dyn AuthNotifier>,
}

impl LoginUseCase {
    pub fn new(
        auth: Arc<dyn AuthGateway>,
        manager: TokenSessionManager,
        notifier: Arc<dyn AuthNotifier>,
    ) -> Self {
        Self {
            auth,
            manager,
            notifier,
        }
    }

    /// Log in and establish the session. On any failure - including a
    /// failure to persist the new tokens - the session is left in a
    /// clean unauthenticated state and the error is propagated for the
    /// caller to present.
    pub async fn run(&self, username: &str, password: &str) -> Result<TokenPair, AuthError> {
        match self.auth.login(username, password).await {
            Ok(pair) => {
                if let Err(err) = self
                    .manager
                    .save_tokens(&pair.access_token, &pair.refresh_token)
                    .await
                {
                    warn!(error = %err, "login succeeded but tokens could not be saved");
                    self.fail_clean().await;
                    return Err(err);
                }
                self.notifier.set_authenticated(Some(username.to_string()));
                Ok(pair)
            }
            Err(err) => {
                self.fail_clean().await;
                Err(err)
            }
        }
    }

    async fn fail_clean(&self) {
        if let Err(err) = self.manager.clear_tokens().await {
            warn!(error = %err, "failed to clear tokens after login failure");
        }
        self.notifier.set_unauthenticated(None);
    }
}

/// Terminates the session, locally always and remotely best-effort.
pub struct LogoutUseCase {
    auth: Arc<dyn AuthGateway>,
    manager: TokenSessionManager,
    notifier: Arc<dyn AuthNotifier>,
}

impl LogoutUseCase {
    pub fn new(
        auth: Arc<dyn AuthGateway>,
        manager: TokenSessionManager,
        notifier: Arc<dyn AuthNotifier>,
    ) -> Self {
        Self {
            auth,
            manager,
            notifier,
        }
    }

    /// The remote call goes first but its result is advisory only; the
    /// local session is terminated no matter what the server says or
    /// whether it answers at all.
    pub async fn run(&self) {
        let bearer = self.manager.get_access_token();
        if let Err(err) = self.auth.logout(bearer.as_deref()).await {
            debug!(error = %err, "remote logout failed; clearing local session anyway");
        }

        if let Err(err) = self.manager.clear_tokens().await {
            warn!(error = %err, "failed to clear tokens during logout");
        }
        self.notifier.set_unauthenticated(None);
    }
}
