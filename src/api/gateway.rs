//! Trait seams for the remote auth operations.
//!
//! The session core depends on these interfaces only; `AuthClient`
//! supplies the HTTP implementation and tests substitute stubs.

use async_trait::async_trait;

use super::AuthError;
use crate::models::TokenPair;

/// Exchanges a refresh token for a new token pair.
///
/// Implementations must issue the call through a client that carries no
/// automatic bearer-token injection, otherwise a refresh could trigger
/// another refresh and recurse.
#[async_trait]
pub trait RefreshGateway: Send + Sync {
    /// Perform exactly one refresh exchange. A 401/403 from the refresh
    /// endpoint means the refresh token itself was rejected and maps to
    /// [`AuthError::InvalidRefreshToken`]; connectivity problems map to
    /// [`AuthError::Transient`] and leave the session recoverable.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError>;
}

/// Remote login/logout operations consumed by the use cases.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<TokenPair, AuthError>;

    /// Notify the server of logout. Advisory only: callers ignore the
    /// result beyond logging. The current access token, if any, is
    /// attached as the bearer.
    async fn logout(&self, access_token: Option<&str>) -> Result<(), AuthError>;
}
