//! HTTP client for the backend auth endpoints.
//!
//! `AuthClient` implements both gateway traits over a single reqwest
//! client. The client never attaches authorization headers on its own -
//! login and refresh are public endpoints, and logout receives its
//! bearer explicitly from the caller. This is what keeps the refresh
//! path free of recursive re-authentication.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::envelope::{ApiResponse, TokenPayload};
use super::gateway::{AuthGateway, RefreshGateway};
use super::AuthError;
use crate::models::TokenPair;

// ============================================================================
// Constants
// ============================================================================

/// Login endpoint, relative to the configured base URL
const LOGIN_PATH: &str = "auth/login";

/// Logout endpoint; result is advisory only
const LOGOUT_PATH: &str = "auth/logout";

/// Refresh endpoint; must never carry a bearer token
const REFRESH_PATH: &str = "auth/refresh-token";

/// Auth client for the backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    base_url: String,
}

impl AuthClient {
    /// Create a new auth client with a bounded request timeout. The
    /// timeout doubles as the upper bound on how long any caller can be
    /// blocked awaiting an in-flight refresh.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Unknown(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// POST a JSON body and unwrap the standard response envelope.
    async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AuthError> {
        let url = self.url(path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(AuthError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(%url, %status, "auth request rejected");
            return Err(AuthError::from_status(status, &body));
        }

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| AuthError::DataMapping(e.to_string()))?;

        envelope.data.ok_or_else(|| {
            AuthError::DataMapping(format!(
                "envelope data missing (statusCode {}, message {:?})",
                envelope.status_code, envelope.message
            ))
        })
    }

    /// POST with no body of interest in the response; only the status
    /// matters.
    async fn post_no_content(&self, path: &str, bearer: Option<&str>) -> Result<(), AuthError> {
        let url = self.url(path);
        let mut request = self.client.post(&url);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(AuthError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::from_status(status, &body));
        }
        Ok(())
    }
}

#[async_trait]
impl RefreshGateway for AuthClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let body = serde_json::json!({ "refreshToken": refresh_token });
        let payload: TokenPayload =
            self.post_json(REFRESH_PATH, &body)
                .await
                .map_err(|err| match err {
                    // An authorization-class rejection of the refresh call means
                    // the refresh token itself is no longer valid.
                    AuthError::Api {
                        status: 401 | 403, ..
                    } => AuthError::InvalidRefreshToken,
                    other => other,
                })?;
        Ok(payload.into())
    }
}

#[async_trait]
impl AuthGateway for AuthClient {
    async fn login(&self, username: &str, password: &str) -> Result<TokenPair, AuthError> {
        let body = serde_json::json!({ "username": username, "password": password });
        let payload: TokenPayload = self.post_json(LOGIN_PATH, &body).await?;
        debug!(username, "login succeeded");
        Ok(payload.into())
    }

    async fn logout(&self, access_token: Option<&str>) -> Result<(), AuthError> {
        self.post_no_content(LOGOUT_PATH, access_token).await
    }
}
