//! Wire types for the backend's standard JSON response envelope.

use serde::Deserialize;

use crate::models::TokenPair;

/// Standard wrapper around every API response payload:
///
/// ```json
/// {
///   "statusCode": 0,
///   "message": "Success",
///   "data": { ... },
///   "error": null,
///   "timestamp": "...",
///   "path": "/api/..."
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(rename = "statusCode")]
    pub status_code: i64,
    #[serde(default)]
    pub message: Option<String>,
    // No `default` attribute here: on a generic field it would impose a
    // `T: Default` bound on deserialization, and a missing `Option`
    // field already reads as `None`.
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

/// Token payload as it appears in the `data` field of login and
/// refresh responses.
#[derive(Debug, Deserialize)]
pub struct TokenPayload {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

impl From<TokenPayload> for TokenPair {
    fn from(payload: TokenPayload) -> Self {
        TokenPair {
            access_token: payload.access_token,
            refresh_token: payload.refresh_token,
        }
    }
}
