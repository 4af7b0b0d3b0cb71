use thiserror::Error;

/// Classified failures for all auth network operations.
///
/// Every public operation in this crate returns one of these instead of
/// letting a raw transport error escape. The distinction that matters:
/// only `InvalidRefreshToken` (and explicit logout) may destroy stored
/// credentials; everything else leaves the session untouched.
///
/// `Clone` is required because concurrent callers joined to a single
/// in-flight refresh all receive the same result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("no refresh token stored")]
    NoRefreshToken,

    #[error("refresh token rejected by server")]
    InvalidRefreshToken,

    #[error("server rejected request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("network failure: {0}")]
    Transient(String),

    #[error("unexpected response shape: {0}")]
    DataMapping(String),

    #[error("unexpected failure: {0}")]
    Unknown(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl AuthError {
    /// Truncate a response body to avoid logging excessive data.
    /// The cut must land on a char boundary - bodies are arbitrary
    /// server output and may be multibyte anywhere.
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut cut = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..cut],
                body.len()
            )
        }
    }

    /// Classify a non-success HTTP status. 5xx counts as transient (the
    /// session is left intact and a later retry may succeed); any other
    /// status is surfaced with its body.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            500..=599 => AuthError::Transient(format!("server error {}: {}", status, truncated)),
            code => AuthError::Api {
                status: code,
                message: truncated,
            },
        }
    }

    /// Classify a reqwest transport error (the request never produced a
    /// status line).
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            AuthError::Transient(err.to_string())
        } else {
            AuthError::Unknown(err.to_string())
        }
    }
}
