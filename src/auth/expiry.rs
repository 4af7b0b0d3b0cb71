//! Expiry judgment for access tokens carrying an embedded `exp` claim.
//!
//! Access tokens are compact dot-delimited structures whose second
//! segment is a base64url JSON object with an `exp` field in epoch
//! seconds. Any token that cannot be decoded is treated as expired, so
//! a malformed token costs one refresh instead of a failed request.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde::Deserialize;

/// Seconds before the real expiry at which a token already counts as
/// expired, so requests never race the server clock.
const EXPIRY_BUFFER_SECS: i64 = 30;

#[derive(Debug, Deserialize)]
struct Claims {
    exp: i64,
}

/// Whether the token should be refreshed before use. Fails safe: tokens
/// without a decodable `exp` claim are reported expired.
pub fn is_expired(token: &str) -> bool {
    match expires_at(token) {
        Some(exp) => Utc::now().timestamp() >= exp - EXPIRY_BUFFER_SECS,
        None => true,
    }
}

fn expires_at(token: &str) -> Option<i64> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    Some(claims.exp)
}

/// Build an unsigned token with the given `exp`, for tests elsewhere in
/// the crate.
#[cfg(test)]
pub(crate) fn token_expiring_at(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
    let claims = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp}}}"#));
    format!("{header}.{claims}.sig")
}
