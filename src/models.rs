//! Domain value types shared across the session core.

/// An access/refresh token pair as issued by login or refresh.
///
/// Immutable value: the pair is always replaced as a whole, never
/// partially updated. Kept free of wire-format concerns - the JSON
/// shape lives in `api::envelope`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}
