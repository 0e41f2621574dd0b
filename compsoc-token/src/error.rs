use thiserror::Error;

/// Failure reported by a [`JsonFetcher`](crate::JsonFetcher) collaborator.
#[derive(Error, Debug, Clone)]
#[error("failed to fetch {url}: {reason}")]
pub struct FetchError {
    pub url: String,
    pub reason: String,
    /// Set when the request exceeded its deadline rather than failing outright
    pub timed_out: bool,
}

impl FetchError {
    pub fn new(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reason: reason.into(),
            timed_out: false,
        }
    }

    pub fn timeout(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reason: "request timed out".to_string(),
            timed_out: true,
        }
    }
}

/// Errors produced while loading keys, resolving trust material, signing or verifying tokens.
///
/// The verifier collapses every failure into [`TokenError::Invalid`] before it reaches a
/// caller; the other variants describe the underlying cause and are only exposed through
/// [`TokenVerifier::diagnose`](crate::TokenVerifier::diagnose) and the key-loading and
/// signing functions.
#[derive(Error, Debug, Clone)]
pub enum TokenError {
    #[error("failed to load signing key: {0}")]
    KeyLoad(String),

    #[error("untrusted issuer: {0}")]
    UntrustedIssuer(String),

    #[error("no verification key with id {0}")]
    UnknownKey(String),

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("invalid trust material: {0}")]
    TrustMaterial(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("signature rejected: {0}")]
    Signature(String),

    #[error("token expired at {expiry}")]
    Expired { expiry: i64 },

    #[error("failed to sign token: {0}")]
    Signing(String),

    #[error("invalid token")]
    Invalid,
}

impl TokenError {
    pub fn key_load(msg: impl Into<String>) -> Self {
        TokenError::KeyLoad(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        TokenError::MalformedToken(msg.into())
    }

    pub fn trust_material(msg: impl Into<String>) -> Self {
        TokenError::TrustMaterial(msg.into())
    }
}
