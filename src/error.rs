use thiserror::Error;

use compsoc_api::ApiError;
use compsoc_config::ConfigError;
use compsoc_directory::DirectoryError;
use compsoc_token::TokenError;

/// Errors returned by the bridge to endpoint handlers.
///
/// Verification failures are always the single [`BridgeError::TokenInvalid`]; nothing in it
/// says whether the issuer, the signature or the expiry was at fault.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("failed to load signing key: {0}")]
    KeyLoad(String),

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("invalid token")]
    TokenInvalid,

    #[error("invalid claims: {0}")]
    InvalidClaims(String),

    #[error("failed to sign token: {0}")]
    Signing(String),

    /// The privilege check could not be made, so no token was issued
    #[error("authorization lookup failed: {0}")]
    AuthorizationLookup(#[source] DirectoryError),

    #[error("directory write failed: {0}")]
    DirectoryWrite(#[source] DirectoryError),

    #[error("directory unavailable: {0}")]
    DirectoryUnavailable(#[source] DirectoryError),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("no such user: {0}")]
    UnknownUser(String),

    #[error("{0} is already registered")]
    AlreadyRegistered(String),

    #[error("member {0} is not a current society member")]
    NotAMember(String),

    #[error("token was issued for {found:?}, expected {expected}")]
    WrongPurpose {
        expected: String,
        found: Option<String>,
    },

    #[error("membership lookup failed: {0}")]
    Membership(#[from] ApiError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<TokenError> for BridgeError {
    fn from(error: TokenError) -> Self {
        match error {
            TokenError::KeyLoad(msg) => BridgeError::KeyLoad(msg),
            TokenError::MalformedToken(msg) => BridgeError::MalformedToken(msg),
            TokenError::Signing(msg) => BridgeError::Signing(msg),
            _ => BridgeError::TokenInvalid,
        }
    }
}

impl From<DirectoryError> for BridgeError {
    fn from(error: DirectoryError) -> Self {
        if error.is_write_failure() {
            BridgeError::DirectoryWrite(error)
        } else {
            BridgeError::DirectoryUnavailable(error)
        }
    }
}
