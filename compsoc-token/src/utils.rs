use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{decode_header, Header};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::claims::Claims;
use crate::error::TokenError;

/// Decode a token header without checking anything about the token.
pub fn decode_unverified_header(token: &str) -> Result<Header, TokenError> {
    decode_header(token).map_err(|e| TokenError::malformed(format!("invalid header: {}", e)))
}

/// Decode the claims of a token WITHOUT verifying its signature.
///
/// Only use this on a token whose authenticity was already established out of band, for
/// example an ID token received directly from the provider's token endpoint during an
/// authorization-code exchange. Never authorize an action from claims read this way.
///
/// # Errors
///
/// Returns [`TokenError::MalformedToken`] if the token is not three dot-separated segments
/// or its payload is not base64url-encoded JSON with at least an `exp` claim.
pub fn decode_unverified_claims(token: &str) -> Result<Claims, TokenError> {
    decode_payload(token)
}

/// Like [`decode_unverified_claims`] but returns the payload as a raw JSON object.
pub fn decode_unverified_payload(token: &str) -> Result<Value, TokenError> {
    decode_payload(token)
}

fn decode_payload<T: DeserializeOwned>(token: &str) -> Result<T, TokenError> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return Err(TokenError::malformed("expected three dot-separated segments")),
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| TokenError::malformed(format!("payload is not base64url: {}", e)))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| TokenError::malformed(format!("payload is not a claim set: {}", e)))
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
pub fn extract_bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
