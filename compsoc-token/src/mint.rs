use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, Header};
use tracing::info;

use crate::claims::Claims;
use crate::error::TokenError;
use crate::keys::ServiceKey;

/// TokenTimeConfig allows control over token creation times and durations
#[derive(Debug, Clone, Copy)]
pub struct TokenTimeConfig {
    /// Optional custom start time (now time override)
    pub start_time: Option<i64>,
    /// Duration in seconds (default: 600 seconds = 10 minutes)
    pub duration: i64,
}

impl Default for TokenTimeConfig {
    fn default() -> Self {
        Self {
            start_time: None,
            duration: 600, // 10 minutes in seconds
        }
    }
}

impl TokenTimeConfig {
    pub fn with_duration(duration: i64) -> Self {
        Self {
            start_time: None,
            duration,
        }
    }

    /// Absolute expiry in seconds since the Unix epoch
    pub fn expiry(&self) -> i64 {
        self.start_time.unwrap_or_else(|| Utc::now().timestamp()) + self.duration
    }
}

/// Sign a claim set as a compact RS256 token.
///
/// The claims are signed exactly as given; stamping issuer, audience and privilege claims
/// is the caller's job.
pub fn sign_claims(claims: &Claims, key: &ServiceKey) -> Result<String, TokenError> {
    let header = Header::new(Algorithm::RS256);
    let token = encode(&header, claims, &key.encoding_key())
        .map_err(|e| TokenError::Signing(e.to_string()))?;

    info!(
        subject = %claims.subject,
        expiry = claims.expiry,
        "signed token"
    );

    Ok(token)
}
