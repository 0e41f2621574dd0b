use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, Algorithm, Validation};
use std::sync::Arc;
use tracing::{debug, info};

use crate::anchor::TrustRegistry;
use crate::claims::Claims;
use crate::error::TokenError;
use crate::utils::{decode_unverified_claims, decode_unverified_header};

/// A token whose signature, issuer, audience and expiry have all been checked.
///
/// Only [`TokenVerifier`] can construct one, so holding a `VerifiedToken` is proof that
/// verification succeeded.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    claims: Claims,
    issuer: String,
    key_id: Option<String>,
}

impl VerifiedToken {
    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn into_claims(self) -> Claims {
        self.claims
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn subject(&self) -> &str {
        &self.claims.subject
    }

    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }
}

/// Verifies tokens from any issuer in its [`TrustRegistry`].
#[derive(Clone)]
pub struct TokenVerifier {
    registry: Arc<TrustRegistry>,
}

impl TokenVerifier {
    pub fn new(registry: TrustRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &TrustRegistry {
        &self.registry
    }

    /// Verify a token against the current time.
    ///
    /// # Errors
    ///
    /// Every failure is reported as [`TokenError::Invalid`]; the cause is logged but never
    /// returned, so callers cannot tell an untrusted issuer from a bad signature or an
    /// expired token.
    pub async fn verify(&self, token: &str) -> Result<VerifiedToken, TokenError> {
        self.verify_at(token, Utc::now()).await
    }

    /// Verify a token as if the current time were `now`.
    pub async fn verify_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifiedToken, TokenError> {
        self.diagnose(token, now).await.map_err(|cause| {
            info!(error = %cause, "rejected token");
            TokenError::Invalid
        })
    }

    /// Verify a token and report exactly why it was rejected.
    ///
    /// This is for logging and operator tooling. Anything that answers an end user must go
    /// through [`TokenVerifier::verify`] instead.
    pub async fn diagnose(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifiedToken, TokenError> {
        let header = decode_unverified_header(token)?;
        if header.alg != Algorithm::RS256 {
            return Err(TokenError::Signature(format!(
                "unexpected algorithm {:?}",
                header.alg
            )));
        }

        let issuer = decode_unverified_claims(token)?
            .issuer
            .ok_or_else(|| TokenError::malformed("token has no issuer"))?;

        let anchor = self.registry.anchor(&issuer)?;
        let key = anchor.resolve_key(&header).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = 0;
        // Expiry is checked below against the caller's clock.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.set_issuer(&[issuer.as_str()]);
        match anchor.audiences() {
            Some(audiences) => validation.set_audience(audiences),
            None => validation.validate_aud = false,
        }

        let claims = decode::<Claims>(token, &key.decoding_key(), &validation)
            .map_err(|e| TokenError::Signature(e.to_string()))?
            .claims;

        if claims.is_expired_at(now) {
            return Err(TokenError::Expired {
                expiry: claims.expiry,
            });
        }

        debug!(issuer = %issuer, subject = %claims.subject, "verified token");

        Ok(VerifiedToken {
            claims,
            issuer,
            key_id: header.kid,
        })
    }
}
