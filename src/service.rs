use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use compsoc_directory::DirectoryClient;
use compsoc_token::{
    decode_unverified_claims, sign_claims, Audience, Claims, KeySource, TokenVerifier,
    VerifiedToken,
};

use crate::error::BridgeError;

// Claim names the service sets itself; an extension claim must not shadow them
const RESERVED_CLAIMS: &[&str] = &["sub", "iss", "aud", "exp", "is_admin", "is_committee"];

/// Issues self-signed tokens stamped with directory privileges and verifies tokens from
/// every trusted issuer.
///
/// Holds no state between calls: the signing key is read from its source on every
/// issuance and privileges are looked up fresh each time.
#[derive(Clone)]
pub struct TokenService {
    issuer: String,
    signing_key: KeySource,
    directory: DirectoryClient,
    verifier: TokenVerifier,
}

impl TokenService {
    pub fn new(
        issuer: impl Into<String>,
        signing_key: KeySource,
        directory: DirectoryClient,
        verifier: TokenVerifier,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            signing_key,
            directory,
            verifier,
        }
    }

    /// The service's own issuer, also used as the audience of every token it signs.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn directory(&self) -> &DirectoryClient {
        &self.directory
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Sign `claims` as the service.
    ///
    /// Issuer and audience are overwritten with the service identity, and `is_admin` /
    /// `is_committee` are replaced by the subject's current group membership. No token is
    /// issued if the directory cannot answer.
    pub async fn issue(&self, mut claims: Claims) -> Result<String, BridgeError> {
        if claims.subject.trim().is_empty() {
            return Err(BridgeError::InvalidClaims("subject is required".to_string()));
        }

        claims.issuer = Some(self.issuer.clone());
        claims.audience = Some(Audience::from(self.issuer.as_str()));
        for name in RESERVED_CLAIMS {
            if claims.extra.remove(*name).is_some() {
                debug!(claim = *name, "dropped caller-supplied reserved claim");
            }
        }

        let privileges = self
            .directory
            .privileges(&claims.subject)
            .await
            .map_err(|e| {
                warn!(subject = %claims.subject, error = %e, "privilege lookup failed");
                BridgeError::AuthorizationLookup(e)
            })?;
        claims.is_admin = Some(privileges.is_admin);
        claims.is_committee = Some(privileges.is_committee);

        let key = self.signing_key.load()?;
        Ok(sign_claims(&claims, &key)?)
    }

    /// Verify a token from any trusted issuer.
    ///
    /// Every failure is [`BridgeError::TokenInvalid`]. The cause is logged by the verifier.
    pub async fn verify(&self, token: &str) -> Result<VerifiedToken, BridgeError> {
        self.verify_at(token, Utc::now()).await
    }

    pub async fn verify_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifiedToken, BridgeError> {
        self.verifier
            .verify_at(token, now)
            .await
            .map_err(|_| BridgeError::TokenInvalid)
    }

    /// Claims of a token that has been verified.
    pub fn extract_claims(verified: &VerifiedToken) -> &Claims {
        verified.claims()
    }

    /// Read a token's claims without checking its signature.
    ///
    /// Only for tokens received directly from a provider over a server-to-server TLS
    /// exchange, such as an ID token returned by an authorization-code exchange. Never use
    /// the result to authorize anything a bearer token asks for.
    pub fn extract_unverified_claims(token: &str) -> Result<Claims, BridgeError> {
        Ok(decode_unverified_claims(token)?)
    }
}
