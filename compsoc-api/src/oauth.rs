use serde_json::Value;
use tracing::{error, info};

use crate::{ApiError, HttpClient};

/// Which token to take from a provider's token endpoint response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Google: the OpenID Connect ID token carries the identity
    IdToken,
    /// Keycloak: the access token carries `preferred_username`
    AccessToken,
}

impl TokenKind {
    fn field(self) -> &'static str {
        match self {
            TokenKind::IdToken => "id_token",
            TokenKind::AccessToken => "access_token",
        }
    }
}

/// An OAuth 2.0 provider reached over a server-to-server TLS channel
#[derive(Debug, Clone)]
pub struct OAuthProvider {
    pub name: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub token_kind: TokenKind,
}

impl OAuthProvider {
    /// Exchange an authorization code for the provider's token.
    ///
    /// The returned token came straight from the provider, so its claims may be read with
    /// `compsoc_token::decode_unverified_claims`.
    pub async fn exchange_code(&self, http: &HttpClient, code: &str) -> Result<String, ApiError> {
        let form = [
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
        ];

        let response = http.post_form(&self.token_url, &form).await?;
        let field = self.token_kind.field();

        match response.get(field).and_then(Value::as_str) {
            Some(token) if !token.is_empty() => {
                info!(provider = %self.name, "exchanged authorization code");
                Ok(token.to_string())
            }
            _ => {
                error!(provider = %self.name, field, "token missing from provider response");
                Err(ApiError::InvalidResponse(format!(
                    "{} response has no {}",
                    self.name, field
                )))
            }
        }
    }
}
