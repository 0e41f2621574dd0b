//! # CompSoc Identity
//!
//! Identity and authorization bridge for the CompSoc web services.
//!
//! The bridge signs bearer tokens for CompSoc members, verifies tokens from three trusted
//! issuers (the service itself, Google and the CompSoc Keycloak realm), and stamps every
//! token it signs with `is_admin` / `is_committee` flags taken from LDAP group membership.
//! Registration and account deletion are confirmed with short-lived capability tokens
//! mailed to the member, so no workflow state is kept on the server.
//!
//! ## Crates
//!
//! - `compsoc-token`: claims, key loading, trust anchors, signing and verification
//! - `compsoc-directory`: the LDAP directory client
//! - `compsoc-api`: outbound HTTPS (trust material, societies portal, OAuth)
//! - `compsoc-config`: configuration loading
//!
//! ## Usage
//!
//! ```no_run
//! use compsoc_identity::{init_tracing, BridgeConfig, IdentityBridge};
//!
//! # async fn example(bearer: &str) -> Result<(), compsoc_identity::BridgeError> {
//! let config = BridgeConfig::from_toml("/etc/compsoc/config.toml")?;
//! init_tracing(&config.log_level);
//!
//! let bridge = IdentityBridge::from_config(&config)?;
//! let session = bridge.tokens().verify(bearer).await?;
//! if session.claims().is_committee() {
//!     println!("{} may manage events", session.subject());
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod logging;
mod service;
mod workflow;

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use compsoc_api::{HttpClient, OAuthProvider, PortalSettings, SocietiesPortalClient, TokenKind};
use compsoc_directory::{DirectoryClient, LdapConnector, LdapSettings};
use compsoc_token::{
    CachedAnchor, GoogleAnchor, JsonFetcher, KeySource, KeycloakAnchor, SelfIssuedAnchor,
    TokenVerifier, TrustAnchor, TrustRegistry,
};

pub use compsoc_config::{BridgeConfig, BridgeConfigBuilder, ConfigError};
pub use compsoc_directory::{EntityType, Privileges, ProfileUpdate};
pub use compsoc_token::{extract_bearer_token, Claims, VerifiedToken};
pub use error::BridgeError;
pub use logging::init_tracing;
pub use service::TokenService;
pub use workflow::{
    CapabilityWorkflows, MembershipSource, PendingRegistration, Purpose, Registration,
    MEMBER_ID_CLAIM, PURPOSE_CLAIM,
};

const USER_AGENT: &str = concat!("compsoc-identity/", env!("CARGO_PKG_VERSION"));

/// Which upstream provider an authorization code came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Google,
    Keycloak,
}

/// Everything an endpoint handler needs, wired from one [`BridgeConfig`].
#[derive(Clone)]
pub struct IdentityBridge {
    tokens: TokenService,
    workflows: CapabilityWorkflows,
    http: HttpClient,
    google: Option<OAuthProvider>,
    keycloak: Option<OAuthProvider>,
}

/// Wrap `anchor` in a key cache when a TTL is configured.
fn maybe_cached<A: TrustAnchor + 'static>(anchor: A, ttl: Option<u64>) -> Arc<dyn TrustAnchor> {
    match ttl {
        Some(secs) => Arc::new(CachedAnchor::new(anchor, Duration::from_secs(secs))),
        None => Arc::new(anchor),
    }
}

/// The allow-list of issuers: the service itself, Google and the Keycloak realm.
pub fn trust_registry(config: &BridgeConfig, fetcher: Arc<dyn JsonFetcher>) -> TrustRegistry {
    let mut google =
        GoogleAnchor::new(Arc::clone(&fetcher)).with_certs_url(&config.google.certs_url);
    if !config.google.client_ids.is_empty() {
        google = google.with_audiences(config.google.client_ids.clone());
    }

    let mut keycloak = KeycloakAnchor::new(&config.keycloak.realm_url, fetcher);
    if !config.keycloak.client_ids.is_empty() {
        keycloak = keycloak.with_audiences(config.keycloak.client_ids.clone());
    }

    let mut registry = TrustRegistry::new()
        .with_anchor(SelfIssuedAnchor::new(&config.home_url, signing_key(config)));
    registry.register(maybe_cached(google, config.key_cache_ttl_secs));
    registry.register(maybe_cached(keycloak, config.key_cache_ttl_secs));
    registry
}

pub fn signing_key(config: &BridgeConfig) -> KeySource {
    KeySource::file(
        config.signing_key.path.clone(),
        config.signing_key.password.clone(),
    )
}

pub fn directory_client(config: &BridgeConfig) -> DirectoryClient {
    let connector = LdapConnector::new(LdapSettings {
        url: config.ldap.url.clone(),
        bind_dn: config.ldap.bind_dn.clone(),
        bind_password: config.ldap.bind_password.clone(),
        start_tls: config.ldap.start_tls,
        timeout: Duration::from_secs(config.ldap.timeout_secs),
    });
    DirectoryClient::new(Arc::new(connector), config.ldap.base_dn.clone())
}

fn oauth_provider(
    name: &str,
    token_url: String,
    client_id: &Option<String>,
    client_secret: &Option<String>,
    redirect_uri: &Option<String>,
    token_kind: TokenKind,
) -> Option<OAuthProvider> {
    Some(OAuthProvider {
        name: name.to_string(),
        token_url,
        client_id: client_id.clone()?,
        client_secret: client_secret.clone()?,
        redirect_uri: redirect_uri.clone()?,
        token_kind,
    })
}

impl IdentityBridge {
    /// Wire the bridge against LDAP and the real upstream providers.
    pub fn from_config(config: &BridgeConfig) -> Result<Self, BridgeError> {
        config.validate()?;

        let http = HttpClient::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ConfigError::InvalidValue(format!("HTTP client: {}", e)))?;

        let registry = trust_registry(config, Arc::new(http.clone()));
        let tokens = TokenService::new(
            &config.home_url,
            signing_key(config),
            directory_client(config),
            TokenVerifier::new(registry),
        );

        let mut workflows = CapabilityWorkflows::new(tokens.clone(), config.capability_ttl_secs);
        if let Some(portal) = &config.portal {
            let client = SocietiesPortalClient::new(
                http.clone(),
                PortalSettings {
                    endpoint: portal.endpoint.clone(),
                    username: portal.username.clone(),
                    password: portal.password.clone(),
                    method: portal.method.clone(),
                    search_by: portal.search_by.clone(),
                },
            );
            workflows = workflows.with_membership(Arc::new(client));
        }

        let google = oauth_provider(
            "google",
            config.google.token_url.clone(),
            &config.google.client_id,
            &config.google.client_secret,
            &config.google.redirect_uri,
            TokenKind::IdToken,
        );
        let keycloak = oauth_provider(
            "keycloak",
            config.keycloak.token_url(),
            &config.keycloak.client_id,
            &config.keycloak.client_secret,
            &config.keycloak.redirect_uri,
            TokenKind::AccessToken,
        );

        info!(
            issuer = %config.home_url,
            portal = config.portal.is_some(),
            key_cache = ?config.key_cache_ttl_secs,
            "identity bridge ready"
        );

        Ok(Self {
            tokens,
            workflows,
            http,
            google,
            keycloak,
        })
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn workflows(&self) -> &CapabilityWorkflows {
        &self.workflows
    }

    pub fn directory(&self) -> &DirectoryClient {
        self.tokens.directory()
    }

    /// Exchange an authorization code and read the identity claims the provider returned.
    ///
    /// The token comes straight from the provider's token endpoint over TLS, which is what
    /// makes reading it without a signature check acceptable.
    pub async fn exchange_code(
        &self,
        provider: Provider,
        code: &str,
    ) -> Result<Claims, BridgeError> {
        let oauth = match provider {
            Provider::Google => self.google.as_ref(),
            Provider::Keycloak => self.keycloak.as_ref(),
        }
        .ok_or_else(|| {
            ConfigError::InvalidValue(format!("{:?} sign-in is not configured", provider))
        })?;

        let token = oauth.exchange_code(&self.http, code).await?;
        TokenService::extract_unverified_claims(&token)
    }
}
