use async_trait::async_trait;
use dashmap::DashMap;
use jsonwebtoken::Header;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::{FetchError, TokenError};
use crate::keys::{KeySource, VerificationKey};

/// Issuer string Google puts in the ID tokens it signs.
pub const GOOGLE_ISSUER: &str = "https://accounts.google.com";

/// Google's published signing certificates, keyed by `kid`.
pub const GOOGLE_CERTS_URL: &str = "https://www.googleapis.com/oauth2/v1/certs";

/// Fetches a JSON document over HTTPS.
///
/// Implementations must apply a bounded timeout and report it via [`FetchError::timeout`].
#[async_trait]
pub trait JsonFetcher: Send + Sync {
    async fn fetch_json(&self, url: &str) -> Result<Value, FetchError>;
}

/// An issuer identity plus the means to obtain its current verification key.
#[async_trait]
pub trait TrustAnchor: Send + Sync {
    /// The exact `iss` value this anchor vouches for
    fn issuer(&self) -> &str;

    /// Audiences a token from this issuer must name, or `None` to skip the audience check
    fn audiences(&self) -> Option<&[String]>;

    /// Whether the key returned depends on the header `kid`
    fn selects_by_kid(&self) -> bool {
        false
    }

    async fn resolve_key(&self, header: &Header) -> Result<VerificationKey, TokenError>;
}

/// Tokens signed by this service with its own RSA key.
#[derive(Debug, Clone)]
pub struct SelfIssuedAnchor {
    issuer: String,
    audiences: Vec<String>,
    key: KeySource,
}

impl SelfIssuedAnchor {
    /// The issuer doubles as the only accepted audience.
    pub fn new(issuer: impl Into<String>, key: KeySource) -> Self {
        let issuer = issuer.into();
        Self {
            audiences: vec![issuer.clone()],
            issuer,
            key,
        }
    }
}

#[async_trait]
impl TrustAnchor for SelfIssuedAnchor {
    fn issuer(&self) -> &str {
        &self.issuer
    }

    fn audiences(&self) -> Option<&[String]> {
        Some(&self.audiences)
    }

    async fn resolve_key(&self, _header: &Header) -> Result<VerificationKey, TokenError> {
        Ok(self.key.load()?.public_key())
    }
}

/// Google's OpenID Connect issuer. Keys are X.509 certificates selected by the token's `kid`.
pub struct GoogleAnchor {
    certs_url: String,
    audiences: Option<Vec<String>>,
    fetcher: Arc<dyn JsonFetcher>,
}

impl GoogleAnchor {
    pub fn new(fetcher: Arc<dyn JsonFetcher>) -> Self {
        Self {
            certs_url: GOOGLE_CERTS_URL.to_string(),
            audiences: None,
            fetcher,
        }
    }

    pub fn with_certs_url(mut self, url: impl Into<String>) -> Self {
        self.certs_url = url.into();
        self
    }

    /// Require the token audience to be one of the given OAuth client ids.
    pub fn with_audiences(mut self, audiences: Vec<String>) -> Self {
        self.audiences = Some(audiences);
        self
    }
}

#[async_trait]
impl TrustAnchor for GoogleAnchor {
    fn issuer(&self) -> &str {
        GOOGLE_ISSUER
    }

    fn audiences(&self) -> Option<&[String]> {
        self.audiences.as_deref()
    }

    fn selects_by_kid(&self) -> bool {
        true
    }

    async fn resolve_key(&self, header: &Header) -> Result<VerificationKey, TokenError> {
        let kid = header
            .kid
            .as_deref()
            .ok_or_else(|| TokenError::malformed("token header has no kid"))?;

        let certs = self.fetcher.fetch_json(&self.certs_url).await?;
        let pem = certs
            .get(kid)
            .and_then(Value::as_str)
            .ok_or_else(|| TokenError::UnknownKey(kid.to_string()))?;

        debug!(kid, "resolved google signing certificate");
        VerificationKey::from_certificate_pem(pem)
    }
}

/// A Keycloak realm. The realm descriptor publishes a single base64 SPKI `public_key`.
pub struct KeycloakAnchor {
    realm_url: String,
    audiences: Option<Vec<String>>,
    fetcher: Arc<dyn JsonFetcher>,
}

impl KeycloakAnchor {
    /// The realm URL is both the issuer and the descriptor location.
    pub fn new(realm_url: impl Into<String>, fetcher: Arc<dyn JsonFetcher>) -> Self {
        Self {
            realm_url: realm_url.into(),
            audiences: None,
            fetcher,
        }
    }

    pub fn with_audiences(mut self, audiences: Vec<String>) -> Self {
        self.audiences = Some(audiences);
        self
    }
}

#[async_trait]
impl TrustAnchor for KeycloakAnchor {
    fn issuer(&self) -> &str {
        &self.realm_url
    }

    fn audiences(&self) -> Option<&[String]> {
        self.audiences.as_deref()
    }

    async fn resolve_key(&self, _header: &Header) -> Result<VerificationKey, TokenError> {
        let realm = self.fetcher.fetch_json(&self.realm_url).await?;
        let public_key = realm
            .get("public_key")
            .and_then(Value::as_str)
            .ok_or_else(|| TokenError::trust_material("realm descriptor has no public_key"))?;

        VerificationKey::from_spki_pem(&wrap_public_key(public_key))
    }
}

/// Keycloak omits the PEM armour; add it unless it is already there.
fn wrap_public_key(key: &str) -> String {
    let key = key.trim();
    if key.starts_with("-----BEGIN") {
        return key.to_string();
    }

    let mut pem = String::from("-----BEGIN PUBLIC KEY-----\n");
    let bytes = key.as_bytes();
    for line in bytes.chunks(64) {
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str("-----END PUBLIC KEY-----\n");
    pem
}

/// Time-boxed cache in front of another anchor.
///
/// Anchors that select keys by `kid` get one slot per `kid` the provider actually published;
/// a `kid` that is not cached goes to the wrapped anchor, so a rotated key is picked up on the
/// first token that uses it. Every other anchor gets a single slot. Stale slots are dropped
/// whenever a fresh key is stored.
pub struct CachedAnchor<A> {
    inner: A,
    ttl: Duration,
    keys: DashMap<String, (VerificationKey, Instant)>,
}

impl<A: TrustAnchor> CachedAnchor<A> {
    pub fn new(inner: A, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            keys: DashMap::new(),
        }
    }
}

#[async_trait]
impl<A: TrustAnchor> TrustAnchor for CachedAnchor<A> {
    fn issuer(&self) -> &str {
        self.inner.issuer()
    }

    fn audiences(&self) -> Option<&[String]> {
        self.inner.audiences()
    }

    fn selects_by_kid(&self) -> bool {
        self.inner.selects_by_kid()
    }

    async fn resolve_key(&self, header: &Header) -> Result<VerificationKey, TokenError> {
        let cache_key = match &header.kid {
            Some(kid) if self.inner.selects_by_kid() => kid.clone(),
            _ => String::new(),
        };

        if let Some(entry) = self.keys.get(&cache_key) {
            let (key, fetched_at) = entry.value();
            if fetched_at.elapsed() < self.ttl {
                return Ok(key.clone());
            }
        }

        let key = self.inner.resolve_key(header).await?;
        self.keys.retain(|_, (_, fetched_at)| fetched_at.elapsed() < self.ttl);
        self.keys.insert(cache_key, (key.clone(), Instant::now()));
        Ok(key)
    }
}

/// Static allow-list of trust anchors keyed by issuer.
#[derive(Default, Clone)]
pub struct TrustRegistry {
    anchors: HashMap<String, Arc<dyn TrustAnchor>>,
}

impl TrustRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_anchor(mut self, anchor: impl TrustAnchor + 'static) -> Self {
        self.register(Arc::new(anchor));
        self
    }

    pub fn register(&mut self, anchor: Arc<dyn TrustAnchor>) {
        self.anchors.insert(anchor.issuer().to_string(), anchor);
    }

    pub fn issuers(&self) -> impl Iterator<Item = &str> {
        self.anchors.keys().map(String::as_str)
    }

    /// Look up the anchor for an issuer.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::UntrustedIssuer`] for any issuer that was not registered.
    pub fn anchor(&self, issuer: &str) -> Result<&Arc<dyn TrustAnchor>, TokenError> {
        self.anchors
            .get(issuer)
            .ok_or_else(|| TokenError::UntrustedIssuer(issuer.to_string()))
    }

    pub async fn resolve_key(
        &self,
        issuer: &str,
        header: &Header,
    ) -> Result<VerificationKey, TokenError> {
        self.anchor(issuer)?.resolve_key(header).await
    }
}
