//! # CompSoc Token
//!
//! Signed bearer tokens for CompSoc services.
//!
//! This crate signs RS256 tokens with the service's own key and verifies tokens from a
//! fixed allow-list of issuers. It has no HTTP client and no directory access: remote
//! trust material is fetched through the [`JsonFetcher`] trait, and privilege claims are
//! stamped by the caller before signing.
//!
//! ## Features
//!
//! - Typed claim sets with an extension map
//! - Password-protected PKCS#1 signing keys
//! - Trust anchors for the service itself, Google and a Keycloak realm
//! - A verifier that reports a single generic failure to callers
//!
//! ## Usage
//!
//! ```no_run
//! use compsoc_token::{KeySource, SelfIssuedAnchor, TokenVerifier, TrustRegistry};
//!
//! # async fn example(token: &str) -> Result<(), compsoc_token::TokenError> {
//! let key = KeySource::file("/etc/compsoc/jwt.pem", None);
//! let registry = TrustRegistry::new()
//!     .with_anchor(SelfIssuedAnchor::new("https://compsoc.example.org", key));
//!
//! let verified = TokenVerifier::new(registry).verify(token).await?;
//! println!("hello {}", verified.subject());
//! # Ok(())
//! # }
//! ```

mod anchor;
mod claims;
mod error;
mod keys;
mod mint;
mod utils;
mod verify;

pub use anchor::{
    CachedAnchor, GoogleAnchor, JsonFetcher, KeycloakAnchor, SelfIssuedAnchor, TrustAnchor,
    TrustRegistry, GOOGLE_CERTS_URL, GOOGLE_ISSUER,
};
pub use claims::{Audience, Claims};
pub use error::{FetchError, TokenError};
pub use keys::{KeySource, ServiceKey, VerificationKey};
pub use mint::{sign_claims, TokenTimeConfig};
pub use utils::{
    decode_unverified_claims, decode_unverified_header, decode_unverified_payload,
    extract_bearer_token,
};
pub use verify::{TokenVerifier, VerifiedToken};

// Re-export the header type that trust anchors receive
pub use jsonwebtoken::Header;
