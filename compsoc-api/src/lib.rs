//! # CompSoc API
//!
//! Outbound HTTP for the CompSoc identity bridge.
//!
//! This crate provides the HTTPS collaborators the token and workflow layers depend on:
//! fetching JSON trust material for the token verifier, looking members up in the
//! societies portal, and exchanging OAuth authorization codes for provider tokens.
//!
//! ## Features
//!
//! - A `reqwest` client with a bounded timeout on every request
//! - [`JsonFetcher`] implementation for Google certificates and Keycloak realm descriptors
//! - Societies portal member lookup
//! - OAuth authorization-code exchange for Google and Keycloak

mod oauth;
mod portal;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use compsoc_token::{FetchError, JsonFetcher};

pub use oauth::{OAuthProvider, TokenKind};
pub use portal::{PortalSettings, SocietiesPortalClient, SocietyMember};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

// Error type for the API client
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Request to {0} timed out")]
    Timeout(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn from_request(url: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ApiError::Timeout(url.to_string())
        } else {
            ApiError::HttpClient(error)
        }
    }
}

/// HTTP client shared by every outbound call the bridge makes
#[derive(Clone, Debug)]
pub struct HttpClient {
    /// reqwest HTTP client with the request timeout applied
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpClient {
    /// Create a client with the given per-request timeout
    pub fn new(timeout: Duration) -> Result<Self, ApiError> {
        HttpClientBuilder::new().timeout(timeout).build()
    }

    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET a JSON document
    pub async fn get_json(&self, url: &str) -> Result<Value, ApiError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::from_request(url, e))?;
        Self::read_json(url, response).await
    }

    /// GET a JSON document with query parameters
    pub async fn get_json_with_query<Q>(&self, url: &str, query: &Q) -> Result<Value, ApiError>
    where
        Q: Serialize + ?Sized,
    {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| ApiError::from_request(url, e))?;
        Self::read_json(url, response).await
    }

    /// POST an `application/x-www-form-urlencoded` body and read a JSON response
    pub async fn post_form<F>(&self, url: &str, form: &F) -> Result<Value, ApiError>
    where
        F: Serialize + ?Sized,
    {
        let response = self
            .client
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| ApiError::from_request(url, e))?;
        Self::read_json(url, response).await
    }

    async fn read_json(url: &str, response: reqwest::Response) -> Result<Value, ApiError> {
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            warn!(url, %status, "upstream returned an error status");
            return Err(ApiError::InvalidResponse(format!(
                "HTTP error: {} - {}",
                status, error_text
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl JsonFetcher for HttpClient {
    async fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
        self.get_json(url).await.map_err(|e| match e {
            ApiError::Timeout(_) => FetchError::timeout(url),
            other => FetchError::new(url, other.to_string()),
        })
    }
}

/// Builder for creating HTTP clients
#[derive(Debug, Clone)]
pub struct HttpClientBuilder {
    timeout: Duration,
    user_agent: Option<String>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClientBuilder {
    /// Create a new client builder with default values
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: None,
        }
    }

    /// Bound every request, connection setup included
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Build the HTTP client
    pub fn build(self) -> Result<HttpClient, ApiError> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("compsoc-identity/{}", env!("CARGO_PKG_VERSION")));

        let client = reqwest::ClientBuilder::new()
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        Ok(HttpClient {
            client,
            timeout: self.timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_client_builder_methods() {
        let builder = HttpClientBuilder::new()
            .timeout(Duration::from_secs(2))
            .user_agent("tests");

        assert_eq!(builder.timeout, Duration::from_secs(2));
        assert_eq!(builder.user_agent.as_deref(), Some("tests"));

        let client = builder.build().unwrap();
        assert_eq!(client.timeout(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_fetch_json() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth2/v1/certs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"kid-1": "cert"})))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new(Duration::from_secs(5)).unwrap();
        let url = format!("{}/oauth2/v1/certs", mock_server.uri());
        let body = client.fetch_json(&url).await.unwrap();

        assert_eq!(body["kid-1"], "cert");
    }

    #[tokio::test]
    async fn test_fetch_json_reports_error_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new(Duration::from_secs(5)).unwrap();
        let error = client.fetch_json(&mock_server.uri()).await.unwrap_err();

        assert!(!error.timed_out);
        assert!(error.reason.contains("503"));
    }

    #[tokio::test]
    async fn test_fetch_json_times_out() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&mock_server)
            .await;

        let client = HttpClient::new(Duration::from_millis(50)).unwrap();
        let error = client.fetch_json(&mock_server.uri()).await.unwrap_err();

        assert!(error.timed_out);
    }

    #[tokio::test]
    async fn test_post_form() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new(Duration::from_secs(5)).unwrap();
        let body = client
            .post_form(
                &format!("{}/token", mock_server.uri()),
                &[("grant_type", "authorization_code")],
            )
            .await
            .unwrap();

        assert_eq!(body["ok"], true);
    }
}
