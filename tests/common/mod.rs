#![allow(dead_code)]

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use compsoc_api::HttpClient;
use compsoc_config::{GoogleConfig, KeycloakConfig, LdapConfig, PortalConfig};
use compsoc_directory::{DirectoryClient, InMemoryDirectory, RawEntry, ADMIN_GROUP, COMMITTEE_GROUP};
use compsoc_identity::{trust_registry, BridgeConfig, TokenService};
use compsoc_token::{KeySource, TokenVerifier};

pub const HOME: &str = "https://compsoc.example.org";
pub const BASE: &str = "dc=compsoc,dc=ie";
pub const GOOGLE_ISSUER: &str = "https://accounts.google.com";
pub const GOOGLE_KID: &str = "google-2026-10";
pub const GOOGLE_CLIENT: &str = "compsoc-web.apps.googleusercontent.com";

pub const SERVICE_KEY: &str = include_str!("../../compsoc-token/tests/fixtures/service_key.pem");
pub const ROGUE_KEY: &str = include_str!("../../compsoc-token/tests/fixtures/rogue_key.pem");
pub const GOOGLE_KEY: &str = include_str!("../../compsoc-token/tests/fixtures/google_key.pem");
pub const GOOGLE_CERT: &str = include_str!("../../compsoc-token/tests/fixtures/google_cert.pem");
pub const KEYCLOAK_KEY: &str = include_str!("../../compsoc-token/tests/fixtures/keycloak_key.pem");
pub const KEYCLOAK_PUBLIC_KEY: &str =
    include_str!("../../compsoc-token/tests/fixtures/keycloak_public_key.b64");

/// A token service wired against an in-memory directory and a mock upstream.
pub struct Harness {
    pub server: MockServer,
    pub directory: InMemoryDirectory,
    pub config: BridgeConfig,
    pub tokens: TokenService,
    _key_dir: TempDir,
}

impl Harness {
    pub fn realm_url(&self) -> String {
        self.config.keycloak.realm_url.clone()
    }

    pub fn portal_url(&self) -> String {
        format!("{}/portal", self.server.uri())
    }

    pub async fn certs_requests(&self) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == "/oauth2/v1/certs")
            .count()
    }
}

pub fn person(uid: &str, uid_number: u32) -> RawEntry {
    RawEntry::new(
        format!("uid={},ou=people,{}", uid, BASE),
        [
            ("uid", vec![uid.to_string()]),
            ("cn", vec![format!("{} Example", uid)]),
            ("givenName", vec![uid.to_string()]),
            ("sn", vec!["Example".to_string()]),
            ("mail", vec![format!("{}@example.org", uid)]),
            ("uidNumber", vec![uid_number.to_string()]),
        ],
    )
}

pub fn group(name: &str, members: &[&str]) -> RawEntry {
    RawEntry::new(
        format!("cn={},ou=groups,{}", name, BASE),
        [
            ("cn", vec![name.to_string()]),
            (
                "member",
                members
                    .iter()
                    .map(|uid| format!("uid={},ou=people,{}", uid, BASE))
                    .collect(),
            ),
        ],
    )
}

/// alice is on the committee, bobby is an admin, bob is neither.
pub fn seeded_directory() -> InMemoryDirectory {
    let directory = InMemoryDirectory::new();
    directory.insert(person("alice", 1000));
    directory.insert(person("bob", 1001));
    directory.insert(person("bobby", 1002));
    directory.insert(group(ADMIN_GROUP, &["bobby"]));
    directory.insert(group(COMMITTEE_GROUP, &["alice"]));
    directory
}

pub async fn harness() -> Harness {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/oauth2/v1/certs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ GOOGLE_KID: GOOGLE_CERT })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/realms/compsoc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "realm": "compsoc",
            "public_key": KEYCLOAK_PUBLIC_KEY.trim(),
        })))
        .mount(&server)
        .await;

    let key_dir = TempDir::new().expect("temp dir");
    let key_path = key_dir.path().join("jwt.pem");
    std::fs::write(&key_path, SERVICE_KEY).expect("write signing key");

    let config = BridgeConfig::builder()
        .home_url(HOME)
        .signing_key_path(&key_path)
        .google(GoogleConfig {
            certs_url: format!("{}/oauth2/v1/certs", server.uri()),
            client_ids: vec![GOOGLE_CLIENT.to_string()],
            ..GoogleConfig::default()
        })
        .keycloak(KeycloakConfig {
            realm_url: format!("{}/realms/compsoc", server.uri()),
            client_ids: Vec::new(),
            client_id: None,
            client_secret: None,
            token_url: None,
            redirect_uri: None,
        })
        .ldap(LdapConfig {
            url: "ldap://127.0.0.1:1".to_string(),
            bind_dn: format!("cn=bridge,{}", BASE),
            bind_password: "secret".to_string(),
            base_dn: BASE.to_string(),
            start_tls: false,
            timeout_secs: 1,
        })
        .portal(PortalConfig {
            endpoint: format!("{}/portal", server.uri()),
            username: "compsoc".to_string(),
            password: "portal-secret".to_string(),
            method: "getMember".to_string(),
            search_by: "MemberID".to_string(),
        })
        .build()
        .expect("valid config");

    let directory = seeded_directory();
    let http = HttpClient::new(Duration::from_secs(5)).expect("http client");
    let registry = trust_registry(&config, Arc::new(http));
    let tokens = TokenService::new(
        HOME,
        KeySource::pem(SERVICE_KEY, None),
        DirectoryClient::new(Arc::new(directory.clone()), BASE),
        TokenVerifier::new(registry),
    );

    Harness {
        server,
        directory,
        config,
        tokens,
        _key_dir: key_dir,
    }
}

/// Sign arbitrary claims with an RSA key, bypassing the token service.
pub fn sign_with(pem: &str, kid: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    encode(
        &header,
        claims,
        &EncodingKey::from_rsa_pem(pem.as_bytes()).expect("rsa key"),
    )
    .expect("sign")
}

pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}
