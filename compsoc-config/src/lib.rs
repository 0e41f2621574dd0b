//! # CompSoc Config
//!
//! Configuration for the CompSoc identity bridge.
//!
//! A [`BridgeConfig`] can be built in code with [`BridgeConfigBuilder`], read from a JSON or
//! TOML file, or assembled from environment variables. Every secret read from the
//! environment may instead be given as a `_FILE` variable naming a file that holds it, which
//! is how container secrets are usually mounted.
//!
//! ```no_run
//! use compsoc_config::BridgeConfig;
//!
//! // COMPSOC_HOME_URL, COMPSOC_SIGNING_KEY_PATH, COMPSOC_LDAP_BIND_PASSWORD_FILE, ...
//! let config = BridgeConfig::from_env_or_file("COMPSOC")
//!     .expect("Failed to load configuration from environment");
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

pub const DEFAULT_GOOGLE_CERTS_URL: &str = "https://www.googleapis.com/oauth2/v1/certs";
pub const DEFAULT_GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

const MAX_TIMEOUT_SECS: u64 = 60;

fn default_http_timeout() -> u64 {
    5
}

fn default_ldap_timeout() -> u64 {
    5
}

fn default_capability_ttl() -> i64 {
    600
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_google_certs_url() -> String {
    DEFAULT_GOOGLE_CERTS_URL.to_string()
}

fn default_google_token_url() -> String {
    DEFAULT_GOOGLE_TOKEN_URL.to_string()
}

fn default_portal_method() -> String {
    "getMember".to_string()
}

fn default_portal_search_by() -> String {
    "MemberID".to_string()
}

/// The service's own RSA signing key
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SigningKeyConfig {
    /// PKCS#1 PEM file, optionally encrypted
    pub path: PathBuf,
    #[serde(default)]
    pub password: Option<String>,
}

/// Google as an OpenID Connect issuer and OAuth provider
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GoogleConfig {
    #[serde(default = "default_google_certs_url")]
    pub certs_url: String,
    /// Accepted `aud` values. Empty means any audience.
    #[serde(default)]
    pub client_ids: Vec<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_google_token_url")]
    pub token_url: String,
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            certs_url: default_google_certs_url(),
            client_ids: Vec::new(),
            client_id: None,
            client_secret: None,
            token_url: default_google_token_url(),
            redirect_uri: None,
        }
    }
}

/// The Keycloak realm that acts as the CompSoc single sign-on issuer
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeycloakConfig {
    /// Realm URL, which is also the realm's `iss` value
    pub realm_url: String,
    #[serde(default)]
    pub client_ids: Vec<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

impl KeycloakConfig {
    /// The configured token endpoint, or the realm's standard OpenID Connect one.
    pub fn token_url(&self) -> String {
        match &self.token_url {
            Some(url) => url.clone(),
            None => format!(
                "{}/protocol/openid-connect/token",
                self.realm_url.trim_end_matches('/')
            ),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LdapConfig {
    pub url: String,
    pub bind_dn: String,
    pub bind_password: String,
    pub base_dn: String,
    #[serde(default)]
    pub start_tls: bool,
    #[serde(default = "default_ldap_timeout")]
    pub timeout_secs: u64,
}

/// The societies portal member web service
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortalConfig {
    pub endpoint: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_portal_method")]
    pub method: String,
    #[serde(default = "default_portal_search_by")]
    pub search_by: String,
}

/// Configuration for the identity bridge
///
/// # Examples
///
/// ## Loading from a TOML file
///
/// ```no_run
/// use compsoc_config::BridgeConfig;
///
/// let config = BridgeConfig::from_toml("/etc/compsoc/config.toml")
///     .expect("Failed to load configuration");
/// ```
///
/// ## Using the global configuration
///
/// ```no_run
/// use compsoc_config::{set_default_config, get_default_config, try_load_default_config};
///
/// if let Some(config) = try_load_default_config() {
///     set_default_config(config).expect("Failed to set default configuration");
/// }
/// let config = get_default_config().expect("No default configuration set");
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BridgeConfig {
    /// The service's own URL: issuer and audience of every token it signs
    pub home_url: String,
    pub signing_key: SigningKeyConfig,
    #[serde(default)]
    pub google: GoogleConfig,
    pub keycloak: KeycloakConfig,
    pub ldap: LdapConfig,
    #[serde(default)]
    pub portal: Option<PortalConfig>,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    /// Cache remote verification keys for this long. Unset means fetch on every verification.
    #[serde(default)]
    pub key_cache_ttl_secs: Option<u64>,
    /// Lifetime of registration and deletion confirmation tokens
    #[serde(default = "default_capability_ttl")]
    pub capability_ttl_secs: i64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Builder for BridgeConfig
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use compsoc_config::{BridgeConfigBuilder, LdapConfig};
///
/// let config = BridgeConfigBuilder::new()
///     .home_url("https://compsoc.example.org")
///     .signing_key_path("/etc/compsoc/jwt.pem")
///     .keycloak_realm_url("https://sso.example.org/realms/compsoc")
///     .ldap(LdapConfig {
///         url: "ldaps://ldap.example.org".to_string(),
///         bind_dn: "cn=bridge,dc=compsoc,dc=ie".to_string(),
///         bind_password: "secret".to_string(),
///         base_dn: "dc=compsoc,dc=ie".to_string(),
///         start_tls: false,
///         timeout_secs: 5,
///     })
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default, Debug)]
pub struct BridgeConfigBuilder {
    home_url: Option<String>,
    signing_key_path: Option<PathBuf>,
    signing_key_password: Option<String>,
    google: Option<GoogleConfig>,
    keycloak: Option<KeycloakConfig>,
    ldap: Option<LdapConfig>,
    portal: Option<PortalConfig>,
    http_timeout_secs: Option<u64>,
    key_cache_ttl_secs: Option<u64>,
    capability_ttl_secs: Option<i64>,
    log_level: Option<String>,
}

impl BridgeConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            home_url: Some(config.home_url.clone()),
            signing_key_path: Some(config.signing_key.path.clone()),
            signing_key_password: config.signing_key.password.clone(),
            google: Some(config.google.clone()),
            keycloak: Some(config.keycloak.clone()),
            ldap: Some(config.ldap.clone()),
            portal: config.portal.clone(),
            http_timeout_secs: Some(config.http_timeout_secs),
            key_cache_ttl_secs: config.key_cache_ttl_secs,
            capability_ttl_secs: Some(config.capability_ttl_secs),
            log_level: Some(config.log_level.clone()),
        }
    }

    pub fn home_url(mut self, home_url: impl Into<String>) -> Self {
        self.home_url = Some(home_url.into());
        self
    }

    pub fn signing_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.signing_key_path = Some(path.into());
        self
    }

    pub fn signing_key_password(mut self, password: impl Into<String>) -> Self {
        self.signing_key_password = Some(password.into());
        self
    }

    pub fn google(mut self, google: GoogleConfig) -> Self {
        self.google = Some(google);
        self
    }

    /// Set only the realm URL, keeping any other Keycloak settings
    pub fn keycloak_realm_url(mut self, realm_url: impl Into<String>) -> Self {
        let mut keycloak = self.keycloak.take().unwrap_or_default();
        keycloak.realm_url = realm_url.into();
        self.keycloak = Some(keycloak);
        self
    }

    pub fn keycloak(mut self, keycloak: KeycloakConfig) -> Self {
        self.keycloak = Some(keycloak);
        self
    }

    pub fn ldap(mut self, ldap: LdapConfig) -> Self {
        self.ldap = Some(ldap);
        self
    }

    pub fn portal(mut self, portal: PortalConfig) -> Self {
        self.portal = Some(portal);
        self
    }

    pub fn http_timeout_secs(mut self, secs: u64) -> Self {
        self.http_timeout_secs = Some(secs);
        self
    }

    pub fn key_cache_ttl_secs(mut self, secs: u64) -> Self {
        self.key_cache_ttl_secs = Some(secs);
        self
    }

    pub fn capability_ttl_secs(mut self, secs: i64) -> Self {
        self.capability_ttl_secs = Some(secs);
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any required field is missing or invalid
    pub fn build(self) -> Result<BridgeConfig, ConfigError> {
        let config = BridgeConfig {
            home_url: self.home_url.ok_or(ConfigError::MissingHomeUrl)?,
            signing_key: SigningKeyConfig {
                path: self.signing_key_path.ok_or(ConfigError::MissingSigningKey)?,
                password: self.signing_key_password,
            },
            google: self.google.unwrap_or_default(),
            keycloak: self.keycloak.ok_or(ConfigError::MissingRealmUrl)?,
            ldap: self.ldap.ok_or(ConfigError::MissingLdapUrl)?,
            portal: self.portal,
            http_timeout_secs: self.http_timeout_secs.unwrap_or_else(default_http_timeout),
            key_cache_ttl_secs: self.key_cache_ttl_secs,
            capability_ttl_secs: self
                .capability_ttl_secs
                .unwrap_or_else(default_capability_ttl),
            log_level: self.log_level.unwrap_or_else(default_log_level),
        };

        config.validate()?;

        Ok(config)
    }
}

/// Errors that can occur when working with bridge configuration
#[derive(Debug)]
pub enum ConfigError {
    MissingHomeUrl,
    MissingSigningKey,
    MissingRealmUrl,
    MissingLdapUrl,
    MissingBaseDn,
    InvalidTimeout(String),
    InvalidValue(String),
    IOError(String),
    ParseError(String),
    AlreadyInitialized,
    EnvVarError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingHomeUrl => {
                write!(f, "Home URL is required but was not provided. It is the issuer and audience of every token the bridge signs.")
            }
            ConfigError::MissingSigningKey => {
                write!(f, "Signing key path is required but was not provided. Please point it at a PKCS#1 PEM file.")
            }
            ConfigError::MissingRealmUrl => {
                write!(f, "Keycloak realm URL is required but was not provided.")
            }
            ConfigError::MissingLdapUrl => {
                write!(f, "LDAP URL is required but was not provided. Please specify an ldap:// or ldaps:// URL.")
            }
            ConfigError::MissingBaseDn => {
                write!(f, "LDAP base DN is required but was not provided.")
            }
            ConfigError::InvalidTimeout(e) => {
                write!(f, "Invalid timeout: {}. Timeouts must be between 1 and {} seconds.", e, MAX_TIMEOUT_SECS)
            }
            ConfigError::InvalidValue(e) => {
                write!(f, "Invalid configuration value: {}.", e)
            }
            ConfigError::IOError(e) => {
                write!(f, "I/O error occurred while reading configuration: {}. Please check file permissions and paths.", e)
            }
            ConfigError::ParseError(e) => {
                write!(f, "Failed to parse configuration data: {}. Please ensure the configuration format is correct.", e)
            }
            ConfigError::AlreadyInitialized => {
                write!(f, "Global configuration has already been initialized. Call get_default_config() to access it or create a new local configuration.")
            }
            ConfigError::EnvVarError(e) => {
                write!(f, "Environment variable error: {}. Please ensure all required environment variables are set correctly.", e)
            }
        }
    }
}

impl Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(error: std::io::Error) -> Self {
        ConfigError::IOError(error.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(error: serde_json::Error) -> Self {
        ConfigError::ParseError(error.to_string())
    }
}

#[cfg(feature = "toml")]
impl From<toml::de::Error> for ConfigError {
    fn from(error: toml::de::Error) -> Self {
        ConfigError::ParseError(error.to_string())
    }
}

impl From<std::env::VarError> for ConfigError {
    fn from(error: std::env::VarError) -> Self {
        ConfigError::EnvVarError(error.to_string())
    }
}

fn var_name(prefix: &str, name: &str) -> String {
    format!("{}_{}", prefix, name)
}

fn optional(prefix: &str, name: &str) -> Result<Option<String>, ConfigError> {
    let key = var_name(prefix, name);
    match env::var(&key) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::EnvVarError(format!("{}: {}", key, e))),
    }
}

fn required(prefix: &str, name: &str) -> Result<String, ConfigError> {
    optional(prefix, name)?
        .ok_or_else(|| ConfigError::EnvVarError(format!("{} is not set", var_name(prefix, name))))
}

/// `<PREFIX>_<NAME>_FILE` names a file holding the value; otherwise `<PREFIX>_<NAME>` holds it.
fn secret(prefix: &str, name: &str) -> Result<Option<String>, ConfigError> {
    match optional(prefix, &format!("{}_FILE", name))? {
        Some(path) => {
            let content = fs::read_to_string(&path).map_err(|e| {
                ConfigError::IOError(format!("Failed to read {} from {}: {}", name, path, e))
            })?;
            Ok(Some(content.trim().to_string()))
        }
        None => optional(prefix, name),
    }
}

fn parsed<T: FromStr>(prefix: &str, name: &str) -> Result<Option<T>, ConfigError> {
    optional(prefix, name)?
        .map(|value| {
            value.trim().parse::<T>().map_err(|_| {
                ConfigError::InvalidValue(format!("{} = {:?}", var_name(prefix, name), value))
            })
        })
        .transpose()
}

fn list(prefix: &str, name: &str) -> Result<Vec<String>, ConfigError> {
    Ok(optional(prefix, name)?
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default())
}

fn check_timeout(name: &str, secs: u64) -> Result<(), ConfigError> {
    if secs == 0 || secs > MAX_TIMEOUT_SECS {
        return Err(ConfigError::InvalidTimeout(format!("{} = {}", name, secs)));
    }
    Ok(())
}

impl BridgeConfig {
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::new()
    }

    /// Convert this configuration to a builder for modification
    pub fn to_builder(&self) -> BridgeConfigBuilder {
        BridgeConfigBuilder::from_config(self)
    }

    /// Create a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file_content = fs::read_to_string(path)?;
        let config: BridgeConfig = serde_json::from_str(&file_content)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a configuration from a TOML file
    #[cfg(feature = "toml")]
    pub fn from_toml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file_content = fs::read_to_string(path)?;
        let config: BridgeConfig = toml::from_str(&file_content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a file, choosing TOML or JSON by its extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            #[cfg(feature = "toml")]
            Some("toml") => Self::from_toml(path),
            _ => Self::from_file(path),
        }
    }

    /// Create a configuration from environment variables, reading secrets from files where given
    ///
    /// With the prefix "COMPSOC" the variables are:
    /// - COMPSOC_HOME_URL
    /// - COMPSOC_SIGNING_KEY_PATH, COMPSOC_SIGNING_KEY_PASSWORD (optional)
    /// - COMPSOC_GOOGLE_CLIENT_IDS (comma separated), COMPSOC_GOOGLE_CERTS_URL,
    ///   COMPSOC_GOOGLE_CLIENT_ID, COMPSOC_GOOGLE_CLIENT_SECRET, COMPSOC_GOOGLE_REDIRECT_URI
    /// - COMPSOC_KEYCLOAK_REALM_URL, COMPSOC_KEYCLOAK_CLIENT_IDS, COMPSOC_KEYCLOAK_CLIENT_ID,
    ///   COMPSOC_KEYCLOAK_CLIENT_SECRET, COMPSOC_KEYCLOAK_TOKEN_URL, COMPSOC_KEYCLOAK_REDIRECT_URI
    /// - COMPSOC_LDAP_URL, COMPSOC_LDAP_BIND_DN, COMPSOC_LDAP_BIND_PASSWORD, COMPSOC_LDAP_BASE_DN,
    ///   COMPSOC_LDAP_START_TLS, COMPSOC_LDAP_TIMEOUT_SECS
    /// - COMPSOC_PORTAL_ENDPOINT (enables the portal), COMPSOC_PORTAL_USERNAME,
    ///   COMPSOC_PORTAL_PASSWORD, COMPSOC_PORTAL_METHOD, COMPSOC_PORTAL_SEARCH_BY
    /// - COMPSOC_HTTP_TIMEOUT_SECS, COMPSOC_KEY_CACHE_TTL_SECS, COMPSOC_CAPABILITY_TTL_SECS,
    ///   COMPSOC_LOG_LEVEL
    ///
    /// Each password and client secret may be given as `<NAME>_FILE` instead.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if any required variable or file is missing or invalid.
    pub fn from_env_or_file(prefix: &str) -> Result<Self, ConfigError> {
        let home_url = required(prefix, "HOME_URL")?;

        let signing_key = SigningKeyConfig {
            path: PathBuf::from(required(prefix, "SIGNING_KEY_PATH")?),
            password: secret(prefix, "SIGNING_KEY_PASSWORD")?,
        };

        let google = GoogleConfig {
            certs_url: optional(prefix, "GOOGLE_CERTS_URL")?
                .unwrap_or_else(default_google_certs_url),
            client_ids: list(prefix, "GOOGLE_CLIENT_IDS")?,
            client_id: optional(prefix, "GOOGLE_CLIENT_ID")?,
            client_secret: secret(prefix, "GOOGLE_CLIENT_SECRET")?,
            token_url: optional(prefix, "GOOGLE_TOKEN_URL")?
                .unwrap_or_else(default_google_token_url),
            redirect_uri: optional(prefix, "GOOGLE_REDIRECT_URI")?,
        };

        let keycloak = KeycloakConfig {
            realm_url: required(prefix, "KEYCLOAK_REALM_URL")?,
            client_ids: list(prefix, "KEYCLOAK_CLIENT_IDS")?,
            client_id: optional(prefix, "KEYCLOAK_CLIENT_ID")?,
            client_secret: secret(prefix, "KEYCLOAK_CLIENT_SECRET")?,
            token_url: optional(prefix, "KEYCLOAK_TOKEN_URL")?,
            redirect_uri: optional(prefix, "KEYCLOAK_REDIRECT_URI")?,
        };

        let ldap = LdapConfig {
            url: required(prefix, "LDAP_URL")?,
            bind_dn: required(prefix, "LDAP_BIND_DN")?,
            bind_password: secret(prefix, "LDAP_BIND_PASSWORD")?.unwrap_or_default(),
            base_dn: required(prefix, "LDAP_BASE_DN")?,
            start_tls: parsed(prefix, "LDAP_START_TLS")?.unwrap_or(false),
            timeout_secs: parsed(prefix, "LDAP_TIMEOUT_SECS")?.unwrap_or_else(default_ldap_timeout),
        };

        let portal = match optional(prefix, "PORTAL_ENDPOINT")? {
            Some(endpoint) => Some(PortalConfig {
                endpoint,
                username: required(prefix, "PORTAL_USERNAME")?,
                password: secret(prefix, "PORTAL_PASSWORD")?.unwrap_or_default(),
                method: optional(prefix, "PORTAL_METHOD")?.unwrap_or_else(default_portal_method),
                search_by: optional(prefix, "PORTAL_SEARCH_BY")?
                    .unwrap_or_else(default_portal_search_by),
            }),
            None => None,
        };

        let config = BridgeConfig {
            home_url,
            signing_key,
            google,
            keycloak,
            ldap,
            portal,
            http_timeout_secs: parsed(prefix, "HTTP_TIMEOUT_SECS")?
                .unwrap_or_else(default_http_timeout),
            key_cache_ttl_secs: parsed(prefix, "KEY_CACHE_TTL_SECS")?,
            capability_ttl_secs: parsed(prefix, "CAPABILITY_TTL_SECS")?
                .unwrap_or_else(default_capability_ttl),
            log_level: optional(prefix, "LOG_LEVEL")?.unwrap_or_else(default_log_level),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check that required fields are present and that timeouts are sensible.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.home_url.trim().is_empty() {
            return Err(ConfigError::MissingHomeUrl);
        }

        if self.signing_key.path.as_os_str().is_empty() {
            return Err(ConfigError::MissingSigningKey);
        }

        if self.keycloak.realm_url.trim().is_empty() {
            return Err(ConfigError::MissingRealmUrl);
        }

        if self.ldap.url.trim().is_empty() {
            return Err(ConfigError::MissingLdapUrl);
        }

        if !self.ldap.url.starts_with("ldap://") && !self.ldap.url.starts_with("ldaps://") {
            return Err(ConfigError::InvalidValue(format!(
                "LDAP URL {} must use ldap:// or ldaps://",
                self.ldap.url
            )));
        }

        if self.ldap.base_dn.trim().is_empty() {
            return Err(ConfigError::MissingBaseDn);
        }

        check_timeout("http_timeout_secs", self.http_timeout_secs)?;
        check_timeout("ldap.timeout_secs", self.ldap.timeout_secs)?;

        if self.key_cache_ttl_secs == Some(0) {
            return Err(ConfigError::InvalidValue(
                "key_cache_ttl_secs must be positive when set".to_string(),
            ));
        }

        if self.capability_ttl_secs <= 0 {
            return Err(ConfigError::InvalidValue(format!(
                "capability_ttl_secs must be positive, got {}",
                self.capability_ttl_secs
            )));
        }

        if let Some(portal) = &self.portal {
            if portal.endpoint.trim().is_empty() {
                return Err(ConfigError::InvalidValue(
                    "portal endpoint is empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

// Global configuration singleton
static DEFAULT_CONFIG: OnceLock<BridgeConfig> = OnceLock::new();

/// Set the process-wide default configuration. Fails if one is already set.
pub fn set_default_config(config: BridgeConfig) -> Result<(), ConfigError> {
    config.validate()?;
    DEFAULT_CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)
}

/// Get the default global configuration, if set
pub fn get_default_config() -> Option<&'static BridgeConfig> {
    DEFAULT_CONFIG.get()
}

fn expand_home(path: &str) -> Option<PathBuf> {
    match path.strip_prefix("~/") {
        Some(stripped) => dirs::home_dir().map(|home| home.join(stripped)),
        None => Some(PathBuf::from(path)),
    }
}

/// Try to load a configuration from standard locations
///
/// In order:
/// 1. Environment variables with the prefix "COMPSOC"
/// 2. `./compsoc.json`, `~/.compsoc/config.json`, `/etc/compsoc/config.json`
/// 3. With the "toml" feature, the same paths with a `.toml` extension
///
/// Returns None if no configuration could be found.
pub fn try_load_default_config() -> Option<BridgeConfig> {
    if let Ok(config) = BridgeConfig::from_env_or_file("COMPSOC") {
        return Some(config);
    }

    let paths = [
        "./compsoc.json",
        "~/.compsoc/config.json",
        "/etc/compsoc/config.json",
    ];

    for path in paths.iter().filter_map(|path| expand_home(path)) {
        if path.exists() {
            if let Ok(config) = BridgeConfig::from_file(&path) {
                return Some(config);
            }
        }
    }

    #[cfg(feature = "toml")]
    {
        let toml_paths = [
            "./compsoc.toml",
            "~/.compsoc/config.toml",
            "/etc/compsoc/config.toml",
        ];

        for path in toml_paths.iter().filter_map(|path| expand_home(path)) {
            if path.exists() {
                if let Ok(config) = BridgeConfig::from_toml(&path) {
                    return Some(config);
                }
            }
        }
    }

    None
}
