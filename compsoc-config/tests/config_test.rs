use compsoc_config::{
    get_default_config, set_default_config, BridgeConfig, ConfigError, PortalConfig,
};
use std::env;
use std::fs;

fn set_required_env(prefix: &str) {
    env::set_var(format!("{}_HOME_URL", prefix), "https://env.example.org");
    env::set_var(format!("{}_SIGNING_KEY_PATH", prefix), "/run/secrets/jwt.pem");
    env::set_var(
        format!("{}_KEYCLOAK_REALM_URL", prefix),
        "https://sso.example.org/realms/compsoc",
    );
    env::set_var(format!("{}_LDAP_URL", prefix), "ldap://ldap.example.org");
    env::set_var(format!("{}_LDAP_BIND_DN", prefix), "cn=bridge,dc=compsoc,dc=ie");
    env::set_var(format!("{}_LDAP_BASE_DN", prefix), "dc=compsoc,dc=ie");
}

#[test]
fn test_config_from_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let file_path = temp_dir.path().join("config.json");

    let config_json = r#"{
        "home_url": "https://json.example.org",
        "signing_key": { "path": "/etc/compsoc/jwt.pem", "password": "hunter2" },
        "keycloak": {
            "realm_url": "https://sso.example.org/realms/compsoc",
            "client_ids": ["bridge"]
        },
        "ldap": {
            "url": "ldaps://ldap.example.org",
            "bind_dn": "cn=bridge,dc=compsoc,dc=ie",
            "bind_password": "secret",
            "base_dn": "dc=compsoc,dc=ie"
        },
        "key_cache_ttl_secs": 300
    }"#;

    fs::write(&file_path, config_json).unwrap();

    let config = BridgeConfig::from_file(&file_path).unwrap();

    assert_eq!(config.home_url, "https://json.example.org");
    assert_eq!(config.signing_key.password.as_deref(), Some("hunter2"));
    assert_eq!(config.keycloak.client_ids, vec!["bridge".to_string()]);
    assert_eq!(config.ldap.timeout_secs, 5);
    assert!(!config.ldap.start_tls);
    assert_eq!(config.key_cache_ttl_secs, Some(300));
    assert_eq!(config.capability_ttl_secs, 600);
    assert!(config.google.client_ids.is_empty());
}

#[test]
fn test_config_from_toml() {
    let temp_dir = tempfile::tempdir().unwrap();
    let file_path = temp_dir.path().join("config.toml");

    let config_toml = r#"
home_url = "https://toml.example.org"
http_timeout_secs = 3
capability_ttl_secs = 900
log_level = "debug"

[signing_key]
path = "/etc/compsoc/jwt.pem"

[google]
client_ids = ["1234.apps.googleusercontent.com"]

[keycloak]
realm_url = "https://sso.example.org/realms/compsoc"

[ldap]
url = "ldap://ldap.example.org"
bind_dn = "cn=bridge,dc=compsoc,dc=ie"
bind_password = "secret"
base_dn = "dc=compsoc,dc=ie"
start_tls = true

[portal]
endpoint = "https://portal.example.org/webservice.php"
username = "compsoc"
password = "portal-secret"
"#;

    fs::write(&file_path, config_toml).unwrap();

    let config = BridgeConfig::load(&file_path).unwrap();

    assert_eq!(config.home_url, "https://toml.example.org");
    assert_eq!(config.http_timeout_secs, 3);
    assert_eq!(config.capability_ttl_secs, 900);
    assert!(config.ldap.start_tls);
    assert_eq!(
        config.google.client_ids,
        vec!["1234.apps.googleusercontent.com".to_string()]
    );
    let portal: PortalConfig = config.portal.unwrap();
    assert_eq!(portal.method, "getMember");
    assert_eq!(portal.search_by, "MemberID");
}

#[test]
fn test_config_file_failing_validation() {
    let temp_dir = tempfile::tempdir().unwrap();
    let file_path = temp_dir.path().join("config.json");

    fs::write(
        &file_path,
        r#"{
            "home_url": "https://json.example.org",
            "signing_key": { "path": "/etc/compsoc/jwt.pem" },
            "keycloak": { "realm_url": "https://sso.example.org/realms/compsoc" },
            "ldap": {
                "url": "ldaps://ldap.example.org",
                "bind_dn": "cn=bridge,dc=compsoc,dc=ie",
                "bind_password": "secret",
                "base_dn": ""
            }
        }"#,
    )
    .unwrap();

    match BridgeConfig::from_file(&file_path) {
        Err(ConfigError::MissingBaseDn) => {}
        other => panic!("Expected MissingBaseDn, got {:?}", other),
    }

    match BridgeConfig::from_file(temp_dir.path().join("missing.json")) {
        Err(ConfigError::IOError(_)) => {}
        other => panic!("Expected IOError, got {:?}", other),
    }
}

#[test]
fn test_config_from_env() {
    let prefix = "CFGTEST_ENV";
    set_required_env(prefix);
    env::set_var(format!("{}_LDAP_BIND_PASSWORD", prefix), "plain-secret");
    env::set_var(format!("{}_GOOGLE_CLIENT_IDS", prefix), "a.apps, b.apps ,");
    env::set_var(format!("{}_LDAP_TIMEOUT_SECS", prefix), "7");

    let config = BridgeConfig::from_env_or_file(prefix).unwrap();

    assert_eq!(config.home_url, "https://env.example.org");
    assert_eq!(config.ldap.bind_password, "plain-secret");
    assert_eq!(config.ldap.timeout_secs, 7);
    assert_eq!(
        config.google.client_ids,
        vec!["a.apps".to_string(), "b.apps".to_string()]
    );
    assert!(config.portal.is_none());
}

#[test]
fn test_config_secrets_from_files() {
    let prefix = "CFGTEST_FILE";
    set_required_env(prefix);

    let temp_dir = tempfile::tempdir().unwrap();
    let ldap_secret = temp_dir.path().join("ldap_password");
    let key_secret = temp_dir.path().join("key_password");
    fs::write(&ldap_secret, "from-file\n").unwrap();
    fs::write(&key_secret, "key-pass").unwrap();

    // The _FILE variable wins over the plain one
    env::set_var(format!("{}_LDAP_BIND_PASSWORD", prefix), "from-env");
    env::set_var(
        format!("{}_LDAP_BIND_PASSWORD_FILE", prefix),
        ldap_secret.to_str().unwrap(),
    );
    env::set_var(
        format!("{}_SIGNING_KEY_PASSWORD_FILE", prefix),
        key_secret.to_str().unwrap(),
    );

    let config = BridgeConfig::from_env_or_file(prefix).unwrap();
    assert_eq!(config.ldap.bind_password, "from-file");
    assert_eq!(config.signing_key.password.as_deref(), Some("key-pass"));
}

#[test]
fn test_config_env_errors() {
    let prefix = "CFGTEST_MISSING";
    match BridgeConfig::from_env_or_file(prefix) {
        Err(ConfigError::EnvVarError(_)) => {}
        other => panic!("Expected EnvVarError, got {:?}", other),
    }

    let prefix = "CFGTEST_BADNUM";
    set_required_env(prefix);
    env::set_var(format!("{}_HTTP_TIMEOUT_SECS", prefix), "soon");
    match BridgeConfig::from_env_or_file(prefix) {
        Err(ConfigError::InvalidValue(_)) => {}
        other => panic!("Expected InvalidValue, got {:?}", other),
    }

    let prefix = "CFGTEST_BADFILE";
    set_required_env(prefix);
    env::set_var(
        format!("{}_PORTAL_ENDPOINT", prefix),
        "https://portal.example.org",
    );
    env::set_var(format!("{}_PORTAL_USERNAME", prefix), "compsoc");
    env::set_var(
        format!("{}_PORTAL_PASSWORD_FILE", prefix),
        "/nonexistent/portal_password",
    );
    match BridgeConfig::from_env_or_file(prefix) {
        Err(ConfigError::IOError(_)) => {}
        other => panic!("Expected IOError, got {:?}", other),
    }
}

#[test]
fn test_default_config() {
    let prefix = "CFGTEST_DEFAULT";
    set_required_env(prefix);
    let config = BridgeConfig::from_env_or_file(prefix).unwrap();

    set_default_config(config.clone()).unwrap();
    assert_eq!(get_default_config(), Some(&config));

    match set_default_config(config) {
        Err(ConfigError::AlreadyInitialized) => {}
        other => panic!("Expected AlreadyInitialized, got {:?}", other),
    }
}
