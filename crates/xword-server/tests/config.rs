use std::collections::HashMap;

use xword_server::config::{Config, ConfigError, MIN_SECRET_BYTES, ServerMode};

fn from_vars(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Config::from_lookup(|name| map.get(name).cloned())
}

const GOOD_SECRET: &str = "0123456789abcdef0123456789abcdef";

#[test]
fn development_defaults_boot_without_any_vars() {
    let config = from_vars(&[]).unwrap();
    assert_eq!(config.mode, ServerMode::Development);
    assert!(!config.require_auth);
    assert!(config.legacy_auth_allowed());
    assert!(config.auth_secret.len() >= MIN_SECRET_BYTES);
    assert_eq!(config.rate_limit_max, 1000);
    assert_eq!(config.rate_limit_window_ms, 900_000);
    assert_eq!(config.ping_interval_ms, 2000);
    assert_eq!(config.ping_timeout_ms, 5000);
}

#[test]
fn production_with_good_secret_boots_locked_down() {
    let config = from_vars(&[
        ("SERVER_MODE", "production"),
        ("AUTH_TOKEN_SECRET", GOOD_SECRET),
    ])
    .unwrap();
    assert_eq!(config.mode, ServerMode::Production);
    // Forced on regardless of the variable being absent.
    assert!(config.require_auth);
    assert!(!config.legacy_auth_allowed());
    assert!(config.db_ssl);
    assert!(config.db_ssl_reject_unauthorized);
}

#[test]
fn production_without_secret_aborts() {
    // No fallback to the built-in development secret.
    let err = from_vars(&[("SERVER_MODE", "production")]).unwrap_err();
    assert!(matches!(err, ConfigError::MissingSecret));
}

#[test]
fn production_with_short_secret_aborts() {
    let err = from_vars(&[
        ("SERVER_MODE", "production"),
        ("AUTH_TOKEN_SECRET", "way-too-short"),
    ])
    .unwrap_err();
    assert!(matches!(err, ConfigError::WeakSecret));
}

#[test]
fn production_auth_optout_aborts() {
    let err = from_vars(&[
        ("SERVER_MODE", "production"),
        ("AUTH_TOKEN_SECRET", GOOD_SECRET),
        ("REQUIRE_AUTH", "false"),
    ])
    .unwrap_err();
    assert!(matches!(err, ConfigError::AuthBypassEnabled));
}

#[test]
fn production_tls_optout_aborts() {
    let err = from_vars(&[
        ("SERVER_MODE", "production"),
        ("AUTH_TOKEN_SECRET", GOOD_SECRET),
        ("DB_SSL_REJECT_UNAUTHORIZED", "false"),
    ])
    .unwrap_err();
    assert!(matches!(err, ConfigError::InsecureTls));
}

#[test]
fn short_secret_is_tolerated_outside_production() {
    let config = from_vars(&[("AUTH_TOKEN_SECRET", "short")]).unwrap();
    assert_eq!(config.auth_secret, "short");
}

#[test]
fn unknown_mode_and_bad_numbers_are_rejected() {
    assert!(matches!(
        from_vars(&[("SERVER_MODE", "prod")]).unwrap_err(),
        ConfigError::BadMode(_)
    ));
    assert!(matches!(
        from_vars(&[("RATE_LIMIT_MAX", "lots")]).unwrap_err(),
        ConfigError::BadNumber("RATE_LIMIT_MAX")
    ));
}

#[test]
fn cors_origins_parsed_from_comma_list() {
    let config = from_vars(&[(
        "CORS_ORIGINS",
        "https://a.example, https://b.example ,, *",
    )])
    .unwrap();
    assert_eq!(
        config.cors_origins,
        vec!["https://a.example".to_string(), "https://b.example".to_string()]
    );
}
