//! Tests for TOML loading and tier resolution
//!
//! Note: Uses serial_test for tests that touch process-wide state.

use referidos_common::config::{
    load_toml_config, load_toml_tier, ConfigOverrides, ServiceConfig, TomlConfig,
};
use serial_test::serial;
use std::io::Write;
use std::path::PathBuf;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_full_toml() {
    let file = write_config(
        r#"
bind_addr = "0.0.0.0:8080"
database_path = "/var/lib/referidos/referidos.db"
auth_url = "https://project.supabase.co"
auth_api_key = "anon-key"
resend_api_key = "re_123"
email_from = "Referidos <referidos@example.pe>"
email_internal_to = "leads@example.pe"

[logging]
level = "debug"
"#,
    );

    let config = load_toml_config(file.path()).unwrap();
    assert_eq!(config.bind_addr.as_deref(), Some("0.0.0.0:8080"));
    assert_eq!(
        config.database_path,
        Some(PathBuf::from("/var/lib/referidos/referidos.db"))
    );
    assert_eq!(config.email_internal_to.as_deref(), Some("leads@example.pe"));
    assert_eq!(config.logging.level.as_deref(), Some("debug"));

    let resolved = ServiceConfig::resolve(ConfigOverrides::default(), config);
    assert_eq!(resolved.log_level, "debug");
    assert_eq!(resolved.email.from, "Referidos <referidos@example.pe>");
}

#[test]
fn test_partial_toml_uses_defaults() {
    let file = write_config("email_from = \"x@example.pe\"\n");
    let config = load_toml_config(file.path()).unwrap();
    assert_eq!(
        config,
        TomlConfig {
            email_from: Some("x@example.pe".into()),
            ..Default::default()
        }
    );
}

#[test]
fn test_malformed_toml_is_config_error() {
    let file = write_config("bind_addr = [unterminated");
    let err = load_toml_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("Configuration error"));
}

#[test]
#[serial]
fn test_explicit_missing_file_is_error() {
    let result = load_toml_tier(Some(std::path::Path::new("/nonexistent/referidos.toml")));
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_explicit_file_is_loaded() {
    let file = write_config("bind_addr = \"127.0.0.1:1\"\n");
    let config = load_toml_tier(Some(file.path())).unwrap();
    assert_eq!(config.bind_addr.as_deref(), Some("127.0.0.1:1"));
}
