//! Integration tests for configuration management
//!
//! These tests verify that the Config struct can be loaded from disk,
//! validated, and combined with environment switches.

use registry_engine::config::{Config, ConfigError, VerifierBackend};
use std::collections::HashMap;
use std::path::PathBuf;

#[test]
fn test_config_toml_parsing() {
    let toml_content = r#"
[core]
log_level = "debug"

[registry]
plugins_dir = "registry/plugins"

[policy]
verify_signatures = true
base_ref = "origin/main"
require_verification = true
deny_unknown_fields = true
reject_duplicate_versions = true
verifier = "native"

[network]
fetch_timeout_secs = 10
verify_timeout_secs = 5
max_artifact_bytes = 1048576
user_agent = "registry-ci/1.0"
"#;

    let config = Config::from_toml_str(toml_content).unwrap();
    assert_eq!(config.core.log_level, "debug");
    assert_eq!(
        config.registry.plugins_dir,
        PathBuf::from("registry/plugins")
    );
    assert!(config.policy.verify_signatures);
    assert_eq!(config.policy.base_ref.as_deref(), Some("origin/main"));
    assert!(config.policy.require_verification);
    assert_eq!(config.policy.verifier, VerifierBackend::Native);
    assert_eq!(config.network.fetch_timeout_secs, 10);
    assert_eq!(config.network.max_artifact_bytes, 1048576);

    let options = config.policy.schema_options();
    assert!(options.deny_unknown_fields);
    assert!(options.reject_duplicate_versions);
}

#[test]
fn test_config_load_from_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.toml");
    std::fs::write(&path, "[registry]\nplugins_dir = \"manifests\"\n").unwrap();

    let config = Config::load(Some(path.as_path())).unwrap();
    assert_eq!(config.registry.plugins_dir, PathBuf::from("manifests"));
    assert_eq!(config.core.log_level, "info");
}

#[test]
fn test_missing_config_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load_from_path(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn test_malformed_config_is_error() {
    let err = Config::from_toml_str("[policy\nverify_signatures = yes").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_unknown_verifier_rejected() {
    let err = Config::from_toml_str("[policy]\nverifier = \"gpg\"").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_environment_overrides_file() {
    let mut config = Config::from_toml_str("[policy]\nbase_ref = \"HEAD~3\"").unwrap();
    let env: HashMap<&str, &str> = [("VERIFY_SIGNATURES", "true"), ("GITHUB_BASE_REF", "release")]
        .into_iter()
        .collect();

    config.apply_env_from(|name| env.get(name).map(|v| v.to_string()));

    assert!(config.policy.verify_signatures);
    assert_eq!(config.policy.base_ref.as_deref(), Some("origin/release"));
    assert!(config.validate().is_ok());
}

#[test]
fn test_zero_timeout_rejected() {
    let err = Config::from_toml_str("[network]\nfetch_timeout_secs = 0").unwrap_err();
    assert!(err.to_string().contains("timeouts"));
}

#[test]
fn test_cross_field_rules_wait_for_overrides() {
    let mut config = Config::from_toml_str("[policy]\nrequire_verification = true").unwrap();
    assert!(config.validate().is_err());

    config.apply_env_from(|name| (name == "VERIFY_SIGNATURES").then(|| "1".to_string()));
    assert!(config.validate().is_ok());
}

#[test]
fn test_overridden_log_level_rejected() {
    let mut config = Config::default();
    config.core.log_level = "verbose".to_string();

    let err = config.validate_fields().unwrap_err();
    assert!(err.to_string().contains("Invalid log level"));
    assert!(config.validate().is_err());
}
