//! Configuration management
//!
//! This module handles loading and validation of the validator
//! configuration. Configuration is an optional TOML file; every field has
//! a default so an empty file (or no file) is a valid configuration.
//!
//! # Configuration Sections
//!
//! - **core**: log level
//! - **registry**: location of the manifest directory
//! - **policy**: verification and strictness switches
//! - **network**: fetch and verification limits
//!
//! # Environment
//!
//! The validator pipeline never reads process environment. The binary
//! calls `Config::apply_env` once at startup, which maps the CI-style
//! switches onto the policy:
//!
//! - `VERIFY_SIGNATURES=1` enables cryptographic signature verification
//! - `REGISTRY_BASE_REF=<rev>` enables the key immutability check against `<rev>`
//! - `GITHUB_BASE_REF=<branch>` enables it against `origin/<branch>`
//!
//! # Examples
//!
//! ```no_run
//! use registry_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = Config::load(None)?;
//! config.apply_env();
//! println!("Registry: {:?}", config.registry.plugins_dir);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::schema::SchemaOptions;

/// Config file picked up from the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "registry.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub policy: Policy,

    #[serde(default)]
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Directory holding one `<plugin_id>.json` per plugin
    #[serde(default = "default_plugins_dir")]
    pub plugins_dir: PathBuf,
}

/// Which backend performs cryptographic verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifierBackend {
    /// The external `minisign` tool
    #[default]
    Minisign,
    /// In-process Ed25519 verification
    Native,
}

/// Validation policy passed explicitly to the orchestrator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Fetch artifacts and verify their signatures
    #[serde(default)]
    pub verify_signatures: bool,

    /// Prior revision for the key immutability check. `None` skips the check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_ref: Option<String>,

    /// Treat "verification not attempted" as a failure
    #[serde(default)]
    pub require_verification: bool,

    #[serde(default)]
    pub deny_unknown_fields: bool,

    #[serde(default)]
    pub reject_duplicate_versions: bool,

    #[serde(default)]
    pub verifier: VerifierBackend,
}

impl Policy {
    pub fn schema_options(&self) -> SchemaOptions {
        SchemaOptions {
            deny_unknown_fields: self.deny_unknown_fields,
            reject_duplicate_versions: self.reject_duplicate_versions,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Per-artifact download timeout
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Timeout for one run of the verification tool
    #[serde(default = "default_verify_timeout")]
    pub verify_timeout_secs: u64,

    /// Artifacts larger than this are treated as unreachable
    #[serde(default = "default_max_artifact_bytes")]
    pub max_artifact_bytes: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_plugins_dir() -> PathBuf {
    PathBuf::from("plugins")
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_verify_timeout() -> u64 {
    30
}

fn default_max_artifact_bytes() -> u64 {
    512 * 1024 * 1024
}

fn default_user_agent() -> String {
    format!("plugin-registry/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            plugins_dir: default_plugins_dir(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: default_fetch_timeout(),
            verify_timeout_secs: default_verify_timeout(),
            max_artifact_bytes: default_max_artifact_bytes(),
            user_agent: default_user_agent(),
        }
    }
}

impl Config {
    /// Load configuration
    ///
    /// Uses `path` when given, otherwise `registry.toml` in the working
    /// directory if it exists, otherwise the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_path(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::load_from_path(Path::new(DEFAULT_CONFIG_FILE))
            }
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration and check each field on its own
    ///
    /// Rules spanning several fields are left to `validate`, which runs
    /// once environment and command-line overrides have been applied.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate_fields()?;
        Ok(config)
    }

    /// Apply environment switches from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Apply environment switches from an arbitrary lookup
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("VERIFY_SIGNATURES") {
            self.policy.verify_signatures = parse_flag(&value);
        }

        let explicit = lookup("REGISTRY_BASE_REF").filter(|v| !v.trim().is_empty());
        let github = lookup("GITHUB_BASE_REF")
            .filter(|v| !v.trim().is_empty())
            .map(|branch| format!("origin/{}", branch.trim()));
        if let Some(base_ref) = explicit.or(github) {
            self.policy.base_ref = Some(base_ref.trim().to_string());
        }
    }

    /// Validate the final configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_fields()?;

        if self.policy.require_verification && !self.policy.verify_signatures {
            return Err(ConfigError::Invalid(
                "require_verification needs verify_signatures to be enabled".to_string(),
            ));
        }

        Ok(())
    }

    /// Checks that hold for each field regardless of the others
    pub fn validate_fields(&self) -> Result<(), ConfigError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if let Some(base_ref) = &self.policy.base_ref {
            if base_ref.trim().is_empty() || base_ref.starts_with('-') {
                return Err(ConfigError::Invalid(format!(
                    "Invalid base_ref '{}'",
                    base_ref
                )));
            }
        }

        if self.network.fetch_timeout_secs == 0 || self.network.verify_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "timeouts must be at least one second".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
