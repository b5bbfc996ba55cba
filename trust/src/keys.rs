//! Public-key registration and immutability
//!
//! A plugin's minisign key is registered the first time its manifest is
//! committed and can never change afterwards. There is no rotation or
//! deletion path: only the holder of the original key can publish
//! updates.
//!
//! The check compares the claimed key with the key declared by the
//! manifest at a prior revision (the base reference). When no base
//! reference is configured the orchestrator does not call into this
//! module at all, so any key is accepted. That bypass is the main trust
//! weak point of the registry and is only appropriate outside of
//! change review.

use async_trait::async_trait;
use sdk::errors::ValidationError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("git failed: {0}")]
    Git(String),

    #[error("manifest path has no file name: {0}")]
    BadPath(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capability: return a manifest's contents at a prior revision
#[async_trait]
pub trait ManifestHistory: Send + Sync {
    /// The prior revision, for messages
    fn base_ref(&self) -> &str;

    /// `Ok(None)` when the file did not exist at the base revision
    async fn fetch_prior(&self, manifest: &Path) -> Result<Option<String>, HistoryError>;
}

/// Reads prior manifests with `git show <base>:<path>`
#[derive(Debug, Clone)]
pub struct GitHistory {
    base_ref: String,
}

impl GitHistory {
    pub fn new(base_ref: impl Into<String>) -> Self {
        Self {
            base_ref: base_ref.into(),
        }
    }
}

#[async_trait]
impl ManifestHistory for GitHistory {
    fn base_ref(&self) -> &str {
        &self.base_ref
    }

    async fn fetch_prior(&self, manifest: &Path) -> Result<Option<String>, HistoryError> {
        let file_name = manifest
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| HistoryError::BadPath(manifest.to_path_buf()))?;
        let dir = match manifest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        // `./` makes the path relative to the working directory instead of
        // the repository root
        let output = tokio::process::Command::new("git")
            .arg("-C")
            .arg(dir)
            .arg("show")
            .arg(format!("{}:./{}", self.base_ref, file_name))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if output.status.success() {
            return Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()));
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("does not exist") || stderr.contains("exists on disk, but not in") {
            return Ok(None);
        }
        Err(HistoryError::Git(stderr.trim().to_string()))
    }
}

/// Outcome of a passing immutability check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRegistration {
    /// No prior manifest; the claimed key becomes the registered key
    FirstRegistration,
    /// A prior manifest exists but declares no key
    LegacyUnkeyed,
    /// The claimed key is byte-identical to the registered key
    Unchanged,
}

/// Key declared by a prior manifest, if any
fn registered_key(prior: &serde_json::Value) -> Option<&str> {
    prior
        .get("public_keys")?
        .get("minisign")?
        .as_str()
        .filter(|key| !key.is_empty())
}

/// Enforce that `claimed_key` matches the key registered at the base revision
///
/// Fails closed: if the prior manifest cannot be read or parsed, the
/// check fails rather than treating the key as new.
pub async fn check_immutability(
    history: &dyn ManifestHistory,
    manifest: &Path,
    plugin_id: &str,
    claimed_key: &str,
) -> Result<KeyRegistration, ValidationError> {
    let base_ref = history.base_ref().to_string();

    let prior = history
        .fetch_prior(manifest)
        .await
        .map_err(|e| ValidationError::HistoryUnavailable {
            base_ref: base_ref.clone(),
            reason: e.to_string(),
        })?;

    let Some(prior) = prior else {
        tracing::info!(
            "No manifest for {} at {}; registering key as first-time registration",
            plugin_id,
            base_ref
        );
        return Ok(KeyRegistration::FirstRegistration);
    };

    let prior: serde_json::Value =
        serde_json::from_str(&prior).map_err(|e| ValidationError::HistoryUnavailable {
            base_ref: base_ref.clone(),
            reason: format!("prior manifest is not valid JSON: {}", e),
        })?;

    match registered_key(&prior) {
        None => {
            tracing::warn!(
                "Manifest for {} at {} declares no public key; treating as first-time registration",
                plugin_id,
                base_ref
            );
            Ok(KeyRegistration::LegacyUnkeyed)
        }
        Some(registered) if registered.as_bytes() == claimed_key.as_bytes() => {
            tracing::debug!("Public key for {} unchanged since {}", plugin_id, base_ref);
            Ok(KeyRegistration::Unchanged)
        }
        Some(_) => {
            tracing::error!(
                "Public key for {} differs from the key registered at {}",
                plugin_id,
                base_ref
            );
            Err(ValidationError::KeyChanged {
                plugin_id: plugin_id.to_string(),
                base_ref,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeHistory {
        files: HashMap<PathBuf, String>,
        broken: bool,
    }

    impl FakeHistory {
        fn with(path: &str, contents: &str) -> Self {
            let mut files = HashMap::new();
            files.insert(PathBuf::from(path), contents.to_string());
            Self {
                files,
                broken: false,
            }
        }

        fn empty() -> Self {
            Self {
                files: HashMap::new(),
                broken: false,
            }
        }
    }

    #[async_trait]
    impl ManifestHistory for FakeHistory {
        fn base_ref(&self) -> &str {
            "origin/main"
        }

        async fn fetch_prior(&self, manifest: &Path) -> Result<Option<String>, HistoryError> {
            if self.broken {
                return Err(HistoryError::Git("fatal: invalid object name".to_string()));
            }
            Ok(self.files.get(manifest).cloned())
        }
    }

    const PATH: &str = "plugins/osaurus.time.json";

    fn manifest_with_key(key: &str) -> String {
        format!(
            r#"{{"plugin_id": "osaurus.time", "public_keys": {{"minisign": "{}"}}, "versions": []}}"#,
            key
        )
    }

    #[tokio::test]
    async fn test_first_registration_accepts_any_key() {
        let history = FakeHistory::empty();
        let result = check_immutability(&history, Path::new(PATH), "osaurus.time", "RWkey1").await;
        assert_eq!(result, Ok(KeyRegistration::FirstRegistration));
    }

    #[tokio::test]
    async fn test_unchanged_key_passes() {
        let history = FakeHistory::with(PATH, &manifest_with_key("RWkey1"));
        let result = check_immutability(&history, Path::new(PATH), "osaurus.time", "RWkey1").await;
        assert_eq!(result, Ok(KeyRegistration::Unchanged));
    }

    #[tokio::test]
    async fn test_changed_key_is_rejected() {
        let history = FakeHistory::with(PATH, &manifest_with_key("RWkey1"));
        let result = check_immutability(&history, Path::new(PATH), "osaurus.time", "RWkey2").await;
        assert_eq!(
            result,
            Err(ValidationError::KeyChanged {
                plugin_id: "osaurus.time".to_string(),
                base_ref: "origin/main".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_comparison_is_byte_exact() {
        let history = FakeHistory::with(PATH, &manifest_with_key("RWkey1"));
        let result =
            check_immutability(&history, Path::new(PATH), "osaurus.time", "RWkey1 ").await;
        assert!(matches!(result, Err(ValidationError::KeyChanged { .. })));
    }

    #[tokio::test]
    async fn test_legacy_manifest_without_key() {
        let history = FakeHistory::with(
            PATH,
            r#"{"plugin_id": "osaurus.time", "versions": []}"#,
        );
        let result = check_immutability(&history, Path::new(PATH), "osaurus.time", "RWkey1").await;
        assert_eq!(result, Ok(KeyRegistration::LegacyUnkeyed));
    }

    #[tokio::test]
    async fn test_history_failure_fails_closed() {
        let mut history = FakeHistory::with(PATH, &manifest_with_key("RWkey1"));
        history.broken = true;
        let result = check_immutability(&history, Path::new(PATH), "osaurus.time", "RWkey2").await;
        assert!(matches!(
            result,
            Err(ValidationError::HistoryUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_unparseable_prior_fails_closed() {
        let history = FakeHistory::with(PATH, "{ not json");
        let result = check_immutability(&history, Path::new(PATH), "osaurus.time", "RWkey1").await;
        assert!(matches!(
            result,
            Err(ValidationError::HistoryUnavailable { .. })
        ));
    }
}
