//! Registry validation orchestrator
//!
//! Runs every check over every manifest in a registry directory and
//! produces a `RunReport`. Per manifest the order is:
//!
//! 1. schema checks (stop here on any structural error)
//! 2. key immutability, when a base reference is configured
//! 3. semantic version checks
//! 4. per-artifact signature checks
//!
//! Errors in one manifest never stop the others. Systemic failures
//! (no verification capability, missing registry) fail the whole run.
//!
//! Capabilities are injected through `Capabilities` so tests can swap
//! the network, the verifier and the history source for fakes.

use registry_trust::fetch::{ArtifactFetcher, HttpFetcher};
use registry_trust::keys::{check_immutability, GitHistory, KeyRegistration, ManifestHistory};
use registry_trust::minisign::{PublicKey, SignatureBlob};
use registry_trust::verifier::{verify_hash, MinisignTool, NativeVerifier, SignatureVerifier};
use sdk::errors::{ErrorCategory, ValidationError};
use sdk::manifest::{Artifact, MANIFEST_EXTENSION};
use sdk::report::{
    ArtifactVerification, Diagnostic, Location, ManifestReport, RunReport, Severity, SkipReason,
    VerificationOutcome,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, Policy, VerifierBackend};
use crate::schema::{validate_manifest, IdRegistry, ValidManifest};
use crate::semver::is_valid_semver;

/// External capabilities used by a validation run
#[derive(Clone)]
pub struct Capabilities {
    pub fetcher: Arc<dyn ArtifactFetcher>,
    pub verifier: Arc<dyn SignatureVerifier>,
    /// `None` disables the key immutability check
    pub history: Option<Arc<dyn ManifestHistory>>,
}

impl Capabilities {
    /// Production capabilities for `config`
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let network = &config.network;
        let fetcher = HttpFetcher::new(
            &network.user_agent,
            Duration::from_secs(network.fetch_timeout_secs),
            network.max_artifact_bytes,
        )?;

        let verifier: Arc<dyn SignatureVerifier> = match config.policy.verifier {
            VerifierBackend::Minisign => Arc::new(MinisignTool::new(Duration::from_secs(
                network.verify_timeout_secs,
            ))),
            VerifierBackend::Native => Arc::new(NativeVerifier),
        };

        let history = config
            .policy
            .base_ref
            .as_ref()
            .map(|base_ref| Arc::new(GitHistory::new(base_ref.clone())) as Arc<dyn ManifestHistory>);

        Ok(Self {
            fetcher: Arc::new(fetcher),
            verifier,
            history,
        })
    }
}

/// Validates a registry directory under an explicit policy
pub struct Validator {
    policy: Policy,
    caps: Capabilities,
}

impl Validator {
    pub fn new(policy: Policy, caps: Capabilities) -> Self {
        Self { policy, caps }
    }

    /// Validate every manifest in `dir`
    pub async fn run(&self, dir: &Path) -> RunReport {
        let mut report = RunReport::default();

        if self.policy.verify_signatures {
            if let Err(e) = self.caps.verifier.ensure_available() {
                let error = ValidationError::from(e);
                tracing::error!("{}", error);
                report
                    .systemic
                    .push(Diagnostic::from_error(Location::manifest(dir), &error));
                return report;
            }
            tracing::info!(
                "Signature verification enabled ({})",
                self.caps.verifier.name()
            );
        }

        let manifests = match discover_manifests(dir) {
            Ok(manifests) => manifests,
            Err(error) => {
                tracing::error!("{}", error);
                report
                    .systemic
                    .push(Diagnostic::from_error(Location::manifest(dir), &error));
                return report;
            }
        };

        if manifests.is_empty() {
            tracing::info!("No plugin manifests found in {}", dir.display());
            return report;
        }

        let mut ids = IdRegistry::new();
        for path in &manifests {
            let mut manifest_report = self.validate_file(path, &mut ids).await;
            for diagnostic in &manifest_report.diagnostics {
                log_diagnostic(diagnostic);
            }

            // A verifier that breaks mid-run fails everything
            let (systemic, diagnostics): (Vec<_>, Vec<_>) =
                std::mem::take(&mut manifest_report.diagnostics)
                    .into_iter()
                    .partition(|d| d.category == Some(ErrorCategory::Systemic));
            manifest_report.diagnostics = diagnostics;
            report.manifests.push(manifest_report);
            if !systemic.is_empty() {
                report.systemic.extend(systemic);
                return report;
            }
        }

        tracing::info!(
            "Validated {} manifests, {} failed",
            report.manifests.len(),
            report.failed_manifests()
        );
        report
    }

    async fn validate_file(&self, path: &Path, ids: &mut IdRegistry) -> ManifestReport {
        let mut report = ManifestReport::new(path);
        let location = Location::manifest(path);

        tracing::debug!("Validating {}", path.display());
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) => {
                report.push(Diagnostic::from_error(
                    location,
                    &ValidationError::Unreadable(e.to_string()),
                ));
                return report;
            }
        };

        let valid = match validate_manifest(&raw, path, ids, &self.policy.schema_options()) {
            Ok(valid) => valid,
            Err(diagnostics) => {
                report.diagnostics = diagnostics;
                return report;
            }
        };
        let ValidManifest {
            manifest,
            public_key,
            diagnostics,
        } = valid;
        report.plugin_id = Some(manifest.plugin_id.clone());
        report.diagnostics = diagnostics;

        if let Some(history) = &self.caps.history {
            match check_immutability(
                history.as_ref(),
                path,
                &manifest.plugin_id,
                &manifest.public_keys.minisign,
            )
            .await
            {
                Ok(KeyRegistration::LegacyUnkeyed) => report.push(Diagnostic::warning(
                    location.clone(),
                    format!(
                        "Manifest at {} declared no public key; key registered now",
                        history.base_ref()
                    ),
                )),
                Ok(_) => {}
                Err(error) => report.push(Diagnostic::from_error(location.clone(), &error)),
            }
        }

        for (version_index, entry) in manifest.versions.iter().enumerate() {
            let version_location = location.version(version_index);

            if !is_valid_semver(&entry.version) {
                report.push(Diagnostic::from_error(
                    version_location.clone(),
                    &ValidationError::InvalidVersion(entry.version.clone()),
                ));
            }

            if let Some(min_version) = entry
                .requires
                .as_ref()
                .and_then(|requires| requires.osaurus_min_version.as_deref())
            {
                if !is_valid_semver(min_version) {
                    report.push(Diagnostic::from_error(
                        version_location.clone(),
                        &ValidationError::InvalidMinHostVersion(min_version.to_string()),
                    ));
                }
            }

            for (artifact_index, artifact) in entry.artifacts.iter().enumerate() {
                let artifact_location = version_location.artifact(artifact_index);
                let signature = match SignatureBlob::parse(&artifact.minisign.signature) {
                    Ok(signature) => signature,
                    Err(e) => {
                        report.push(Diagnostic::from_error(
                            artifact_location,
                            &ValidationError::InvalidSignatureFormat(e.to_string()),
                        ));
                        continue;
                    }
                };

                let (outcome, diagnostics) = self
                    .verify_artifact(&artifact_location, artifact, &signature, &public_key)
                    .await;
                report.diagnostics.extend(diagnostics);
                report.verifications.push(ArtifactVerification {
                    location: artifact_location,
                    outcome,
                });
            }
        }

        report
    }

    /// Verify one artifact against the plugin's registered key
    ///
    /// Unreachable artifacts are skipped with a note unless the policy
    /// requires verification.
    pub async fn verify_artifact(
        &self,
        location: &Location,
        artifact: &Artifact,
        signature: &SignatureBlob,
        key: &PublicKey,
    ) -> (VerificationOutcome, Vec<Diagnostic>) {
        let mut diagnostics = Vec::new();

        if !self.policy.verify_signatures {
            if self.policy.require_verification {
                diagnostics.push(Diagnostic::from_error(
                    location.clone(),
                    &ValidationError::VerificationRequired(SkipReason::Disabled.to_string()),
                ));
            }
            return (
                VerificationOutcome::Skipped {
                    reason: SkipReason::Disabled,
                },
                diagnostics,
            );
        }

        let bytes = match self.caps.fetcher.fetch(&artifact.url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let reason = e.to_string();
                let error = if self.policy.require_verification {
                    ValidationError::VerificationRequired(format!("unreachable: {}", reason))
                } else {
                    ValidationError::Unreachable(format!("{} ({})", artifact.url, reason))
                };
                diagnostics.push(Diagnostic::from_error(location.clone(), &error));
                return (
                    VerificationOutcome::Skipped {
                        reason: SkipReason::Unreachable(reason),
                    },
                    diagnostics,
                );
            }
        };

        if let Err(error) = verify_hash(&bytes, &artifact.sha256) {
            diagnostics.push(Diagnostic::from_error(location.clone(), &error));
            return (
                VerificationOutcome::Failed {
                    message: error.to_string(),
                },
                diagnostics,
            );
        }

        match self.caps.verifier.verify(&bytes, signature, key).await {
            Ok(()) => {
                tracing::debug!("Verified {}", location);
                (VerificationOutcome::Verified, diagnostics)
            }
            Err(e) => {
                let error = ValidationError::from(e);
                diagnostics.push(Diagnostic::from_error(location.clone(), &error));
                (
                    VerificationOutcome::Failed {
                        message: error.to_string(),
                    },
                    diagnostics,
                )
            }
        }
    }
}

/// `*.json` files directly inside `dir`, sorted by file name
pub fn discover_manifests(dir: &Path) -> Result<Vec<PathBuf>, ValidationError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| ValidationError::RegistryMissing(format!("{}: {}", dir.display(), e)))?;

    let mut manifests: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .is_some_and(|extension| extension == MANIFEST_EXTENSION)
        })
        .collect();
    manifests.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(manifests)
}

fn log_diagnostic(diagnostic: &Diagnostic) {
    let manifest = diagnostic.location.manifest.display().to_string();
    let version = diagnostic.location.version;
    let artifact = diagnostic.location.artifact;
    match diagnostic.severity {
        Severity::Error => tracing::error!(
            manifest = %manifest,
            version = ?version,
            artifact = ?artifact,
            "{}",
            diagnostic.message
        ),
        Severity::Warning => tracing::warn!(
            manifest = %manifest,
            version = ?version,
            artifact = ?artifact,
            "{}",
            diagnostic.message
        ),
        Severity::Note => tracing::info!(
            manifest = %manifest,
            version = ?version,
            artifact = ?artifact,
            "{}",
            diagnostic.message
        ),
    }
}
