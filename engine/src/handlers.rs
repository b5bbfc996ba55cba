//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - validate: Check every manifest in the registry
//! - hash: Print a file's SHA-256 digest
//! - verify: Check one file against a minisign signature

use anyhow::{Context, Result};
use registry_trust::minisign::{PublicKey, SignatureBlob};
use registry_trust::verifier::{compute_hash, MinisignTool, NativeVerifier, SignatureVerifier};
use sdk::report::{RunReport, Severity, VerificationOutcome};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{Config, VerifierBackend};
use crate::orchestrator::{Capabilities, Validator};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Validate the registry described by `config`
///
/// Returns whether the run passed. Configuration problems are errors;
/// validation failures are reported and yield `Ok(false)`.
pub async fn handle_validate(config: &Config, format: OutputFormat) -> Result<bool> {
    let caps = Capabilities::from_config(config).context("Failed to set up validator")?;
    let validator = Validator::new(config.policy.clone(), caps);

    let dir = &config.registry.plugins_dir;
    tracing::info!("Validating registry at {}", dir.display());
    let report = validator.run(dir).await;

    print_report(&report, format)?;
    Ok(report.passed())
}

/// Print a run report
pub fn print_report(report: &RunReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            print!("{}", render_text(report));
        }
        OutputFormat::Json => {
            let output = json!({
                "passed": report.passed(),
                "manifests": report.manifests.len(),
                "failed": report.failed_manifests(),
                "report": report,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Human-readable report: one line per error or warning, then a verdict
pub fn render_text(report: &RunReport) -> String {
    let mut out = String::new();
    for diagnostic in report.diagnostics() {
        if diagnostic.severity >= Severity::Warning {
            out.push_str(&diagnostic.to_string());
            out.push('\n');
        }
    }

    let verified = report
        .manifests
        .iter()
        .flat_map(|m| m.verifications.iter())
        .filter(|v| v.outcome == VerificationOutcome::Verified)
        .count();
    if verified > 0 {
        out.push_str(&format!("Verified {} artifact signatures.\n", verified));
    }

    if report.passed() {
        out.push_str("All plugins validated successfully.\n");
    } else {
        out.push_str("Validation FAILED.\n");
    }
    out
}

/// Print the SHA-256 digest of a file
pub async fn handle_hash(file: &Path, format: OutputFormat) -> Result<()> {
    let data = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let digest = compute_hash(&data);

    match format {
        OutputFormat::Text => println!("{}  {}", digest, file.display()),
        OutputFormat::Json => {
            let output = json!({
                "file": file.display().to_string(),
                "sha256": digest,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Verify one file against a minisign signature
///
/// Returns whether the signature is valid.
pub async fn handle_verify(
    file: &Path,
    signature: Option<PathBuf>,
    public_key: &str,
    backend: VerifierBackend,
    config: &Config,
    format: OutputFormat,
) -> Result<bool> {
    let signature_path = signature.unwrap_or_else(|| {
        let mut path = file.as_os_str().to_owned();
        path.push(".minisig");
        PathBuf::from(path)
    });

    let data = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let raw_signature = tokio::fs::read_to_string(&signature_path)
        .await
        .with_context(|| format!("Failed to read {}", signature_path.display()))?;

    let key = PublicKey::parse(public_key.trim()).context("Invalid public key")?;
    let blob = SignatureBlob::parse(&raw_signature).context("Invalid signature file")?;

    let verifier: Box<dyn SignatureVerifier> = match backend {
        VerifierBackend::Minisign => Box::new(MinisignTool::new(Duration::from_secs(
            config.network.verify_timeout_secs,
        ))),
        VerifierBackend::Native => Box::new(NativeVerifier),
    };
    verifier.ensure_available()?;

    let result = verifier.verify(&data, &blob, &key).await;
    if let Err(e) = &result {
        if e.is_systemic() {
            anyhow::bail!("Verification could not run: {}", e);
        }
    }

    match format {
        OutputFormat::Text => match &result {
            Ok(()) => {
                println!("✓ Signature and comment signature verified");
                println!("  Trusted comment: {}", blob.trusted_comment());
            }
            Err(e) => println!("✗ {}", e),
        },
        OutputFormat::Json => {
            let output = json!({
                "file": file.display().to_string(),
                "verified": result.is_ok(),
                "trusted_comment": blob.trusted_comment(),
                "error": result.as_ref().err().map(|e| e.to_string()),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(result.is_ok())
}
