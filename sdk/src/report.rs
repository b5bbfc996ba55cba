//! Diagnostics and run reports
//!
//! Every finding is attributed to a manifest path and, where relevant,
//! a version index and an artifact index.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::{ErrorCategory, RegistryErrorExt, ValidationError};

/// Where in the registry a diagnostic was raised
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub manifest: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<usize>,
}

impl Location {
    pub fn manifest(path: impl Into<PathBuf>) -> Self {
        Self {
            manifest: path.into(),
            version: None,
            artifact: None,
        }
    }

    pub fn version(&self, index: usize) -> Self {
        Self {
            manifest: self.manifest.clone(),
            version: Some(index),
            artifact: None,
        }
    }

    pub fn artifact(&self, index: usize) -> Self {
        Self {
            manifest: self.manifest.clone(),
            version: self.version,
            artifact: Some(index),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.manifest.display())?;
        if let Some(version) = self.version {
            write!(f, " -> version[{}]", version)?;
        }
        if let Some(artifact) = self.artifact {
            write!(f, " -> artifact[{}]", artifact)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Note,
    Warning,
    Error,
}

/// A single finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorCategory>,
    pub message: String,
}

impl Diagnostic {
    /// Diagnostic for a validation error. Recoverable errors become notes.
    pub fn from_error(location: Location, error: &ValidationError) -> Self {
        let severity = if error.is_recoverable() {
            Severity::Note
        } else {
            Severity::Error
        };
        Self {
            severity,
            location,
            category: Some(error.category()),
            message: error.to_string(),
        }
    }

    /// Diagnostic for an error that the active policy downgrades
    pub fn downgraded(location: Location, error: &ValidationError) -> Self {
        Self {
            severity: Severity::Warning,
            location,
            category: Some(error.category()),
            message: error.to_string(),
        }
    }

    pub fn warning(location: Location, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            location,
            category: None,
            message: message.into(),
        }
    }

    pub fn note(location: Location, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Note,
            location,
            category: None,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Error => "Error",
            Severity::Warning => "Warning",
            Severity::Note => "Note",
        };
        write!(f, "{} in {}: {}", label, self.location, self.message)
    }
}

/// Why signature verification was not attempted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// Cryptographic verification is disabled by policy
    Disabled,
    /// The artifact could not be fetched
    Unreachable(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("verification disabled"),
            Self::Unreachable(reason) => write!(f, "artifact unreachable: {}", reason),
        }
    }
}

/// Result of the signature check for one artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationOutcome {
    /// Attempted and passed
    Verified,
    /// Attempted and failed
    Failed { message: String },
    /// Not attempted
    Skipped { reason: SkipReason },
}

/// Verification outcome recorded against its artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactVerification {
    pub location: Location,
    pub outcome: VerificationOutcome,
}

/// Result of validating one manifest file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestReport {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_id: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verifications: Vec<ArtifactVerification>,
}

impl ManifestReport {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            plugin_id: None,
            diagnostics: Vec::new(),
            verifications: Vec::new(),
        }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    pub fn passed(&self) -> bool {
        self.error_count() == 0
    }
}

/// Result of one validation run over a registry directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub manifests: Vec<ManifestReport>,
    /// Failures that abort the whole run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub systemic: Vec<Diagnostic>,
}

impl RunReport {
    /// The run passes iff there is no systemic failure and every manifest passed
    pub fn passed(&self) -> bool {
        self.systemic.is_empty() && self.manifests.iter().all(ManifestReport::passed)
    }

    pub fn failed_manifests(&self) -> usize {
        self.manifests.iter().filter(|m| !m.passed()).count()
    }

    /// Every diagnostic, systemic ones first
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.systemic
            .iter()
            .chain(self.manifests.iter().flat_map(|m| m.diagnostics.iter()))
    }
}
