//! Error types and handling
//!
//! This module provides the error type produced by every registry check.
//! Each error belongs to one category of the validation taxonomy and
//! implements `RegistryErrorExt`, which supplies a user-facing hint and
//! tells the orchestrator whether the failure can be downgraded.
//!
//! # Categories
//!
//! - **Structural**: malformed documents, missing fields, bad enum values,
//!   bad identifier syntax
//! - **Semantic**: invalid version strings, missing primary-platform coverage
//! - **Trust**: key immutability violations, checksum or signature mismatch
//! - **Availability**: an artifact could not be fetched for verification
//! - **Systemic**: the verification capability itself is missing or broken
//!
//! Only availability errors are recoverable. Trust errors are never
//! downgraded to warnings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error taxonomy shared by every check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Structural,
    Semantic,
    Trust,
    Availability,
    Systemic,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Structural => "structural",
            Self::Semantic => "semantic",
            Self::Trust => "trust",
            Self::Availability => "availability",
            Self::Systemic => "systemic",
        };
        f.write_str(name)
    }
}

/// Trait for registry error extensions
///
/// Provides a user-friendly hint and recoverability information for
/// every validation error.
pub trait RegistryErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// A recoverable error downgrades to a note and does not fail the run.
    fn is_recoverable(&self) -> bool;

    /// Returns the taxonomy category of the error
    fn category(&self) -> ErrorCategory;
}

/// Validation error
///
/// One variant per distinct failure the validator can report. Messages
/// are attributed to a manifest/version/artifact location by the caller.
///
/// # Examples
///
/// ```
/// use sdk::errors::{ErrorCategory, RegistryErrorExt, ValidationError};
///
/// let error = ValidationError::InvalidVersion("01.2.3".to_string());
/// assert_eq!(error.category(), ErrorCategory::Semantic);
/// assert!(!error.is_recoverable());
///
/// let skipped = ValidationError::Unreachable("connection refused".to_string());
/// assert!(skipped.is_recoverable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    // Structural errors
    #[error("Unable to read manifest: {0}")]
    Unreadable(String),

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Missing required {level} fields: {}", .fields.join(", "))]
    MissingFields {
        level: &'static str,
        fields: Vec<String>,
    },

    #[error("Unknown {level} fields: {}", .fields.join(", "))]
    UnknownFields {
        level: &'static str,
        fields: Vec<String>,
    },

    #[error("Field '{field}' must be {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
    },

    #[error("plugin_id '{plugin_id}' does not match filename '{filename}' (expected '{expected}')")]
    IdFilenameMismatch {
        plugin_id: String,
        filename: String,
        expected: String,
    },

    #[error("plugin_id '{0}' must be lower-case")]
    IdNotLowercase(String),

    #[error("plugin_id '{0}' must be two or more dot-separated segments (e.g., osaurus.time)")]
    IdMalformed(String),

    #[error("Duplicate plugin_id '{plugin_id}': already used by {existing} (case-insensitive match)")]
    DuplicateId { plugin_id: String, existing: String },

    #[error("Invalid OS '{value}'. Must be one of: {allowed}")]
    InvalidOs { value: String, allowed: String },

    #[error("Invalid architecture '{value}'. Must be one of: {allowed}")]
    InvalidArch { value: String, allowed: String },

    #[error("URL must start with https:// (got '{0}')")]
    InsecureUrl(String),

    #[error("Invalid SHA-256 checksum format '{0}'")]
    InvalidChecksum(String),

    #[error("Invalid minisign public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid minisign signature: {0}")]
    InvalidSignatureFormat(String),

    #[error("'artifacts' must be a non-empty list")]
    EmptyArtifacts,

    // Semantic errors
    #[error("Invalid Semantic Version '{0}'")]
    InvalidVersion(String),

    #[error("Invalid osaurus_min_version '{0}'")]
    InvalidMinHostVersion(String),

    #[error("Must contain at least one artifact for {0}")]
    MissingPrimaryTarget(String),

    #[error("Duplicate version '{version}' (first declared at version[{first_index}])")]
    DuplicateVersion { version: String, first_index: usize },

    // Trust errors
    #[error("Public key for '{plugin_id}' differs from the key registered at {base_ref}; registered keys are immutable")]
    KeyChanged { plugin_id: String, base_ref: String },

    #[error("Unable to read prior manifest at {base_ref}: {reason}")]
    HistoryUnavailable { base_ref: String, reason: String },

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Signature verification failed: {0}")]
    SignatureMismatch(String),

    #[error("Signature verification was not performed ({0}) and policy requires it")]
    VerificationRequired(String),

    // Availability errors
    #[error("Artifact unreachable: {0}")]
    Unreachable(String),

    // Systemic errors
    #[error("Signature verification capability unavailable: {0}")]
    VerifierUnavailable(String),

    #[error("Registry directory not found: {0}")]
    RegistryMissing(String),
}

impl RegistryErrorExt for ValidationError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Unreadable(_) => "Check that the manifest file is readable",
            Self::InvalidJson(_) => "Fix the JSON syntax of the manifest",
            Self::MissingFields { .. } => "Add the missing fields to the manifest",
            Self::UnknownFields { .. } => "Remove fields the registry does not recognize",
            Self::WrongType { .. } => "Fix the type of the field",
            Self::IdFilenameMismatch { .. } => "Rename the file to <plugin_id>.json",
            Self::IdNotLowercase(_) => "Use a lower-case plugin_id",
            Self::IdMalformed(_) => "Use a dotted identifier such as vendor.plugin",
            Self::DuplicateId { .. } => "Pick a plugin_id that is not already registered",
            Self::InvalidOs { .. } | Self::InvalidArch { .. } => {
                "Use a supported operating system and architecture"
            }
            Self::InsecureUrl(_) => "Serve artifacts over HTTPS",
            Self::InvalidChecksum(_) => "Provide a 64 character hexadecimal SHA-256 digest",
            Self::InvalidPublicKey(_) => "Paste the public key line from minisign.pub",
            Self::InvalidSignatureFormat(_) => "Paste the full contents of the .minisig file",
            Self::EmptyArtifacts => "Publish at least one artifact per version",
            Self::InvalidVersion(_) | Self::InvalidMinHostVersion(_) => {
                "Use a semantic version such as 1.2.3"
            }
            Self::MissingPrimaryTarget(_) => "Add a build for the primary platform",
            Self::DuplicateVersion { .. } => "Each version may be listed only once",
            Self::KeyChanged { .. } => "Registered keys cannot be rotated. Restore the original key",
            Self::HistoryUnavailable { .. } => "Make sure the base revision is fetched",
            Self::ChecksumMismatch { .. } => "Security verification failed. Artifact may be tampered",
            Self::SignatureMismatch(_) => "Security verification failed. Artifact may be tampered",
            Self::VerificationRequired(_) => "Publish the artifact before submitting the manifest",
            Self::Unreachable(_) => "Artifact was not reachable; verification skipped",
            Self::VerifierUnavailable(_) => "Install minisign or disable signature verification",
            Self::RegistryMissing(_) => "Run from the registry root or pass --plugins-dir",
        }
    }

    fn is_recoverable(&self) -> bool {
        self.category() == ErrorCategory::Availability
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Unreadable(_)
            | Self::InvalidJson(_)
            | Self::MissingFields { .. }
            | Self::UnknownFields { .. }
            | Self::WrongType { .. }
            | Self::IdFilenameMismatch { .. }
            | Self::IdNotLowercase(_)
            | Self::IdMalformed(_)
            | Self::DuplicateId { .. }
            | Self::InvalidOs { .. }
            | Self::InvalidArch { .. }
            | Self::InsecureUrl(_)
            | Self::InvalidChecksum(_)
            | Self::InvalidPublicKey(_)
            | Self::InvalidSignatureFormat(_)
            | Self::EmptyArtifacts => ErrorCategory::Structural,

            Self::InvalidVersion(_)
            | Self::InvalidMinHostVersion(_)
            | Self::MissingPrimaryTarget(_)
            | Self::DuplicateVersion { .. } => ErrorCategory::Semantic,

            Self::KeyChanged { .. }
            | Self::HistoryUnavailable { .. }
            | Self::ChecksumMismatch { .. }
            | Self::SignatureMismatch(_)
            | Self::VerificationRequired(_) => ErrorCategory::Trust,

            Self::Unreachable(_) => ErrorCategory::Availability,

            Self::VerifierUnavailable(_) | Self::RegistryMissing(_) => ErrorCategory::Systemic,
        }
    }
}
