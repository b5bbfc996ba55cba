//! Plugin Registry SDK
//!
//! Shared types for the registry validator: the manifest data model, the
//! error taxonomy, and the diagnostics that make up a validation report.
//! This crate is used by both the engine and the trust pipeline.

/// Error types and handling
pub mod errors;

/// Manifest types
pub mod manifest;

/// Diagnostics and run reports
pub mod report;

// Re-export commonly used types
pub use errors::{ErrorCategory, RegistryErrorExt, ValidationError};
pub use manifest::{
    Arch, Artifact, Os, PluginManifest, PublicKeys, Requirements, SignatureRecord, Target,
    VersionEntry, PRIMARY_TARGET,
};
pub use report::{
    ArtifactVerification, Diagnostic, Location, ManifestReport, RunReport, Severity, SkipReason,
    VerificationOutcome,
};
