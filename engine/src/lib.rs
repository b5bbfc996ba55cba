//! Plugin Registry Engine Library
//!
//! This library validates a plugin registry directory. It is used by both
//! the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Manifest schema checks
pub mod schema;

/// Semantic version validation
pub mod semver;

/// Validation orchestration
pub mod orchestrator;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
