//! Plugin Registry Trust Pipeline
//!
//! This crate establishes trust in registry entries: it parses minisign
//! keys and signatures, enforces that a plugin's registered key never
//! changes, fetches artifacts, and verifies detached signatures against
//! the registered key.
//!
//! The external collaborators (version history, network, the signature
//! scheme itself) sit behind traits so the orchestrator can be driven by
//! in-memory fakes in tests.

pub mod fetch;
pub mod keys;
pub mod minisign;
pub mod verifier;

pub use fetch::{ArtifactFetcher, FetchError, HttpFetcher};
pub use keys::{check_immutability, GitHistory, HistoryError, KeyRegistration, ManifestHistory};
pub use minisign::{FormatError, PublicKey, SignatureBlob};
pub use verifier::{
    compute_hash, verify_hash, MinisignTool, NativeVerifier, SignatureVerifier, VerifyError,
};
