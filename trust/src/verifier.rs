//! Artifact verification: SHA-256 hash and minisign signature checks
//!
//! Two signature backends implement `SignatureVerifier`:
//!
//! - `MinisignTool` shells out to the `minisign` binary. Inputs are
//!   written to a per-call temporary directory that is removed when the
//!   call returns, on success and on every error path.
//! - `NativeVerifier` checks the Ed25519 signatures in-process.
//!
//! Both reject a signature made with a different key id than the one
//! registered for the plugin.

use async_trait::async_trait;
use blake2::Blake2b512;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use sdk::errors::ValidationError;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;

use crate::minisign::{FormatError, KeyId, PublicKey, SignatureBlob};

/// Signature algorithm over the raw artifact bytes
const ALG_LEGACY: [u8; 2] = *b"Ed";
/// Signature algorithm over the BLAKE2b-512 digest of the artifact
const ALG_PREHASHED: [u8; 2] = *b"ED";

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("signature was made with key {signature}, but the registered key is {registered}")]
    KeyIdMismatch { signature: String, registered: String },

    #[error("unsupported signature algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("signature does not match artifact: {0}")]
    Rejected(String),

    #[error("trusted comment signature is invalid")]
    InvalidGlobalSignature,

    #[error("{0}")]
    Unavailable(String),

    #[error("verification timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VerifyError {
    /// Failures of the capability itself rather than of a signature
    pub fn is_systemic(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_) | Self::Io(_))
    }
}

impl From<VerifyError> for ValidationError {
    fn from(err: VerifyError) -> Self {
        if err.is_systemic() {
            ValidationError::VerifierUnavailable(err.to_string())
        } else {
            ValidationError::SignatureMismatch(err.to_string())
        }
    }
}

/// Capability: decide whether artifact bytes were signed by a key holder
#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Fails if the backend cannot run in this environment
    fn ensure_available(&self) -> Result<(), VerifyError>;

    async fn verify(
        &self,
        artifact: &[u8],
        signature: &SignatureBlob,
        key: &PublicKey,
    ) -> Result<(), VerifyError>;
}

fn check_key_id(signature: &SignatureBlob, key: &PublicKey) -> Result<(), VerifyError> {
    let parts = signature.parts()?;
    let material = key.material()?;
    if parts.key_id != material.key_id {
        return Err(VerifyError::KeyIdMismatch {
            signature: KeyId(&parts.key_id).to_string(),
            registered: KeyId(&material.key_id).to_string(),
        });
    }
    Ok(())
}

/// Verifies by invoking the external `minisign` tool
#[derive(Debug, Clone)]
pub struct MinisignTool {
    program: PathBuf,
    timeout: Duration,
}

impl MinisignTool {
    pub fn new(timeout: Duration) -> Self {
        Self::with_program("minisign", timeout)
    }

    pub fn with_program(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl SignatureVerifier for MinisignTool {
    fn name(&self) -> &str {
        "minisign"
    }

    fn ensure_available(&self) -> Result<(), VerifyError> {
        which::which(&self.program).map(|_| ()).map_err(|e| {
            VerifyError::Unavailable(format!("'{}' not found: {}", self.program.display(), e))
        })
    }

    async fn verify(
        &self,
        artifact: &[u8],
        signature: &SignatureBlob,
        key: &PublicKey,
    ) -> Result<(), VerifyError> {
        check_key_id(signature, key)?;

        // Dropped (and deleted) on every return path below
        let workdir = tempfile::tempdir()?;
        let artifact_path = workdir.path().join("artifact");
        let signature_path = workdir.path().join("artifact.minisig");
        let key_path = workdir.path().join("minisign.pub");

        tokio::fs::write(&artifact_path, artifact).await?;
        tokio::fs::write(&signature_path, format!("{}\n", signature.as_str())).await?;
        tokio::fs::write(&key_path, key.to_key_file()).await?;

        let mut command = tokio::process::Command::new(&self.program);
        command
            .arg("-V")
            .arg("-q")
            .arg("-p")
            .arg(&key_path)
            .arg("-m")
            .arg(&artifact_path)
            .arg("-x")
            .arg(&signature_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VerifyError::Unavailable(format!(
                    "'{}' not found",
                    self.program.display()
                )))
            }
            Ok(Err(e)) => return Err(VerifyError::Io(e)),
            Err(_) => return Err(VerifyError::Timeout(self.timeout)),
        };

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        tracing::debug!("minisign exited with {}: {}", output.status, stderr);
        Err(VerifyError::Rejected(if stderr.is_empty() {
            format!("minisign exited with {}", output.status)
        } else {
            stderr
        }))
    }
}

/// Verifies minisign signatures in-process with Ed25519
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeVerifier;

#[async_trait]
impl SignatureVerifier for NativeVerifier {
    fn name(&self) -> &str {
        "native"
    }

    fn ensure_available(&self) -> Result<(), VerifyError> {
        Ok(())
    }

    async fn verify(
        &self,
        artifact: &[u8],
        signature: &SignatureBlob,
        key: &PublicKey,
    ) -> Result<(), VerifyError> {
        check_key_id(signature, key)?;

        let material = key.material()?;
        let parts = signature.parts()?;
        let verifying_key =
            VerifyingKey::from_bytes(&material.key).map_err(|_| FormatError::KeyPoint)?;
        let artifact_signature = Signature::from_bytes(&parts.signature);

        let result = match parts.algorithm {
            ALG_LEGACY => verifying_key.verify(artifact, &artifact_signature),
            ALG_PREHASHED => {
                let digest = Blake2b512::digest(artifact);
                verifying_key.verify(&digest, &artifact_signature)
            }
            other => {
                return Err(VerifyError::UnsupportedAlgorithm(
                    String::from_utf8_lossy(&other).into_owned(),
                ))
            }
        };
        result.map_err(|e| VerifyError::Rejected(e.to_string()))?;

        // The global signature binds the trusted comment to the signature
        let mut global_message = parts.signature.to_vec();
        global_message.extend_from_slice(signature.trusted_comment().as_bytes());
        let global_signature = Signature::from_bytes(&signature.global_signature()?);
        verifying_key
            .verify(&global_message, &global_signature)
            .map_err(|_| VerifyError::InvalidGlobalSignature)?;

        Ok(())
    }
}

/// Verify that the SHA-256 hash of `data` matches `expected_hex`
///
/// The comparison is case-insensitive.
pub fn verify_hash(data: &[u8], expected_hex: &str) -> Result<(), ValidationError> {
    let computed = compute_hash(data);

    if !computed.eq_ignore_ascii_case(expected_hex) {
        return Err(ValidationError::ChecksumMismatch {
            expected: expected_hex.to_string(),
            actual: computed,
        });
    }

    Ok(())
}

/// Compute the SHA-256 hash of `data` and return hex string
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use ed25519_dalek::{Signer, SigningKey};

    const KEY_ID: [u8; 8] = [1, 2, 3, 4, 5, 6, 7, 8];

    fn signing_key(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    fn public_key(signer: &SigningKey, key_id: [u8; 8]) -> PublicKey {
        let mut bytes = ALG_LEGACY.to_vec();
        bytes.extend_from_slice(&key_id);
        bytes.extend_from_slice(signer.verifying_key().as_bytes());
        PublicKey::parse(&STANDARD.encode(bytes)).unwrap()
    }

    fn sign(signer: &SigningKey, key_id: [u8; 8], data: &[u8], prehashed: bool) -> SignatureBlob {
        let (algorithm, signature) = if prehashed {
            (ALG_PREHASHED, signer.sign(&Blake2b512::digest(data)))
        } else {
            (ALG_LEGACY, signer.sign(data))
        };
        let mut line = algorithm.to_vec();
        line.extend_from_slice(&key_id);
        line.extend_from_slice(&signature.to_bytes());

        let comment = "timestamp:1700000000\tfile:plugin.zip";
        let mut global = signature.to_bytes().to_vec();
        global.extend_from_slice(comment.as_bytes());
        let global = signer.sign(&global);

        SignatureBlob::parse(&format!(
            "untrusted comment: signature from minisign secret key\n{}\ntrusted comment: {}\n{}\n",
            STANDARD.encode(line),
            comment,
            STANDARD.encode(global.to_bytes())
        ))
        .unwrap()
    }

    #[test]
    fn test_compute_and_verify_hash() {
        let data = b"hello world";
        let hash = compute_hash(data);
        assert!(verify_hash(data, &hash).is_ok());
        assert!(verify_hash(data, &hash.to_uppercase()).is_ok());
    }

    #[test]
    fn test_verify_hash_mismatch() {
        let data = b"hello world";
        let result = verify_hash(
            data,
            "0000000000000000000000000000000000000000000000000000000000000000",
        );
        assert!(matches!(
            result,
            Err(ValidationError::ChecksumMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_native_accepts_prehashed_and_legacy() {
        let signer = signing_key(7);
        let key = public_key(&signer, KEY_ID);
        let data = b"plugin archive bytes";

        for prehashed in [true, false] {
            let blob = sign(&signer, KEY_ID, data, prehashed);
            assert!(NativeVerifier.verify(data, &blob, &key).await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_native_rejects_tampered_artifact() {
        let signer = signing_key(7);
        let key = public_key(&signer, KEY_ID);
        let blob = sign(&signer, KEY_ID, b"original", true);

        let err = NativeVerifier
            .verify(b"tampered", &blob, &key)
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::Rejected(_)));
        assert!(!err.is_systemic());
    }

    #[tokio::test]
    async fn test_native_rejects_other_signer() {
        let signer = signing_key(7);
        let attacker = signing_key(9);
        let key = public_key(&signer, KEY_ID);
        let blob = sign(&attacker, KEY_ID, b"payload", true);

        let err = NativeVerifier.verify(b"payload", &blob, &key).await.unwrap_err();
        assert!(matches!(err, VerifyError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_key_id_mismatch_rejected() {
        let signer = signing_key(7);
        let key = public_key(&signer, KEY_ID);
        let blob = sign(&signer, [9; 8], b"payload", true);

        let err = NativeVerifier.verify(b"payload", &blob, &key).await.unwrap_err();
        assert!(matches!(err, VerifyError::KeyIdMismatch { .. }));
    }

    #[tokio::test]
    async fn test_forged_trusted_comment_rejected() {
        let signer = signing_key(7);
        let key = public_key(&signer, KEY_ID);
        let blob = sign(&signer, KEY_ID, b"payload", true);
        let forged = blob
            .as_str()
            .replace("file:plugin.zip", "file:other.zip");
        let forged = SignatureBlob::parse(&forged).unwrap();

        let err = NativeVerifier
            .verify(b"payload", &forged, &key)
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::InvalidGlobalSignature));
    }

    #[test]
    fn test_missing_tool_is_unavailable() {
        let tool = MinisignTool::with_program(
            "minisign-does-not-exist-on-this-host",
            Duration::from_secs(1),
        );
        let err = tool.ensure_available().unwrap_err();
        assert!(err.is_systemic());
        assert!(matches!(
            ValidationError::from(err),
            ValidationError::VerifierUnavailable(_)
        ));
    }

    #[cfg(unix)]
    mod tool {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;

        /// Stand-in for `minisign` that records its arguments, then runs `body`
        fn fake_tool(dir: &Path, body: &str) -> PathBuf {
            let program = dir.join("minisign");
            let record = dir.join("args");
            let script = format!(
                "#!/bin/sh\nprintf '%s\\n' \"$@\" > '{}'\ncat \"$8\" > '{}.sig'\n{}\n",
                record.display(),
                record.display(),
                body
            );
            std::fs::write(&program, script).unwrap();
            std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();
            program
        }

        fn recorded_args(dir: &Path) -> Vec<String> {
            std::fs::read_to_string(dir.join("args"))
                .unwrap()
                .lines()
                .map(String::from)
                .collect()
        }

        fn fixture() -> (PublicKey, SignatureBlob) {
            let signer = signing_key(7);
            let data = b"plugin archive";
            (
                public_key(&signer, KEY_ID),
                sign(&signer, KEY_ID, data, true),
            )
        }

        #[tokio::test]
        async fn test_tool_success_verifies() {
            let dir = tempfile::tempdir().unwrap();
            let tool =
                MinisignTool::with_program(fake_tool(dir.path(), "exit 0"), Duration::from_secs(5));
            let (key, blob) = fixture();

            tool.verify(b"plugin archive", &blob, &key).await.unwrap();

            let args = recorded_args(dir.path());
            assert_eq!(args.len(), 8);
            assert_eq!(args[..3], ["-V", "-q", "-p"]);
            assert!(args[3].ends_with("minisign.pub"));
            assert_eq!(args[4], "-m");
            assert_eq!(args[6], "-x");
            assert!(args[7].ends_with("artifact.minisig"));

            let written = std::fs::read_to_string(dir.path().join("args.sig")).unwrap();
            assert_eq!(written, format!("{}\n", blob.as_str()));

            let scratch = Path::new(&args[5]).parent().unwrap();
            assert!(!scratch.exists());
        }

        #[tokio::test]
        async fn test_tool_failure_is_rejection() {
            let dir = tempfile::tempdir().unwrap();
            let tool = MinisignTool::with_program(
                fake_tool(dir.path(), "echo 'Signature verification failed' >&2\nexit 1"),
                Duration::from_secs(5),
            );
            let (key, blob) = fixture();

            let err = tool.verify(b"plugin archive", &blob, &key).await.unwrap_err();
            assert!(!err.is_systemic());
            match err {
                VerifyError::Rejected(message) => {
                    assert_eq!(message, "Signature verification failed")
                }
                other => panic!("expected rejection, got {:?}", other),
            }

            let args = recorded_args(dir.path());
            assert!(!Path::new(&args[5]).parent().unwrap().exists());
        }

        #[tokio::test]
        async fn test_silent_tool_failure_names_exit_status() {
            let dir = tempfile::tempdir().unwrap();
            let tool =
                MinisignTool::with_program(fake_tool(dir.path(), "exit 2"), Duration::from_secs(5));
            let (key, blob) = fixture();

            let err = tool.verify(b"plugin archive", &blob, &key).await.unwrap_err();
            assert!(matches!(
                err,
                VerifyError::Rejected(ref m) if m.starts_with("minisign exited with")
            ));
        }

        #[tokio::test]
        async fn test_hung_tool_times_out() {
            let dir = tempfile::tempdir().unwrap();
            let tool = MinisignTool::with_program(
                fake_tool(dir.path(), "exec sleep 5"),
                Duration::from_millis(500),
            );
            let (key, blob) = fixture();

            let err = tool.verify(b"plugin archive", &blob, &key).await.unwrap_err();
            assert!(matches!(err, VerifyError::Timeout(_)));
            assert!(err.is_systemic());

            let args = recorded_args(dir.path());
            assert!(!Path::new(&args[5]).parent().unwrap().exists());
        }

        #[tokio::test]
        async fn test_absent_tool_is_unavailable() {
            let dir = tempfile::tempdir().unwrap();
            let tool =
                MinisignTool::with_program(dir.path().join("missing"), Duration::from_secs(5));
            let (key, blob) = fixture();

            let err = tool.verify(b"plugin archive", &blob, &key).await.unwrap_err();
            assert!(matches!(err, VerifyError::Unavailable(_)));
            assert!(err.is_systemic());
        }
    }
}
