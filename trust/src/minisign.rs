//! Minisign key and signature formats
//!
//! Syntax is checked here, independently of whether a signature is
//! authentic. A public key is a single line: the `RW` prefix followed by
//! a base64 payload. A signature is the four-line `.minisig` file:
//!
//! ```text
//! untrusted comment: <free text>
//! <base64: algorithm (2) | key id (8) | ed25519 signature (64)>
//! trusted comment: <text covered by the global signature>
//! <base64: ed25519 signature over signature | trusted comment>
//! ```

use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Prefix of every minisign public key (base64 of the `Ed` algorithm tag)
pub const KEY_PREFIX: &str = "RW";

pub const UNTRUSTED_COMMENT_MARKER: &str = "untrusted comment:";
pub const TRUSTED_COMMENT_MARKER: &str = "trusted comment:";

/// Minimum number of base64 characters after the key prefix
const MIN_KEY_PAYLOAD_LEN: usize = 40;

pub const KEY_ID_LEN: usize = 8;
const ED25519_KEY_LEN: usize = 32;
const ED25519_SIG_LEN: usize = 64;
const ALGORITHM_LEN: usize = 2;

static KEY_PATTERN: OnceLock<Regex> = OnceLock::new();

fn key_pattern() -> &'static Regex {
    KEY_PATTERN.get_or_init(|| {
        Regex::new(&format!(
            r"^{}[A-Za-z0-9+/]{{{},}}={{0,2}}$",
            KEY_PREFIX, MIN_KEY_PAYLOAD_LEN
        ))
        .expect("Invalid key pattern")
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("public key must be '{}' followed by at least {} base64 characters", KEY_PREFIX, MIN_KEY_PAYLOAD_LEN)]
    KeySyntax,

    #[error("public key decodes to {0} bytes, expected {}", ALGORITHM_LEN + KEY_ID_LEN + ED25519_KEY_LEN)]
    KeyLength(usize),

    #[error("public key is not a valid Ed25519 point")]
    KeyPoint,

    #[error("signature must have exactly 4 lines, found {0}")]
    LineCount(usize),

    #[error("line 1 must start with '{}'", UNTRUSTED_COMMENT_MARKER)]
    MissingUntrustedComment,

    #[error("line 3 must start with '{}'", TRUSTED_COMMENT_MARKER)]
    MissingTrustedComment,

    #[error("line {0} is not valid base64")]
    InvalidBase64(usize),

    #[error("signature decodes to {0} bytes, expected {}", ALGORITHM_LEN + KEY_ID_LEN + ED25519_SIG_LEN)]
    SignatureLength(usize),

    #[error("global signature decodes to {0} bytes, expected {}", ED25519_SIG_LEN)]
    GlobalSignatureLength(usize),
}

/// A syntactically valid minisign public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    encoded: String,
}

/// Decoded public key bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyMaterial {
    pub algorithm: [u8; 2],
    pub key_id: [u8; KEY_ID_LEN],
    pub key: [u8; ED25519_KEY_LEN],
}

impl PublicKey {
    /// Check the textual key encoding. Does not decode the payload.
    pub fn parse(encoded: &str) -> Result<Self, FormatError> {
        if !key_pattern().is_match(encoded) {
            return Err(FormatError::KeySyntax);
        }
        Ok(Self {
            encoded: encoded.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    /// Decode the payload into algorithm, key id and Ed25519 key
    pub fn material(&self) -> Result<KeyMaterial, FormatError> {
        let bytes = STANDARD
            .decode(&self.encoded)
            .map_err(|_| FormatError::KeySyntax)?;
        if bytes.len() != ALGORITHM_LEN + KEY_ID_LEN + ED25519_KEY_LEN {
            return Err(FormatError::KeyLength(bytes.len()));
        }

        let mut material = KeyMaterial {
            algorithm: [0; 2],
            key_id: [0; KEY_ID_LEN],
            key: [0; ED25519_KEY_LEN],
        };
        material.algorithm.copy_from_slice(&bytes[..ALGORITHM_LEN]);
        material
            .key_id
            .copy_from_slice(&bytes[ALGORITHM_LEN..ALGORITHM_LEN + KEY_ID_LEN]);
        material
            .key
            .copy_from_slice(&bytes[ALGORITHM_LEN + KEY_ID_LEN..]);
        Ok(material)
    }

    /// Contents of a `minisign.pub` file for this key
    pub fn to_key_file(&self) -> String {
        format!("untrusted comment: minisign public key\n{}\n", self.encoded)
    }
}

/// A structurally valid `.minisig` blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureBlob {
    raw: String,
    signature: Vec<u8>,
    trusted_comment: String,
    global_signature: Vec<u8>,
}

/// Decoded line 2 of a signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureParts {
    pub algorithm: [u8; 2],
    pub key_id: [u8; KEY_ID_LEN],
    pub signature: [u8; ED25519_SIG_LEN],
}

impl SignatureBlob {
    /// Structural check: four lines, comment markers on lines 1 and 3,
    /// base64 on lines 2 and 4. One final newline is allowed; any other
    /// blank line counts toward the four.
    pub fn parse(raw: &str) -> Result<Self, FormatError> {
        let body = raw
            .strip_suffix("\r\n")
            .or_else(|| raw.strip_suffix('\n'))
            .unwrap_or(raw);
        let lines: Vec<&str> = body
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .collect();
        if lines.len() != 4 {
            return Err(FormatError::LineCount(lines.len()));
        }
        if !lines[0].starts_with(UNTRUSTED_COMMENT_MARKER) {
            return Err(FormatError::MissingUntrustedComment);
        }
        if !lines[2].starts_with(TRUSTED_COMMENT_MARKER) {
            return Err(FormatError::MissingTrustedComment);
        }

        let signature = decode_line(lines[1], 2)?;
        let global_signature = decode_line(lines[3], 4)?;

        let trusted_comment = &lines[2][TRUSTED_COMMENT_MARKER.len()..];
        let trusted_comment = trusted_comment
            .strip_prefix(' ')
            .unwrap_or(trusted_comment)
            .trim_end_matches('\r');

        Ok(Self {
            raw: lines.join("\n"),
            signature,
            trusted_comment: trusted_comment.to_string(),
            global_signature,
        })
    }

    /// Normalized blob, suitable for writing a `.minisig` file
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Text after the trusted comment marker
    pub fn trusted_comment(&self) -> &str {
        &self.trusted_comment
    }

    pub fn parts(&self) -> Result<SignatureParts, FormatError> {
        if self.signature.len() != ALGORITHM_LEN + KEY_ID_LEN + ED25519_SIG_LEN {
            return Err(FormatError::SignatureLength(self.signature.len()));
        }
        let mut parts = SignatureParts {
            algorithm: [0; 2],
            key_id: [0; KEY_ID_LEN],
            signature: [0; ED25519_SIG_LEN],
        };
        parts.algorithm.copy_from_slice(&self.signature[..ALGORITHM_LEN]);
        parts
            .key_id
            .copy_from_slice(&self.signature[ALGORITHM_LEN..ALGORITHM_LEN + KEY_ID_LEN]);
        parts
            .signature
            .copy_from_slice(&self.signature[ALGORITHM_LEN + KEY_ID_LEN..]);
        Ok(parts)
    }

    pub fn global_signature(&self) -> Result<[u8; ED25519_SIG_LEN], FormatError> {
        self.global_signature
            .as_slice()
            .try_into()
            .map_err(|_| FormatError::GlobalSignatureLength(self.global_signature.len()))
    }
}

fn decode_line(line: &str, number: usize) -> Result<Vec<u8>, FormatError> {
    let line = line.trim_end_matches('\r');
    if line.is_empty() {
        return Err(FormatError::InvalidBase64(number));
    }
    STANDARD
        .decode(line)
        .map_err(|_| FormatError::InvalidBase64(number))
}

/// Hex rendering of a key id, as minisign prints it
pub struct KeyId<'a>(pub &'a [u8; KEY_ID_LEN]);

impl fmt::Display for KeyId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // minisign stores key ids little-endian and prints them big-endian
        for byte in self.0.iter().rev() {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}
