//! Manifest types for registry entries
//!
//! A registry holds one JSON manifest per plugin. These are the typed
//! forms produced once a raw document has passed the schema checker.

use serde::{Deserialize, Serialize};

/// File extension of manifest files in the registry directory
pub const MANIFEST_EXTENSION: &str = "json";

/// Operating systems accepted by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Os {
    #[serde(rename = "macos")]
    MacOs,
}

impl Os {
    /// Every accepted operating system
    pub const ALL: &'static [Os] = &[Os::MacOs];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MacOs => "macos",
        }
    }

    /// Parse an operating system tag; `None` if it is not in the closed set
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|os| os.as_str() == value)
    }
}

/// CPU architectures accepted by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arch {
    #[serde(rename = "arm64")]
    Arm64,
}

impl Arch {
    /// Every accepted architecture
    pub const ALL: &'static [Arch] = &[Arch::Arm64];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Arm64 => "arm64",
        }
    }

    /// Parse an architecture tag; `None` if it is not in the closed set
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|arch| arch.as_str() == value)
    }
}

/// An OS/architecture pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub os: Os,
    pub arch: Arch,
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.os.as_str(), self.arch.as_str())
    }
}

/// Every version must ship at least one artifact for this target
pub const PRIMARY_TARGET: Target = Target {
    os: Os::MacOs,
    arch: Arch::Arm64,
};

/// A plugin's registry entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    pub plugin_id: String,
    pub public_keys: PublicKeys,
    pub versions: Vec<VersionEntry>,
}

/// Registered public keys. Exactly one scheme is supported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeys {
    /// Minisign public key line (`RW...`)
    pub minisign: String,
}

/// One published version of a plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: String,
    pub artifacts: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<Requirements>,
}

/// Host requirements of a version
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Requirements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub osaurus_min_version: Option<String>,
}

/// A downloadable build for one OS/architecture pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub os: Os,
    pub arch: Arch,
    pub url: String,
    pub sha256: String,
    pub minisign: SignatureRecord,
}

/// Detached minisign signature stored with an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    /// Full `.minisig` contents (four lines)
    pub signature: String,
}
