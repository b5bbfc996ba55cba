//! Manifest schema checks
//!
//! Validates the shape of a raw manifest document before anything is
//! trusted from it:
//!
//! - required fields at the plugin, version and artifact levels
//! - `plugin_id` syntax, filename match and batch-wide uniqueness
//! - closed OS / architecture sets, HTTPS URLs, SHA-256 digests
//! - public key encoding
//! - primary-platform coverage of every version
//!
//! Errors are collected rather than returned on the first failure so a
//! single pass reports everything wrong with a manifest. Version strings
//! and signatures are checked later by the orchestrator.

use regex::Regex;
use registry_trust::minisign::PublicKey;
use sdk::errors::ValidationError;
use sdk::manifest::{Arch, Os, PluginManifest, PRIMARY_TARGET};
use sdk::report::{Diagnostic, Location};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const TOP_LEVEL_FIELDS: &[&str] = &["plugin_id", "versions", "public_keys"];
const VERSION_FIELDS: &[&str] = &["version", "artifacts"];
const OPTIONAL_VERSION_FIELDS: &[&str] = &["requires"];
const ARTIFACT_FIELDS: &[&str] = &["os", "arch", "url", "sha256", "minisign"];
const KEY_FIELDS: &[&str] = &["minisign"];
const SIGNATURE_FIELDS: &[&str] = &["signature"];
const REQUIREMENT_FIELDS: &[&str] = &["osaurus_min_version"];

const SECURE_SCHEME: &str = "https://";
const SHA256_HEX_LEN: usize = 64;

static PLUGIN_ID_PATTERN: OnceLock<Regex> = OnceLock::new();

fn plugin_id_pattern() -> &'static Regex {
    PLUGIN_ID_PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9_-]*(\.[a-z0-9][a-z0-9_-]*)+$")
            .expect("Invalid plugin_id pattern")
    })
}

/// Schema strictness switches
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaOptions {
    /// Unknown fields are errors instead of warnings
    pub deny_unknown_fields: bool,
    /// Repeated version strings are errors instead of warnings
    pub reject_duplicate_versions: bool,
}

/// Case-insensitive set of plugin identifiers claimed during one run
///
/// The first manifest to claim an identifier owns it.
#[derive(Debug, Default)]
pub struct IdRegistry {
    owners: HashMap<String, PathBuf>,
}

impl IdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&mut self, plugin_id: &str, manifest: &Path) -> Result<(), ValidationError> {
        let key = plugin_id.to_lowercase();
        if let Some(owner) = self.owners.get(&key) {
            return Err(ValidationError::DuplicateId {
                plugin_id: plugin_id.to_string(),
                existing: owner.display().to_string(),
            });
        }
        self.owners.insert(key, manifest.to_path_buf());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }
}

/// A manifest that passed every schema check
#[derive(Debug, Clone)]
pub struct ValidManifest {
    pub manifest: PluginManifest,
    pub public_key: PublicKey,
    /// Warnings and notes raised along the way
    pub diagnostics: Vec<Diagnostic>,
}

/// Collects diagnostics for one manifest
struct Checker<'a> {
    options: &'a SchemaOptions,
    diagnostics: Vec<Diagnostic>,
}

impl Checker<'_> {
    fn error(&mut self, location: &Location, error: ValidationError) {
        self.diagnostics
            .push(Diagnostic::from_error(location.clone(), &error));
    }

    fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    /// Report required fields that are absent. Returns false if any are.
    fn require(
        &mut self,
        location: &Location,
        object: &Map<String, Value>,
        level: &'static str,
        required: &[&str],
    ) -> bool {
        let missing: Vec<String> = required
            .iter()
            .filter(|field| !object.contains_key(**field))
            .map(|field| field.to_string())
            .collect();
        if missing.is_empty() {
            return true;
        }
        self.error(
            location,
            ValidationError::MissingFields {
                level,
                fields: missing,
            },
        );
        false
    }

    fn unknown(
        &mut self,
        location: &Location,
        object: &Map<String, Value>,
        level: &'static str,
        known: &[&[&str]],
    ) {
        let mut unknown: Vec<String> = object
            .keys()
            .filter(|field| !known.iter().any(|set| set.contains(&field.as_str())))
            .cloned()
            .collect();
        if unknown.is_empty() {
            return;
        }
        unknown.sort();

        let error = ValidationError::UnknownFields {
            level,
            fields: unknown,
        };
        if self.options.deny_unknown_fields {
            self.error(location, error);
        } else {
            self.diagnostics
                .push(Diagnostic::downgraded(location.clone(), &error));
        }
    }

    fn object<'v>(
        &mut self,
        location: &Location,
        value: &'v Value,
        field: &str,
    ) -> Option<&'v Map<String, Value>> {
        let object = value.as_object();
        if object.is_none() {
            self.error(
                location,
                ValidationError::WrongType {
                    field: field.to_string(),
                    expected: "an object",
                },
            );
        }
        object
    }

    fn string<'v>(
        &mut self,
        location: &Location,
        object: &'v Map<String, Value>,
        field: &str,
    ) -> Option<&'v str> {
        let value = object.get(field).and_then(Value::as_str);
        if value.is_none() && object.contains_key(field) {
            self.error(
                location,
                ValidationError::WrongType {
                    field: field.to_string(),
                    expected: "a string",
                },
            );
        }
        value
    }
}

/// Validate a raw manifest document read from `path`
///
/// On success the identifier is claimed in `ids`; on failure every
/// diagnostic found is returned, including warnings.
pub fn validate_manifest(
    raw: &str,
    path: &Path,
    ids: &mut IdRegistry,
    options: &SchemaOptions,
) -> Result<ValidManifest, Vec<Diagnostic>> {
    let location = Location::manifest(path);
    let mut checker = Checker {
        options,
        diagnostics: Vec::new(),
    };

    let document: Value = match serde_json::from_str(raw) {
        Ok(document) => document,
        Err(e) => {
            checker.error(&location, ValidationError::InvalidJson(e.to_string()));
            return Err(checker.diagnostics);
        }
    };

    let Some(root) = checker.object(&location, &document, "manifest") else {
        return Err(checker.diagnostics);
    };

    if !checker.require(&location, root, "top-level", TOP_LEVEL_FIELDS) {
        return Err(checker.diagnostics);
    }
    checker.unknown(&location, root, "top-level", &[TOP_LEVEL_FIELDS]);

    let plugin_id = checker.string(&location, root, "plugin_id");
    if let Some(plugin_id) = plugin_id {
        check_plugin_id(&mut checker, &location, plugin_id, path, ids);
    }

    let public_key = check_public_keys(&mut checker, &location, &root["public_keys"]);

    match root["versions"].as_array() {
        None => checker.error(
            &location,
            ValidationError::WrongType {
                field: "versions".to_string(),
                expected: "a list",
            },
        ),
        Some(versions) if versions.is_empty() => {
            checker.diagnostics.push(Diagnostic::note(
                location.clone(),
                format!(
                    "No versions published yet for {}",
                    plugin_id.unwrap_or("plugin")
                ),
            ));
        }
        Some(versions) => {
            let mut seen: HashMap<&str, usize> = HashMap::new();
            for (index, entry) in versions.iter().enumerate() {
                let version_location = location.version(index);
                let version = check_version(&mut checker, &version_location, entry);

                if let Some(version) = version {
                    if let Some(&first_index) = seen.get(version) {
                        let error = ValidationError::DuplicateVersion {
                            version: version.to_string(),
                            first_index,
                        };
                        if options.reject_duplicate_versions {
                            checker.error(&version_location, error);
                        } else {
                            checker
                                .diagnostics
                                .push(Diagnostic::downgraded(version_location, &error));
                        }
                    } else {
                        seen.insert(version, index);
                    }
                }
            }
        }
    }

    let (Some(public_key), false) = (public_key, checker.has_errors()) else {
        return Err(checker.diagnostics);
    };

    let manifest: PluginManifest = match serde_json::from_value(document.clone()) {
        Ok(manifest) => manifest,
        Err(e) => {
            checker.error(&location, ValidationError::InvalidJson(e.to_string()));
            return Err(checker.diagnostics);
        }
    };

    Ok(ValidManifest {
        manifest,
        public_key,
        diagnostics: checker.diagnostics,
    })
}

fn check_plugin_id(
    checker: &mut Checker<'_>,
    location: &Location,
    plugin_id: &str,
    path: &Path,
    ids: &mut IdRegistry,
) {
    let mut valid = true;

    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let expected = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    if plugin_id != expected {
        checker.error(
            location,
            ValidationError::IdFilenameMismatch {
                plugin_id: plugin_id.to_string(),
                filename,
                expected,
            },
        );
        valid = false;
    }

    if plugin_id != plugin_id.to_lowercase() {
        checker.error(
            location,
            ValidationError::IdNotLowercase(plugin_id.to_string()),
        );
        valid = false;
    } else if !plugin_id_pattern().is_match(plugin_id) {
        checker.error(location, ValidationError::IdMalformed(plugin_id.to_string()));
        valid = false;
    }

    if valid {
        if let Err(error) = ids.claim(plugin_id, path) {
            checker.error(location, error);
        }
    }
}

fn check_public_keys(
    checker: &mut Checker<'_>,
    location: &Location,
    value: &Value,
) -> Option<PublicKey> {
    let keys = checker.object(location, value, "public_keys")?;
    if !checker.require(location, keys, "public_keys", KEY_FIELDS) {
        return None;
    }
    checker.unknown(location, keys, "public_keys", &[KEY_FIELDS]);

    let encoded = checker.string(location, keys, "minisign")?;
    match PublicKey::parse(encoded) {
        Ok(key) => Some(key),
        Err(e) => {
            checker.error(location, ValidationError::InvalidPublicKey(e.to_string()));
            None
        }
    }
}

/// Returns the version string so the caller can check uniqueness
fn check_version<'v>(
    checker: &mut Checker<'_>,
    location: &Location,
    value: &'v Value,
) -> Option<&'v str> {
    let entry = checker.object(location, value, "version entry")?;
    if !checker.require(location, entry, "version", VERSION_FIELDS) {
        return None;
    }
    checker.unknown(
        location,
        entry,
        "version",
        &[VERSION_FIELDS, OPTIONAL_VERSION_FIELDS],
    );

    let version = checker.string(location, entry, "version");

    if let Some(requires) = entry.get("requires") {
        if let Some(requires) = checker.object(location, requires, "requires") {
            checker.unknown(location, requires, "requires", &[REQUIREMENT_FIELDS]);
            checker.string(location, requires, "osaurus_min_version");
        }
    }

    let artifacts = match entry["artifacts"].as_array() {
        Some(artifacts) if !artifacts.is_empty() => artifacts,
        _ => {
            checker.error(location, ValidationError::EmptyArtifacts);
            return version;
        }
    };

    let mut covers_primary = false;
    for (index, artifact) in artifacts.iter().enumerate() {
        if check_artifact(checker, &location.artifact(index), artifact) {
            covers_primary = true;
        }
    }

    // Checked after every artifact, and only well-formed artifacts count
    if !covers_primary {
        checker.error(
            location,
            ValidationError::MissingPrimaryTarget(PRIMARY_TARGET.to_string()),
        );
    }

    version
}

/// Returns true if the artifact is well-formed and targets the primary platform
fn check_artifact(checker: &mut Checker<'_>, location: &Location, value: &Value) -> bool {
    let Some(artifact) = checker.object(location, value, "artifact") else {
        return false;
    };
    if !checker.require(location, artifact, "artifact", ARTIFACT_FIELDS) {
        return false;
    }
    checker.unknown(location, artifact, "artifact", &[ARTIFACT_FIELDS]);

    let errors_before = checker.diagnostics.iter().filter(|d| d.is_error()).count();

    let os = checker.string(location, artifact, "os").and_then(|os| {
        let parsed = Os::parse(os);
        if parsed.is_none() {
            checker.error(
                location,
                ValidationError::InvalidOs {
                    value: os.to_string(),
                    allowed: Os::ALL.iter().map(Os::as_str).collect::<Vec<_>>().join(", "),
                },
            );
        }
        parsed
    });

    let arch = checker.string(location, artifact, "arch").and_then(|arch| {
        let parsed = Arch::parse(arch);
        if parsed.is_none() {
            checker.error(
                location,
                ValidationError::InvalidArch {
                    value: arch.to_string(),
                    allowed: Arch::ALL
                        .iter()
                        .map(Arch::as_str)
                        .collect::<Vec<_>>()
                        .join(", "),
                },
            );
        }
        parsed
    });

    if let Some(url) = checker.string(location, artifact, "url") {
        if !url.starts_with(SECURE_SCHEME) {
            checker.error(location, ValidationError::InsecureUrl(url.to_string()));
        }
    }

    if let Some(sha256) = checker.string(location, artifact, "sha256") {
        if !is_sha256_hex(sha256) {
            checker.error(location, ValidationError::InvalidChecksum(sha256.to_string()));
        }
    }

    if let Some(record) = checker.object(location, &artifact["minisign"], "minisign") {
        if checker.require(location, record, "minisign", SIGNATURE_FIELDS) {
            checker.unknown(location, record, "minisign", &[SIGNATURE_FIELDS]);
            checker.string(location, record, "signature");
        }
    }

    let errors_after = checker.diagnostics.iter().filter(|d| d.is_error()).count();
    let well_formed = errors_after == errors_before;

    well_formed && os == Some(PRIMARY_TARGET.os) && arch == Some(PRIMARY_TARGET.arch)
}

fn is_sha256_hex(value: &str) -> bool {
    value.len() == SHA256_HEX_LEN && value.bytes().all(|b| b.is_ascii_hexdigit())
}
