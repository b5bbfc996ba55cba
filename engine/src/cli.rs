//! CLI interface for the registry validator
//!
//! This module provides the command-line interface using clap's derive API.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::VerifierBackend;

/// Plugin registry validator
///
/// Checks every plugin manifest in a registry directory for schema
/// conformance, version syntax, key immutability and artifact signatures.
#[derive(Parser, Debug)]
#[command(name = "plugin-registry")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VerifierArg {
    /// External minisign tool
    Minisign,
    /// In-process Ed25519
    Native,
}

impl From<VerifierArg> for VerifierBackend {
    fn from(arg: VerifierArg) -> Self {
        match arg {
            VerifierArg::Minisign => VerifierBackend::Minisign,
            VerifierArg::Native => VerifierBackend::Native,
        }
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate every manifest in the registry
    Validate {
        /// Registry directory (overrides config)
        #[arg(long, value_name = "DIR")]
        plugins_dir: Option<PathBuf>,

        /// Fetch artifacts and verify their signatures
        #[arg(long)]
        verify_signatures: bool,

        /// Fail when a signature could not be verified
        #[arg(long)]
        require_verification: bool,

        /// Prior revision for the key immutability check
        #[arg(long, value_name = "REF")]
        base_ref: Option<String>,

        /// Signature verification backend
        #[arg(long, value_enum)]
        verifier: Option<VerifierArg>,
    },

    /// Print the SHA-256 digest of a file
    Hash {
        /// File to hash
        file: PathBuf,
    },

    /// Verify a single file against a minisign signature and public key
    Verify {
        /// Signed file
        file: PathBuf,

        /// Signature file (defaults to `<file>.minisig`)
        #[arg(short = 'x', long, value_name = "PATH")]
        signature: Option<PathBuf>,

        /// Public key string (RW...)
        #[arg(short = 'P', long, value_name = "KEY")]
        public_key: String,

        /// Signature verification backend
        #[arg(long, value_enum, default_value = "native")]
        verifier: VerifierArg,
    },
}
