// Plugin registry validator
// Main entry point for the plugin-registry binary

use clap::Parser;
use registry_engine::cli::{Cli, Command};
use registry_engine::config::Config;
use registry_engine::handlers::{handle_hash, handle_validate, handle_verify, OutputFormat};
use registry_engine::telemetry::init_telemetry_with_level;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<bool> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration (or use custom path if provided)
    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_env();
    if let Some(level) = &cli.log {
        config.core.log_level = level.clone();
    }
    config.validate_fields()?;

    // Only takes effect if RUST_LOG env var is not set
    init_telemetry_with_level(&config.core.log_level);

    tracing::debug!(
        "plugin-registry v{} ({} - {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Handle commands
    match cli.command {
        Command::Validate {
            plugins_dir,
            verify_signatures,
            require_verification,
            base_ref,
            verifier,
        } => {
            if let Some(dir) = plugins_dir {
                config.registry.plugins_dir = dir;
            }
            if verify_signatures {
                config.policy.verify_signatures = true;
            }
            if require_verification {
                config.policy.require_verification = true;
            }
            if let Some(base_ref) = base_ref {
                config.policy.base_ref = Some(base_ref);
            }
            if let Some(verifier) = verifier {
                config.policy.verifier = verifier.into();
            }
            config.validate()?;

            handle_validate(&config, format).await
        }

        Command::Hash { file } => {
            handle_hash(&file, format).await?;
            Ok(true)
        }

        Command::Verify {
            file,
            signature,
            public_key,
            verifier,
        } => {
            handle_verify(
                &file,
                signature,
                &public_key,
                verifier.into(),
                &config,
                format,
            )
            .await
        }
    }
}
