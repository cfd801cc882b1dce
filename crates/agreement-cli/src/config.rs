//! # Config Subcommand
//!
//! - `check <file>`: parse and validate a deployment config.
//! - `show-defaults`: print the default config as YAML.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use agreement_protocol::AgreementConfig;

/// Arguments for the `agreement config` subcommand.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate a config file and print the effective settings.
    Check {
        /// Path to the config YAML file.
        file: PathBuf,
    },

    /// Print the default config.
    ShowDefaults,
}

/// Execute the config subcommand.
pub fn run_config(args: &ConfigArgs) -> Result<u8> {
    match &args.command {
        ConfigCommand::Check { file } => {
            let config = AgreementConfig::load(file)
                .with_context(|| format!("config {} is invalid", file.display()))?;
            tracing::info!(path = %file.display(), "config is valid");
            print!("{}", config.to_yaml()?);
            Ok(0)
        }
        ConfigCommand::ShowDefaults => {
            print!("{}", AgreementConfig::default().to_yaml()?);
            Ok(0)
        }
    }
}
