//! # agreement CLI entry point
//!
//! Parses command-line arguments, installs the tracing subscriber and
//! dispatches to subcommand handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use agreement_cli::config::{run_config, ConfigArgs};
use agreement_cli::simulate::{run_simulate, SimulateArgs};

/// Agreement protocol toolchain.
///
/// Simulates disputable-action scenarios against in-memory collaborators
/// and validates deployment configuration.
#[derive(Parser, Debug)]
#[command(name = "agreement", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    /// Path to the deployment config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a scenario file and print the resulting event log.
    Simulate(SimulateArgs),

    /// Validate a config file or print the defaults.
    Config(ConfigArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG overrides the -v level.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "agreement CLI starting");

    let result = match &cli.command {
        Commands::Simulate(args) => run_simulate(args, cli.config.as_deref()),
        Commands::Config(args) => run_config(args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
