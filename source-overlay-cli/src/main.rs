//! Source Overlay CLI - Command-line interface
//!
//! This binary wires configuration, logging and the `source_overlay` library
//! together.

mod commands;
mod error;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use source_overlay::OverlayConfig;

use commands::{InfoArgs, ListArgs, PrepareArgs};
use error::CliError;

/// Merge several source trees into one cached overlay of symbolic links.
#[derive(Parser, Debug)]
#[command(name = "source-overlay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// INI configuration file with an [overlay] section
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding overlay roots (default: ./.pyre)
    #[arg(long, global = true, value_name = "DIR")]
    base_directory: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build or refresh the overlay, optionally running a command against it
    Prepare(PrepareArgs),

    /// List files with a suffix using the detected listing backend
    List(ListArgs),

    /// Show version, listing backend and overlay location
    Info(InfoArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let mut config = match &cli.config {
        Some(path) => OverlayConfig::load(path)?,
        None => OverlayConfig::default(),
    };
    if let Some(base_directory) = cli.base_directory {
        config = config.with_base_directory(base_directory);
    }

    // Held until exit so buffered log lines are flushed.
    let _log_guard = logging::init(cli.verbose, config.log_file.as_deref())?;

    match cli.command {
        Commands::Prepare(args) => commands::prepare::run(args, config),
        Commands::List(args) => commands::list::run(args),
        Commands::Info(args) => commands::info::run(args, &config),
    }
}
