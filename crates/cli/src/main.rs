//! Main entry point for the SIP console command line
//!
//! `sipconsole load` runs a call-volume load test and prints a summary;
//! `sipconsole check-config` validates a load test file.

mod commands;
mod output;
mod settings;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use settings::LoadArgs;

#[derive(Parser, Debug)]
#[command(name = "sipconsole", author, version, about = "SIP calling console", long_about = None)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a concurrent call load test
    Load(LoadArgs),

    /// Parse and validate a load test file
    CheckConfig {
        /// Load test TOML file
        file: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "sipconsole=debug,sipconsole_load_tester=debug,sipconsole_client_core=info"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Load(args) => commands::load::execute(args).await,
        Commands::CheckConfig { file } => commands::check_config::execute(&file),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "❌ Error:".red().bold(), e);
        std::process::exit(1);
    }
}
