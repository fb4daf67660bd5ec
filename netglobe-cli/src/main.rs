//! ## netglobe-cli
//! **Unified operational interface**
//! Captures local TCP traffic, geolocates the remote end of every flow and
//! pushes batched arcs to connected globe viewers.
//!
//! ### Expectations:
//! - POSIX-compliant argument parsing
//! - Command-line flags override file and environment configuration
//! - Startup failures print the full error chain and exit non-zero

use clap::Parser;

mod commands;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(run_args) => commands::run(run_args).await,
        Commands::ListDevices(list_args) => commands::list_devices(list_args),
    }
}
