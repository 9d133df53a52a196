//! ## exportcheck-cli
//! **Command-line driver for the delivery-contract check**
//!
//! Runs the scenario menu against the reference exporter and exits non-zero
//! when any scenario fails.

use clap::Parser;

mod commands;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(run_args) => {
            let passed = commands::run_contract_check(run_args).await?;
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Scenarios => {
            commands::list_scenarios();
            Ok(())
        }
    }
}
