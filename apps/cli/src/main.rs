//! OfficeFinder CLI: resolve office addresses for a list of companies.
//!
//! Reads the master company list, resumes after the rows already in the
//! ledger, and appends one resolved address per company.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
