//! BMEcat builder CLI.
//!
//! Turns product CSV exports into BMEcat 1.2 / 2005 catalogs, optionally
//! following a supplier's XML sample or specification documents.

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
