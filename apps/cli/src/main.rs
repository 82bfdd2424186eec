//! mlpipe CLI: run the data/ML step pipeline.
//!
//! Selects steps from configuration and launches each one as an isolated
//! process, wiring artifacts from earlier steps into later ones.

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
