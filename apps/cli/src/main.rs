//! ContactScrub CLI — contact table cleaning and enrichment tool.
//!
//! Deduplicates CSV contact tables and enriches surviving records, degrading
//! gracefully when the inference backend is unavailable.

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
