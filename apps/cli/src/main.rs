//! paperflow CLI: math-modeling paper pipeline.
//!
//! Harvests and cleans data, draws charts, plans and renders the paper's
//! micro-units, merges them into numbered Markdown, and exports to Word.

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
