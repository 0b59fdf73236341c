//! companyinfo CLI: builds one unified metadata table for Taiwan-listed
//! securities from the official registries, ETF and index weights, detail
//! pages and a concept classifier.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
