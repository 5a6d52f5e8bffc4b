//! LessonForge CLI: turn folders of scanned pages into structured courses.
//!
//! Runs the processing pipeline once from the terminal or serves it over HTTP.

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
