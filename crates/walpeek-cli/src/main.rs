use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod prompt;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Logs go to stderr; stdout carries only the message lines.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("walpeek=info".parse()?))
        .init();

    let cli = Cli::parse();
    let status = commands::stream::run(&cli).await;

    // A pending password prompt may still hold a blocking thread.
    std::process::exit(i32::from(status.code()));
}
