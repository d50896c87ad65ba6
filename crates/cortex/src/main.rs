//! cortex - Tiered memory for a coding assistant
//!
//! Inspects and drives the working memory, knowledge graph and context tiers,
//! and fires lifecycle events at registered plugins.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;
mod commands;
mod config;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so --json output stays parseable
    let filter = EnvFilter::from_default_env().add_directive("cortex=info".parse()?);
    if cli.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }

    let config = config::Config::load()?;

    match cli.command {
        Commands::Status { json } => commands::status::execute(json, &config).await,
        Commands::Memory(cmd) => commands::memory::execute(cmd, &config).await,
        Commands::Pattern(cmd) => commands::pattern::execute(cmd, &config).await,
        Commands::Context(cmd) => commands::context::execute(cmd, &config).await,
        Commands::Plugins(cmd) => commands::plugins::execute(cmd, &config).await,
        Commands::Hook(cmd) => commands::hook::execute(cmd, &config).await,
        Commands::Version => {
            println!("cortex {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
