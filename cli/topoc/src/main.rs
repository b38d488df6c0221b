//! topoc - compile and deploy topo application specifications
//!
//! Loads a specification from a file or the registry, compiles it for one
//! backend, applies (or deletes) it and optionally tails its logs.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod client;
mod config;
mod error;
mod run;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Diagnostics go to stderr so rendered artifacts on stdout stay clean
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let outcome = match cli.into_config() {
        Ok(config) => run::run(config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = outcome {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}
