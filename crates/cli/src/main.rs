//! swcache command-line entry point.
//!
//! Drives the cache controller against a real origin and the on-disk cache
//! store. Logging goes to stderr so command output on stdout stays parseable.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = commands::Cli::parse();
    commands::run(cli).await
}
