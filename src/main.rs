// promptcache - Local prompt/response cache with similarity search
// Author: kelexine (https://github.com/kelexine)

use anyhow::Result;
use clap::Parser;
use promptcache::cli::Cli;
use promptcache::config::AppConfig;
use promptcache::utils::logging;
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Phase 1: Load configuration
    let config = AppConfig::load()?;

    // Phase 2: Initialize logging
    logging::init(&config.logging)?;
    debug!("promptcache v{}", env!("CARGO_PKG_VERSION"));

    // Phase 3: Dispatch the subcommand
    cli.run(config).await?;

    Ok(())
}
