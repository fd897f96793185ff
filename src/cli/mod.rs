// CLI module for promptcache
// Author: kelexine (https://github.com/kelexine)

mod commands;

pub use commands::CommandContext;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::AppConfig;
use crate::error::Result;
use commands::{
    ClearCommand, CostCommand, DeleteCommand, ExportCommand, GetCommand, ImportCommand,
    InitCommand, ListCommand, SearchCommand, ServeCommand, SetCommand, StatsCommand,
};

/// promptcache - local prompt/response cache with similarity search
#[derive(Parser, Debug)]
#[command(name = "promptcache", version, about, long_about = None)]
pub struct Cli {
    /// Use the per-user cache in the home directory instead of ./.promptcache
    #[arg(long, global = true)]
    pub global: bool,

    /// Cache directory, overriding local/global resolution
    #[arg(long, global = true, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a cache store in the target directory
    Init(InitCommand),
    /// Store a prompt/response pair
    Set(SetCommand),
    /// Look up the cached response for a prompt
    Get(GetCommand),
    /// Remove one entry by hash
    Delete(DeleteCommand),
    /// List cached entries
    List(ListCommand),
    /// Rank cached prompts by similarity to a query
    Search(SearchCommand),
    /// Show aggregate cache statistics
    Stats(StatsCommand),
    /// Remove entries, optionally only those older than a cutoff
    Clear(ClearCommand),
    /// Write a snapshot of the whole store to a file or stdout
    Export(ExportCommand),
    /// Merge a snapshot file into the store
    Import(ImportCommand),
    /// Estimate the dollar value of the cached responses
    Cost(CostCommand),
    /// Serve the cache over HTTP
    Serve(ServeCommand),
}

impl Cli {
    pub async fn run(self, config: AppConfig) -> Result<()> {
        let ctx = CommandContext::new(config, self.global, self.dir);
        match self.command {
            Commands::Init(cmd) => cmd.execute(&ctx),
            Commands::Set(cmd) => cmd.execute(&ctx),
            Commands::Get(cmd) => cmd.execute(&ctx),
            Commands::Delete(cmd) => cmd.execute(&ctx),
            Commands::List(cmd) => cmd.execute(&ctx),
            Commands::Search(cmd) => cmd.execute(&ctx),
            Commands::Stats(cmd) => cmd.execute(&ctx),
            Commands::Clear(cmd) => cmd.execute(&ctx),
            Commands::Export(cmd) => cmd.execute(&ctx),
            Commands::Import(cmd) => cmd.execute(&ctx),
            Commands::Cost(cmd) => cmd.execute(&ctx),
            Commands::Serve(cmd) => cmd.execute(&ctx).await,
        }
    }
}
