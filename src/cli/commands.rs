// Subcommand implementations for the promptcache CLI
// Author: kelexine (https://github.com/kelexine)

use clap::Parser;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::cache::{Cache, SetOptions, SetOutcome};
use crate::config::AppConfig;
use crate::cost;
use crate::error::{Result, StoreError};
use crate::license::{Entitlements, FileEntitlements};
use crate::similarity::SearchOptions;
use crate::storage::{
    BackendKind, CacheEntry, CacheSnapshot, ClearOptions, ImportStrategy, InitOutcome, ListOptions,
    SortBy,
};
use crate::utils::compress;

/// Shared state for command execution: the loaded configuration plus the
/// `--global`/`--dir` overrides feeding directory resolution.
pub struct CommandContext {
    pub config: AppConfig,
    force_global: bool,
    dir_override: Option<PathBuf>,
}

impl CommandContext {
    pub fn new(config: AppConfig, force_global: bool, dir_override: Option<PathBuf>) -> Self {
        Self {
            config,
            force_global,
            dir_override,
        }
    }

    /// Directory `init` creates the store in.
    pub fn init_dir(&self) -> PathBuf {
        match &self.dir_override {
            Some(dir) => dir.clone(),
            None => self.config.cache.resolve_dir(self.force_global),
        }
    }

    /// Directory every other command operates on. A missing per-project
    /// directory falls through to the per-user one.
    pub fn cache_dir(&self) -> PathBuf {
        match &self.dir_override {
            Some(dir) => dir.clone(),
            None => self.config.cache.resolve_existing_dir(self.force_global),
        }
    }

    fn entitlements(&self) -> Box<dyn Entitlements> {
        Box::new(FileEntitlements::new(&self.config.license.key_path))
    }

    fn open_cache(&self) -> Result<Cache> {
        Cache::open(&self.cache_dir(), self.entitlements())
    }
}

/// Create a cache store in the target directory.
#[derive(Parser, Debug)]
pub struct InitCommand {
    /// Storage backend: "json" or "sqlite" (defaults to the configured one)
    #[arg(short, long)]
    pub backend: Option<String>,
}

impl InitCommand {
    pub fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let kind: BackendKind = match self.backend.as_deref() {
            Some(raw) => raw.parse()?,
            None => ctx.config.cache.backend,
        };
        let dir = ctx.init_dir();
        let (_, outcome) = Cache::initialize(&dir, kind, ctx.entitlements())?;
        match outcome {
            InitOutcome::Created => println!("Initialized {kind} cache in {}", dir.display()),
            InitOutcome::AlreadyExists => {
                println!("Cache already initialized in {}", dir.display())
            }
        }
        Ok(())
    }
}

/// Store a prompt/response pair.
#[derive(Parser, Debug)]
pub struct SetCommand {
    /// The prompt the response answers
    pub prompt: String,

    /// The response to cache
    pub response: String,

    /// Model the response came from
    #[arg(short, long)]
    pub model: Option<String>,

    /// Expiry as a duration string, e.g. "30d", "12h", "45m", "30s"
    #[arg(long)]
    pub ttl: Option<String>,

    /// Token count for the response (estimated from its length when omitted)
    #[arg(long)]
    pub tokens: Option<u64>,

    /// Label attached to the entry; repeat for multiple tags
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,
}

impl SetCommand {
    pub fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let mut cache = ctx.open_cache()?;
        let model = self
            .model
            .clone()
            .unwrap_or_else(|| ctx.config.cache.default_model.clone());
        let options = SetOptions {
            model: Some(model),
            ttl: self.ttl.clone().or_else(|| ctx.config.cache.default_ttl.clone()),
            tokens: self.tokens,
            tags: if self.tags.is_empty() {
                None
            } else {
                Some(self.tags.clone())
            },
        };
        match cache.set(&self.prompt, &self.response, options)? {
            SetOutcome::Inserted { hash } => println!("Cached {hash}"),
            SetOutcome::Updated { hash } => println!("Updated {hash}"),
            SetOutcome::LimitExceeded { reason } => {
                println!("Not cached: {reason}.");
                println!(
                    "Place a PRO license key at {} to lift this limit.",
                    ctx.config.license.key_path
                );
            }
        }
        Ok(())
    }
}

/// Look up the cached response for a prompt.
#[derive(Parser, Debug)]
pub struct GetCommand {
    /// The prompt to look up
    pub prompt: String,

    /// Model the prompt was cached under
    #[arg(short, long)]
    pub model: Option<String>,

    /// Print the full entry as JSON instead of just the response
    #[arg(long)]
    pub json: bool,
}

impl GetCommand {
    pub fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let mut cache = ctx.open_cache()?;
        let model = self
            .model
            .as_deref()
            .or(Some(ctx.config.cache.default_model.as_str()));
        match cache.get(&self.prompt, model)? {
            Some(entry) => {
                if self.json {
                    println!("{}", serde_json::to_string_pretty(&entry)?);
                } else {
                    println!("{}", entry.response);
                }
            }
            None => println!("No cached response."),
        }
        Ok(())
    }
}

/// Remove one entry by hash.
#[derive(Parser, Debug)]
pub struct DeleteCommand {
    /// Hash of the entry to remove (as printed by `set` and `list`)
    pub hash: String,
}

impl DeleteCommand {
    pub fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let mut cache = ctx.open_cache()?;
        if cache.delete(&self.hash)? {
            println!("Deleted {}", self.hash);
        } else {
            println!("No entry with hash {}", self.hash);
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct ListRow<'a> {
    hash: &'a str,
    #[serde(flatten)]
    entry: &'a CacheEntry,
}

/// List cached entries.
#[derive(Parser, Debug)]
pub struct ListCommand {
    /// Only show entries for this model
    #[arg(short, long)]
    pub model: Option<String>,

    /// Sort order: "created" (newest first) or "hits" (most hit first)
    #[arg(long, default_value = "created")]
    pub sort: String,

    /// Maximum number of entries to show
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Print the entries as JSON
    #[arg(long)]
    pub json: bool,
}

impl ListCommand {
    pub fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let sort = match self.sort.as_str() {
            "created" => SortBy::Created,
            "hits" => SortBy::Hits,
            other => {
                return Err(StoreError::Config(format!(
                    "unknown sort field: {other:?} (expected created or hits)"
                )))
            }
        };
        let cache = ctx.open_cache()?;
        let rows = cache.list(&ListOptions {
            model: self.model.clone(),
            sort,
            limit: self.limit,
        })?;

        if self.json {
            let rows: Vec<ListRow> = rows
                .iter()
                .map(|(hash, entry)| ListRow { hash, entry })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
            return Ok(());
        }

        if rows.is_empty() {
            println!("Cache is empty.");
            return Ok(());
        }
        println!(
            "{:<12}  {:<20}  {:>5}  {:<19}  {}",
            "HASH", "MODEL", "HITS", "CREATED", "PROMPT"
        );
        for (hash, entry) in &rows {
            println!(
                "{:<12}  {:<20}  {:>5}  {:<19}  {}",
                hash,
                preview(&entry.model, 20),
                entry.hits,
                entry.created.format("%Y-%m-%d %H:%M:%S"),
                preview(&entry.prompt, 48)
            );
        }
        Ok(())
    }
}

/// Rank cached prompts by similarity to a query.
#[derive(Parser, Debug)]
pub struct SearchCommand {
    /// Free-text query to match against cached prompts
    pub query: String,

    /// Minimum similarity score in [0, 1]
    #[arg(short, long)]
    pub threshold: Option<f64>,

    /// Maximum number of matches to show
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Show only the single best match above the reuse threshold
    #[arg(long)]
    pub best: bool,

    /// Print the matches as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchCommand {
    pub fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let cache = ctx.open_cache()?;

        if self.best {
            let threshold = self
                .threshold
                .unwrap_or(ctx.config.search.best_match_threshold);
            match cache.best_match(&self.query, Some(threshold))? {
                Some(found) => {
                    if self.json {
                        println!("{}", serde_json::to_string_pretty(&found)?);
                    } else {
                        println!("{:.2}  {}  {}", found.rounded_score(), found.hash, found.entry.prompt);
                        println!("{}", found.entry.response);
                    }
                }
                None => println!("No match above threshold."),
            }
            return Ok(());
        }

        let options = SearchOptions {
            threshold: self.threshold.unwrap_or(ctx.config.search.threshold),
            limit: self.limit.unwrap_or(ctx.config.search.limit),
        };
        let matches = cache.search(&self.query, &options)?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&matches)?);
            return Ok(());
        }
        if matches.is_empty() {
            println!("No similar prompts found.");
            return Ok(());
        }
        println!("{:<5}  {:<12}  {}", "SCORE", "HASH", "PROMPT");
        for found in &matches {
            println!(
                "{:<5.2}  {:<12}  {}",
                found.rounded_score(),
                found.hash,
                preview(&found.entry.prompt, 60)
            );
        }
        Ok(())
    }
}

/// Show aggregate cache statistics.
#[derive(Parser, Debug)]
pub struct StatsCommand {
    /// Print the statistics as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let cache = ctx.open_cache()?;
        let stats = cache.stats()?;
        if self.json {
            let payload = serde_json::json!({
                "backend": cache.backend_kind().as_str(),
                "pro": cache.is_pro(),
                "stats": stats,
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
            return Ok(());
        }
        println!("Backend:     {}", cache.backend_kind());
        println!("Tier:        {}", if cache.is_pro() { "PRO" } else { "FREE" });
        println!("Entries:     {}", stats.total_entries);
        println!("Hits:        {}", stats.total_hits);
        println!("Saved:       {} bytes", stats.total_saved);
        println!("Store size:  {} bytes", stats.cache_size);
        Ok(())
    }
}

/// Remove entries, optionally only those older than a cutoff.
#[derive(Parser, Debug)]
pub struct ClearCommand {
    /// Only remove entries created more than this many days ago
    #[arg(long, value_name = "DAYS")]
    pub older_than: Option<u32>,
}

impl ClearCommand {
    pub fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let mut cache = ctx.open_cache()?;
        let removed = cache.clear(&ClearOptions {
            older_than_days: self.older_than,
        })?;
        match removed {
            0 => println!("Nothing to remove."),
            1 => println!("Removed 1 entry."),
            n => println!("Removed {n} entries."),
        }
        Ok(())
    }
}

/// Write a snapshot of the whole store to a file or stdout.
#[derive(Parser, Debug)]
pub struct ExportCommand {
    /// Output file (stdout when omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Gzip the snapshot
    #[arg(long)]
    pub compress: bool,
}

impl ExportCommand {
    pub fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let cache = ctx.open_cache()?;
        let snapshot = cache.export_data()?;
        let raw = serde_json::to_vec_pretty(&snapshot)?;
        let data = if self.compress {
            compress::compress(&raw)?
        } else {
            raw
        };
        match &self.output {
            Some(path) => {
                fs::write(path, &data)?;
                println!(
                    "Exported {} entries to {}",
                    snapshot.entry_count(),
                    path.display()
                );
            }
            None => io::stdout().write_all(&data)?,
        }
        Ok(())
    }
}

/// Merge a snapshot file into the store.
#[derive(Parser, Debug)]
pub struct ImportCommand {
    /// Snapshot file, plain or gzipped JSON
    pub input: PathBuf,

    /// Conflict handling: "replace", "merge" or "skip-existing"
    #[arg(short, long, default_value = "merge")]
    pub strategy: String,
}

impl ImportCommand {
    pub fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let strategy: ImportStrategy = self.strategy.parse()?;
        let raw = compress::maybe_decompress(fs::read(&self.input)?)?;
        let snapshot: CacheSnapshot = serde_json::from_slice(&raw)?;
        let mut cache = ctx.open_cache()?;
        let imported = cache.import_data(&snapshot, strategy)?;
        println!(
            "Imported {imported} of {} entries ({strategy}).",
            snapshot.entry_count()
        );
        Ok(())
    }
}

/// Estimate the dollar value of the cached responses.
#[derive(Parser, Debug)]
pub struct CostCommand {
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl CostCommand {
    pub fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let cache = ctx.open_cache()?;
        let rows = cache.list(&ListOptions::default())?;
        let report = cost::estimate(rows.iter().map(|(_, entry)| entry));
        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }
        if report.models.is_empty() {
            println!("Cache is empty.");
            return Ok(());
        }
        println!(
            "{:<24}  {:>7}  {:>9}  {:>6}  {:>9}  {:>9}",
            "MODEL", "ENTRIES", "TOKENS", "HITS", "VALUE", "SAVED"
        );
        for (model, usage) in &report.models {
            println!(
                "{:<24}  {:>7}  {:>9}  {:>6}  {:>9}  {:>9}",
                preview(model, 24),
                usage.entries,
                usage.tokens,
                usage.hits,
                format!("${:.4}", usage.value),
                format!("${:.4}", usage.saved)
            );
        }
        println!(
            "{:<24}  {:>7}  {:>9}  {:>6}  {:>9}  {:>9}",
            "Total",
            report.total_entries,
            report.total_tokens,
            report.total_hits,
            format!("${:.4}", report.total_value),
            format!("${:.4}", report.total_saved)
        );
        Ok(())
    }
}

/// Serve the cache over HTTP.
#[derive(Parser, Debug)]
pub struct ServeCommand {
    /// Address to bind (defaults to the configured host)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on (defaults to the configured port)
    #[arg(short, long)]
    pub port: Option<u16>,
}

impl ServeCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let cache = ctx.open_cache()?;
        let host = self
            .host
            .clone()
            .unwrap_or_else(|| ctx.config.server.host.clone());
        let port = self.port.unwrap_or(ctx.config.server.port);
        crate::server::serve(cache, ctx.config.clone(), &host, port).await
    }
}

/// Truncate `text` to at most `max` characters for single-line display.
fn preview(text: &str, max: usize) -> String {
    let flat = text.replace(['\n', '\r', '\t'], " ");
    if flat.chars().count() <= max {
        flat
    } else {
        let mut cut: String = flat.chars().take(max.saturating_sub(3)).collect();
        cut.push_str("...");
        cut
    }
}
