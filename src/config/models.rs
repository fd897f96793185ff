//! Configuration data structures for promptcache.
//!
//! This module defines the schema for the application settings, including
//! cache location and backend selection, server parameters, license key
//! lookup and similarity search defaults.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::storage::BackendKind;

/// Name of the per-project cache directory.
pub const LOCAL_CACHE_DIR: &str = ".promptcache";

/// The root configuration object for the application.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Cache location and backend settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// HTTP server settings (host, port).
    #[serde(default)]
    pub server: ServerConfig,

    /// License key lookup settings.
    #[serde(default)]
    pub license: LicenseConfig,

    /// Similarity search defaults.
    #[serde(default)]
    pub search: SearchConfig,

    /// Logging and observability settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings for where and how cache entries are stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Explicit cache directory. Overrides local/global resolution when set.
    /// Default: unset
    #[serde(default)]
    pub dir: Option<String>,

    /// Whether commands default to the per-user cache instead of the
    /// per-project `./.promptcache` directory.
    /// Default: `false`
    #[serde(default)]
    pub global: bool,

    /// Backend created by `init` when none is requested explicitly.
    /// Default: `json`
    #[serde(default)]
    pub backend: BackendKind,

    /// Model recorded when a `set` does not name one.
    /// Default: `default`
    #[serde(default = "default_model")]
    pub default_model: String,

    /// TTL duration string applied to new entries when none is given,
    /// e.g. `"30d"`.
    /// Default: unset (entries do not expire)
    #[serde(default)]
    pub default_ttl: Option<String>,
}

impl CacheConfig {
    /// Directory `init` creates the store in. An explicit `dir` wins;
    /// otherwise `global` (from config or the CLI flag) selects the per-user
    /// location over the per-project one.
    pub fn resolve_dir(&self, force_global: bool) -> PathBuf {
        if let Some(dir) = &self.dir {
            return PathBuf::from(dir);
        }
        if self.global || force_global {
            global_cache_dir()
        } else {
            PathBuf::from(LOCAL_CACHE_DIR)
        }
    }

    /// Directory every other command reads from. Same precedence as
    /// [`CacheConfig::resolve_dir`], except a missing per-project directory
    /// falls through to the per-user one, so a global cache keeps working
    /// from any working directory without `--global`.
    pub fn resolve_existing_dir(&self, force_global: bool) -> PathBuf {
        if let Some(dir) = &self.dir {
            return PathBuf::from(dir);
        }
        if self.global || force_global {
            return global_cache_dir();
        }
        let local = PathBuf::from(LOCAL_CACHE_DIR);
        if local.exists() {
            local
        } else {
            global_cache_dir()
        }
    }
}

/// Per-user cache directory under the home directory.
pub fn global_cache_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(LOCAL_CACHE_DIR)
}

/// Settings for the built-in HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The IP address or hostname the server should bind to.
    /// Default: `127.0.0.1`
    #[serde(default = "default_host")]
    pub host: String,

    /// The port number the server should listen on.
    /// Default: `8787`
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Settings for locating the license key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseConfig {
    /// Path to the license key file.
    /// Default: `~/.promptcache/license.key`
    #[serde(default = "default_license_path")]
    pub key_path: String,
}

/// Default knobs for similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Minimum similarity for a match.
    /// Default: `0.3`
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Maximum number of matches returned.
    /// Default: `10`
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Minimum similarity for `search --best` to accept a winner.
    /// Default: `0.8`
    #[serde(default = "default_best_match_threshold")]
    pub best_match_threshold: f64,
}

/// Settings for application logging and output format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum log level (`trace`, `debug`, `info`, `warn`, `error`).
    /// Default: `warn`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format for logs (`pretty`, `json`, `compact`).
    /// Default: `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default trait implementations linking to custom logic

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            global: false,
            backend: BackendKind::default(),
            default_model: default_model(),
            default_ttl: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            key_path: default_license_path(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            limit: default_limit(),
            best_match_threshold: default_best_match_threshold(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Helper functions for serde defaults and shared constants

fn default_model() -> String {
    crate::cache::DEFAULT_MODEL.to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_license_path() -> String {
    global_cache_dir()
        .join("license.key")
        .to_string_lossy()
        .to_string()
}

fn default_threshold() -> f64 {
    crate::similarity::DEFAULT_THRESHOLD
}

fn default_limit() -> usize {
    crate::similarity::DEFAULT_LIMIT
}

fn default_best_match_threshold() -> f64 {
    crate::similarity::BEST_MATCH_THRESHOLD
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
