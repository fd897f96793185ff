//! Utility functions and helpers for promptcache.
//!
//! This module provides cross-cutting concerns like structured logging and
//! gzip handling for snapshot files.
//!
//! # Submodules
//!
//! - `logging`: Tracing and logging initialization.
//! - `compress`: Gzip compression for exported snapshots.
//!
//! Author: kelexine (<https://github.com/kelexine>)

pub mod compress;
pub mod logging;
