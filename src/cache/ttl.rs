// TTL duration string parsing
// Author: kelexine (https://github.com/kelexine)

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Result, StoreError};

/// Lazily initialized regex for TTL duration strings
static TTL_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_ttl_regex() -> &'static Regex {
    TTL_REGEX.get_or_init(|| Regex::new(r"^(\d+)(d|h|m|s)$").expect("Invalid regex pattern"))
}

const DAY_MS: u64 = 86_400_000;
const HOUR_MS: u64 = 3_600_000;
const MINUTE_MS: u64 = 60_000;
const SECOND_MS: u64 = 1_000;

/// Parse a TTL duration string like `"30d"`, `"12h"`, `"45m"` or `"30s"`
/// into milliseconds.
///
/// The grammar is a decimal count followed by exactly one lowercase unit
/// suffix. Anything else (bare numbers, unknown units, fractions, leading
/// or trailing whitespace) is rejected rather than silently defaulted.
pub fn parse_ttl(raw: &str) -> Result<u64> {
    let captures = get_ttl_regex()
        .captures(raw)
        .ok_or_else(|| StoreError::InvalidTtl(raw.to_string()))?;

    let count: u64 = captures[1]
        .parse()
        .map_err(|_| StoreError::InvalidTtl(raw.to_string()))?;

    let unit_ms = match &captures[2] {
        "d" => DAY_MS,
        "h" => HOUR_MS,
        "m" => MINUTE_MS,
        _ => SECOND_MS,
    };

    count
        .checked_mul(unit_ms)
        .ok_or_else(|| StoreError::InvalidTtl(raw.to_string()))
}
