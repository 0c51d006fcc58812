//! Configuration validation.
//!
//! Checks every section a command reads before any network or file work
//! starts. The first offending key is reported.

use std::ops::RangeInclusive;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::domain::error::SigtraderError;
use crate::domain::interval::Interval;
use crate::domain::signal::Logic;
use crate::ports::config_port::ConfigPort;

const MAX_LOOKBACK_DAYS: i64 = 3650;
const MAX_RETRIES: i64 = 20;
/// Upper bound for bar-count settings such as example windows and holds.
const MAX_WINDOW_BARS: i64 = 100_000;

/// `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or RFC 3339, all read as UTC.
pub fn parse_date_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> SigtraderError {
    SigtraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn missing(section: &str, key: &str) -> SigtraderError {
    SigtraderError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

fn require(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, SigtraderError> {
    config
        .get_string(section, key)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| missing(section, key))
}

fn int_in_range(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
    range: RangeInclusive<i64>,
) -> Result<(), SigtraderError> {
    if let Some(raw) = config.get_string(section, key) {
        if raw.trim().parse::<i64>().is_err() {
            return Err(invalid(section, key, format!("'{raw}' is not an integer")));
        }
    }
    let value = config.get_int(section, key, default);
    if !range.contains(&value) {
        return Err(invalid(
            section,
            key,
            format!("{key} must be between {} and {}", range.start(), range.end()),
        ));
    }
    Ok(())
}

pub fn validate_fetcher_config(config: &dyn ConfigPort) -> Result<(), SigtraderError> {
    int_in_range(config, "fetcher", "max_lookback_days", 365, 1..=MAX_LOOKBACK_DAYS)?;
    int_in_range(config, "fetcher", "max_retries", 3, 0..=MAX_RETRIES)?;
    int_in_range(config, "fetcher", "page_limit", 1000, 1..=1000)?;
    int_in_range(config, "fetcher", "page_delay_ms", 120, 0..=60_000)?;
    int_in_range(config, "fetcher", "request_timeout_secs", 30, 1..=3600)?;

    let backoff = config.get_double("fetcher", "backoff_base_secs", 1.5);
    if !(0.0..=600.0).contains(&backoff) {
        return Err(invalid(
            "fetcher",
            "backoff_base_secs",
            "backoff_base_secs must be between 0 and 600",
        ));
    }
    for key in ["binance_base_url", "coingecko_base_url"] {
        if let Some(url) = config.get_string("fetcher", key) {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(invalid("fetcher", key, format!("'{url}' is not an http(s) URL")));
            }
        }
    }
    Ok(())
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), SigtraderError> {
    require(config, "backtest", "symbol")?;

    if let Some(raw) = config.get_string("backtest", "interval") {
        raw.parse::<Interval>()
            .map_err(|e| invalid("backtest", "interval", e.to_string()))?;
    }

    let start = parse_bound(config, "start")?;
    let end = parse_bound(config, "end")?;
    if start >= end {
        return Err(invalid("backtest", "start", "start must be before end"));
    }

    let capital = config.get_double("backtest", "initial_capital", 1000.0);
    if !(capital > 0.0) {
        return Err(invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    let fee = config.get_double("backtest", "fee_pct", 0.0);
    if !(0.0..1.0).contains(&fee) {
        return Err(invalid("backtest", "fee_pct", "fee_pct must be in [0, 1)"));
    }
    Ok(())
}

fn parse_bound(config: &dyn ConfigPort, key: &str) -> Result<DateTime<Utc>, SigtraderError> {
    let raw = require(config, "backtest", key)?;
    parse_date_time(&raw).ok_or_else(|| {
        invalid(
            "backtest",
            key,
            format!("invalid {key} '{raw}', expected YYYY-MM-DD or RFC 3339"),
        )
    })
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), SigtraderError> {
    require(config, "strategy", "signals")?;
    if let Some(logic) = config.get_string("strategy", "logic") {
        logic
            .parse::<Logic>()
            .map_err(|e| invalid("strategy", "logic", e.to_string()))?;
    }
    int_in_range(config, "strategy", "hold_bars", 0, 0..=MAX_WINDOW_BARS)?;
    Ok(())
}

pub fn validate_examples_config(config: &dyn ConfigPort) -> Result<(), SigtraderError> {
    int_in_range(config, "examples", "num_examples", 3, 1..=1000)?;
    int_in_range(config, "examples", "lookback", 30, 0..=MAX_WINDOW_BARS)?;
    int_in_range(config, "examples", "lookforward", 30, 0..=MAX_WINDOW_BARS)?;
    int_in_range(config, "examples", "history_capacity", 5000, 1..=1_000_000)?;
    Ok(())
}
