//! Fetch request model and the pure pieces of the fetch pipeline: symbol
//! aliasing, range clamping, bucket resampling, pagination and retry state.

use std::collections::BTreeMap;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::domain::error::SigtraderError;
use crate::domain::interval::Interval;
use crate::domain::ohlcv::Bar;

const STABLE_TO_FIAT: &[(&str, &str)] = &[
    ("usdt", "usd"),
    ("usdc", "usd"),
    ("dai", "usd"),
    ("busd", "usd"),
    ("tusd", "usd"),
];

const ASSET_ALIASES: &[(&str, &str)] = &[
    ("bitcoin", "BTC"),
    ("ethereum", "ETH"),
    ("litecoin", "LTC"),
    ("dogecoin", "DOGE"),
    ("cardano", "ADA"),
    ("solana", "SOL"),
    ("ripple", "XRP"),
    ("polkadot", "DOT"),
    ("tron", "TRX"),
];

/// Span (in days) at or below which the secondary source is bucketed hourly.
pub const HOURLY_SPAN_DAYS: i64 = 90;

/// A validated, immutable request for one symbol over `[start, end]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub symbol: String,
    pub interval: Interval,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub quote_currency: String,
}

impl FetchRequest {
    pub fn new(
        symbol: impl Into<String>,
        interval: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        quote_currency: impl Into<String>,
    ) -> Result<Self, SigtraderError> {
        let symbol = symbol.into();
        if symbol.trim().is_empty() {
            return Err(SigtraderError::invalid_request("symbol must not be empty"));
        }
        if start >= end {
            return Err(SigtraderError::invalid_request(format!(
                "start {start} must be before end {end}"
            )));
        }
        let interval: Interval = interval.parse()?;
        Ok(Self {
            symbol,
            interval,
            start,
            end,
            quote_currency: quote_currency.into(),
        })
    }
}

/// Map stable-coin quotes onto their fiat equivalent; empty means `usd`.
pub fn normalize_vs_currency(quote: &str) -> String {
    let quote = quote.trim().to_lowercase();
    if quote.is_empty() {
        return "usd".to_string();
    }
    STABLE_TO_FIAT
        .iter()
        .find(|(stable, _)| *stable == quote)
        .map(|(_, fiat)| fiat.to_string())
        .unwrap_or(quote)
}

/// Translate a logical symbol into exchange pair notation (e.g. `BTCUSDT`).
///
/// A symbol that is already an upper-case alphanumeric pair of six or more
/// characters passes through. Otherwise the asset id is looked up in the
/// alias table; unknown ids yield `None`.
pub fn to_pair_symbol(symbol: &str, quote_currency: &str) -> Option<String> {
    let upper = symbol.to_uppercase();
    if upper.len() >= 6 && upper.chars().all(|c| c.is_ascii_alphanumeric()) && upper == symbol {
        return Some(upper);
    }
    let lower = symbol.to_lowercase();
    let base = ASSET_ALIASES
        .iter()
        .find(|(id, _)| *id == lower)
        .map(|(_, ticker)| *ticker)?;
    let vs = normalize_vs_currency(quote_currency);
    let quote = if vs == "usd" {
        "USDT".to_string()
    } else {
        vs.to_uppercase()
    };
    Some(format!("{base}{quote}"))
}

/// Order the pair, then cap the span at `max_lookback_days` measured back
/// from `end`.
pub fn clamp_range(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    max_lookback_days: i64,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let (start, end) = if start > end { (end, start) } else { (start, end) };
    let span_days = (end.date_naive() - start.date_naive()).num_days();
    if span_days > max_lookback_days {
        (end - Duration::days(max_lookback_days), end)
    } else {
        (start, end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Hourly,
    Daily,
}

impl Granularity {
    pub fn for_span(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if (end - start).num_days() <= HOURLY_SPAN_DAYS {
            Granularity::Hourly
        } else {
            Granularity::Daily
        }
    }

    pub fn bucket_millis(self) -> i64 {
        match self {
            Granularity::Hourly => 3_600_000,
            Granularity::Daily => 86_400_000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Hourly => "hourly",
            Granularity::Daily => "daily",
        }
    }
}

#[derive(Debug, Default)]
struct Bucket {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    has_price: bool,
}

/// Bucket raw `(epoch_ms, value)` points into OHLC bars: first/max/min/last
/// price and summed volume per bucket. Buckets with no price are dropped and
/// a bucket with no volume points gets 0.0.
pub fn resample(prices: &[(i64, f64)], volumes: &[(i64, f64)], granularity: Granularity) -> Vec<Bar> {
    let size = granularity.bucket_millis();
    let floor = |ms: i64| ms.div_euclid(size) * size;
    let mut buckets: BTreeMap<i64, Bucket> = BTreeMap::new();

    let mut sorted_prices = prices.to_vec();
    sorted_prices.sort_by_key(|(ts, _)| *ts);
    for (ts, price) in sorted_prices {
        if !price.is_finite() {
            continue;
        }
        let b = buckets.entry(floor(ts)).or_default();
        if b.has_price {
            b.high = b.high.max(price);
            b.low = b.low.min(price);
            b.close = price;
        } else {
            *b = Bucket {
                open: price,
                high: price,
                low: price,
                close: price,
                volume: b.volume,
                has_price: true,
            };
        }
    }
    for (ts, vol) in volumes {
        if vol.is_finite() {
            buckets.entry(floor(*ts)).or_default().volume += vol;
        }
    }

    buckets
        .into_iter()
        .filter(|(_, b)| b.has_price)
        .filter_map(|(ts, b)| {
            Some(Bar {
                timestamp: Utc.timestamp_millis_opt(ts).single()?,
                open: b.open,
                high: b.high,
                low: b.low,
                close: b.close,
                volume: b.volume,
            })
        })
        .collect()
}

/// Pagination state for windowed kline requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    next_start_ms: i64,
    end_ms: i64,
    interval_ms: i64,
    page_limit: i64,
    done: bool,
}

impl PageCursor {
    pub fn new(start_ms: i64, end_ms: i64, interval_ms: i64, page_limit: u32) -> Self {
        Self {
            next_start_ms: start_ms,
            end_ms,
            interval_ms,
            page_limit: page_limit.max(1) as i64,
            done: interval_ms <= 0 || start_ms >= end_ms,
        }
    }

    pub fn page_limit(&self) -> u32 {
        self.page_limit as u32
    }

    /// The next `(window_start, window_end)` to request, both inclusive.
    pub fn next_window(&self) -> Option<(i64, i64)> {
        if self.done {
            return None;
        }
        let window_end = (self.next_start_ms + self.interval_ms * self.page_limit - 1).min(self.end_ms);
        Some((self.next_start_ms, window_end))
    }

    /// Record the open time of the last bar in the page just received, or
    /// `None` for an empty page.
    pub fn advance(&mut self, last_open_ms: Option<i64>) {
        let Some(last) = last_open_ms else {
            self.done = true;
            return;
        };
        let next = last + self.interval_ms;
        if next <= self.next_start_ms {
            self.done = true;
            return;
        }
        self.next_start_ms = next;
        if next >= self.end_ms {
            self.done = true;
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

/// How an HTTP status from the secondary source is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Unauthorized,
    Retryable,
    Terminal,
}

pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=399 => StatusClass::Success,
        401 => StatusClass::Unauthorized,
        429 | 500..=599 => StatusClass::Retryable,
        _ => StatusClass::Terminal,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    pub base_delay: StdDuration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: StdDuration::from_millis(1500),
        }
    }
}

impl RetryPolicy {
    pub fn start(&self) -> RetryState {
        RetryState {
            policy: *self,
            retries_used: 0,
        }
    }

    /// Backoff before retry number `retry` (0-based): `base * 2^retry`.
    pub fn delay_for(&self, retry: u32) -> StdDuration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: StdDuration },
    GiveUp,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryState {
    policy: RetryPolicy,
    retries_used: u32,
}

impl RetryState {
    /// Attempt number of the request about to be (or just) sent, 1-based.
    pub fn attempt(&self) -> u32 {
        self.retries_used + 1
    }

    /// Called after a retryable failure.
    pub fn on_retryable_failure(&mut self) -> RetryDecision {
        if self.retries_used >= self.policy.max_retries {
            return RetryDecision::GiveUp;
        }
        let delay = self.policy.delay_for(self.retries_used);
        self.retries_used += 1;
        RetryDecision::Retry { delay }
    }
}
