//! Primary source: paged kline downloads from a Binance-compatible REST API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::debug;

use crate::domain::cancel::CancelToken;
use crate::domain::error::SigtraderError;
use crate::domain::fetch::{FetchRequest, PageCursor, to_pair_symbol};
use crate::domain::ohlcv::{Bar, Series};
use crate::ports::data_port::DataPort;
use crate::ports::http_port::{HttpPort, HttpRequest};

pub const SOURCE: &str = "binance";
pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";
pub const DEFAULT_PAGE_LIMIT: u32 = 1000;
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_millis(120);

pub struct BinanceSource {
    http: Arc<dyn HttpPort>,
    base_url: String,
    page_limit: u32,
    page_delay: Duration,
}

impl BinanceSource {
    pub fn new(http: Arc<dyn HttpPort>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            page_limit: DEFAULT_PAGE_LIMIT,
            page_delay: DEFAULT_PAGE_DELAY,
        }
    }

    pub fn with_paging(mut self, page_limit: u32, page_delay: Duration) -> Self {
        self.page_limit = page_limit.max(1);
        self.page_delay = page_delay;
        self
    }

    fn klines_url(&self) -> String {
        format!("{}/api/v3/klines", self.base_url.trim_end_matches('/'))
    }
}

fn unavailable(reason: impl Into<String>) -> SigtraderError {
    SigtraderError::UpstreamUnavailable {
        source_name: SOURCE,
        reason: reason.into(),
    }
}

fn format_err(reason: impl Into<String>) -> SigtraderError {
    SigtraderError::ResponseFormat {
        source_name: SOURCE,
        reason: reason.into(),
    }
}

/// Prices arrive as decimal strings; accept bare numbers too.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn open_time(value: &Value) -> Option<DateTime<Utc>> {
    let ms = value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))?;
    Utc.timestamp_millis_opt(ms).single()
}

/// Decode one page of kline rows:
/// `[open_time, open, high, low, close, volume, close_time, ...]`.
pub fn parse_klines(body: &str) -> Result<Vec<Bar>, SigtraderError> {
    let rows: Vec<Vec<Value>> =
        serde_json::from_str(body).map_err(|e| format_err(format!("kline payload: {e}")))?;

    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            if row.len() < 6 {
                return Err(format_err(format!("kline row {i} has {} fields", row.len())));
            }
            let field = |k: usize, name: &str| {
                number(&row[k]).ok_or_else(|| format_err(format!("kline row {i}: bad {name}")))
            };
            let bar = Bar {
                timestamp: open_time(&row[0])
                    .ok_or_else(|| format_err(format!("kline row {i}: bad open time")))?,
                open: field(1, "open")?,
                high: field(2, "high")?,
                low: field(3, "low")?,
                close: field(4, "close")?,
                volume: field(5, "volume")?,
            };
            if !bar.is_well_formed() {
                return Err(format_err(format!("kline row {i}: negative or non-finite value")));
            }
            Ok(bar)
        })
        .collect()
}

#[async_trait]
impl DataPort for BinanceSource {
    async fn fetch_series(
        &self,
        request: &FetchRequest,
        cancel: &CancelToken,
    ) -> Result<Series, SigtraderError> {
        let pair = to_pair_symbol(&request.symbol, &request.quote_currency)
            .ok_or_else(|| unavailable(format!("no trading pair for '{}'", request.symbol)))?;
        let interval = request
            .interval
            .primary_notation()
            .ok_or_else(|| unavailable(format!("interval {} not served", request.interval)))?;

        let url = self.klines_url();
        let mut cursor = PageCursor::new(
            request.start.timestamp_millis(),
            request.end.timestamp_millis(),
            request.interval.millis(),
            self.page_limit,
        );
        let mut bars = Vec::new();
        let mut pages = 0usize;

        while let Some((window_start, window_end)) = cursor.next_window() {
            if pages > 0 {
                cancel.sleep(self.page_delay).await?;
            }
            let page_request = HttpRequest::get(&url)
                .query("symbol", &pair)
                .query("interval", &interval)
                .query("startTime", window_start)
                .query("endTime", window_end)
                .query("limit", cursor.page_limit());

            // A connection failure here leaves the secondary source to try.
            let response = cancel
                .run(self.http.get(&page_request))
                .await?
                .map_err(|e| unavailable(format!("transport failure: {}", e.reason)))?;

            match response.status {
                200..=299 => {}
                400..=499 => {
                    return Err(unavailable(format!(
                        "HTTP {} for {pair} {interval}",
                        response.status
                    )));
                }
                status => {
                    return Err(SigtraderError::Upstream {
                        source_name: SOURCE,
                        status: Some(status),
                        message: response.body.chars().take(200).collect(),
                    });
                }
            }

            let page = parse_klines(&response.body)?;
            pages += 1;
            debug!(pair = %pair, page = pages, rows = page.len(), "kline page");
            cursor.advance(page.last().map(|b| b.timestamp.timestamp_millis()));
            bars.extend(page);
        }

        Ok(Series::new(&request.symbol, request.interval.to_string(), bars)
            .normalized()
            .filtered(request.start, request.end))
    }
}
