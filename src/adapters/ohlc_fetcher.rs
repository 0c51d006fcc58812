//! Primary-then-fallback OHLC fetcher.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::adapters::binance::{self, BinanceSource};
use crate::adapters::coingecko::{self, ApiKey, CoinGeckoSource};
use crate::domain::cancel::CancelToken;
use crate::domain::error::SigtraderError;
use crate::domain::fetch::{FetchRequest, RetryPolicy};
use crate::domain::ohlcv::Series;
use crate::ports::data_port::DataPort;
use crate::ports::http_port::HttpPort;

/// Settings for both upstream sources, normally read from `[fetcher]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FetcherConfig {
    pub binance_base_url: String,
    pub coingecko_base_url: String,
    pub coingecko_api_key: Option<ApiKey>,
    pub max_lookback_days: i64,
    pub retry: RetryPolicy,
    pub page_limit: u32,
    pub page_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            binance_base_url: binance::DEFAULT_BASE_URL.to_string(),
            coingecko_base_url: coingecko::DEFAULT_BASE_URL.to_string(),
            coingecko_api_key: None,
            max_lookback_days: coingecko::DEFAULT_MAX_LOOKBACK_DAYS,
            retry: RetryPolicy::default(),
            page_limit: binance::DEFAULT_PAGE_LIMIT,
            page_delay: binance::DEFAULT_PAGE_DELAY,
            request_timeout: Duration::from_secs(30),
        }
    }
}

pub struct OhlcFetcher {
    primary: Arc<dyn DataPort>,
    secondary: Arc<dyn DataPort>,
}

impl OhlcFetcher {
    pub fn new(primary: Arc<dyn DataPort>, secondary: Arc<dyn DataPort>) -> Self {
        Self { primary, secondary }
    }

    /// Wire the Binance primary and CoinGecko fallback over one HTTP port.
    pub fn from_config(config: &FetcherConfig, http: Arc<dyn HttpPort>) -> Self {
        let primary = BinanceSource::new(Arc::clone(&http), &config.binance_base_url)
            .with_paging(config.page_limit, config.page_delay);
        let secondary = CoinGeckoSource::new(http, &config.coingecko_base_url)
            .with_api_key(config.coingecko_api_key.clone())
            .with_max_lookback_days(config.max_lookback_days)
            .with_retry(config.retry);
        secondary.log_startup();
        Self::new(Arc::new(primary), Arc::new(secondary))
    }

    pub async fn fetch(
        &self,
        symbol: &str,
        interval: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        quote_currency: &str,
        cancel: &CancelToken,
    ) -> Result<Series, SigtraderError> {
        let request = FetchRequest::new(symbol, interval, start, end, quote_currency)?;
        self.fetch_series(&request, cancel).await
    }
}

#[async_trait]
impl DataPort for OhlcFetcher {
    async fn fetch_series(
        &self,
        request: &FetchRequest,
        cancel: &CancelToken,
    ) -> Result<Series, SigtraderError> {
        cancel.check()?;

        match self.primary.fetch_series(request, cancel).await {
            Ok(series) if !series.is_empty() => {
                info!(
                    symbol = %request.symbol,
                    interval = %request.interval,
                    bars = series.len(),
                    "fetched from primary"
                );
                return Ok(series);
            }
            Ok(_) => debug!(symbol = %request.symbol, "primary returned no bars, falling back"),
            Err(SigtraderError::UpstreamUnavailable {
                source_name,
                reason,
            }) => debug!(symbol = %request.symbol, source_name, %reason, "falling back"),
            Err(e) => return Err(e),
        }

        let series = self.secondary.fetch_series(request, cancel).await?;
        if series.is_empty() {
            return Err(SigtraderError::NoData {
                symbol: request.symbol.clone(),
                interval: request.interval.to_string(),
            });
        }
        info!(
            symbol = %request.symbol,
            interval = %request.interval,
            bars = series.len(),
            "fetched from fallback"
        );
        Ok(series)
    }
}
