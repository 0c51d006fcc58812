//! Secondary source: CoinGecko market-chart range, resampled into OHLC
//! buckets, with API-key auth and retry on throttling/server errors.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::cancel::CancelToken;
use crate::domain::error::SigtraderError;
use crate::domain::fetch::{
    FetchRequest, Granularity, RetryDecision, RetryPolicy, StatusClass, classify_status,
    clamp_range, normalize_vs_currency, resample,
};
use crate::domain::ohlcv::Series;
use crate::ports::data_port::DataPort;
use crate::ports::http_port::{HttpPort, HttpRequest, HttpResponse};

pub const SOURCE: &str = "coingecko";
pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com";
pub const DEFAULT_MAX_LOOKBACK_DAYS: i64 = 365;

const PRO_HEADER: &str = "x-cg-pro-api-key";
const DEMO_HEADER: &str = "x-cg-demo-api-key";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiKey {
    pub key: String,
    /// Header name override; inferred from the base URL when unset.
    pub header: Option<String>,
    /// Also send the key as this query parameter.
    pub query_param: Option<String>,
}

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// Last four characters only.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.key.chars().collect();
        if chars.len() < 4 {
            return "(short)".to_string();
        }
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("...{tail}")
    }
}

pub struct CoinGeckoSource {
    http: Arc<dyn HttpPort>,
    base_url: String,
    api_key: Option<ApiKey>,
    max_lookback_days: i64,
    retry: RetryPolicy,
}

#[derive(Debug, Default, Deserialize)]
struct MarketChart {
    #[serde(default)]
    prices: Vec<(f64, Option<f64>)>,
    #[serde(default)]
    total_volumes: Vec<(f64, Option<f64>)>,
}

fn points(raw: &[(f64, Option<f64>)]) -> Vec<(i64, f64)> {
    raw.iter()
        .filter_map(|&(ts, v)| v.map(|v| (ts as i64, v)))
        .collect()
}

/// Pull a readable message out of an error body, falling back to raw text.
pub fn extract_error_message(body: &str) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|json| {
        json.pointer("/error/status/error_message")
            .or_else(|| json.pointer("/status/error_message"))
            .or_else(|| json.get("error").filter(|v| v.is_string()))
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    match from_json {
        Some(message) => message,
        None if body.trim().is_empty() => "empty response body".to_string(),
        None => body.trim().chars().take(200).collect(),
    }
}

impl CoinGeckoSource {
    pub fn new(http: Arc<dyn HttpPort>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: None,
            max_lookback_days: DEFAULT_MAX_LOOKBACK_DAYS,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<ApiKey>) -> Self {
        self.api_key = api_key.filter(|k| !k.key.is_empty());
        self
    }

    pub fn with_max_lookback_days(mut self, days: i64) -> Self {
        self.max_lookback_days = days.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Header the API key is sent under.
    pub fn key_header(&self) -> String {
        if let Some(header) = self.api_key.as_ref().and_then(|k| k.header.clone()) {
            return header;
        }
        if self.base_url.contains("pro-api") {
            PRO_HEADER.to_string()
        } else {
            DEMO_HEADER.to_string()
        }
    }

    pub fn log_startup(&self) {
        info!(
            base = %self.base_url,
            header = %self.key_header(),
            param = ?self.api_key.as_ref().and_then(|k| k.query_param.as_deref()),
            key = %self.api_key.as_ref().map_or_else(|| "(none)".to_string(), ApiKey::masked),
            "coingecko source configured"
        );
    }

    fn authorize(&self, mut request: HttpRequest) -> HttpRequest {
        if let Some(api_key) = &self.api_key {
            request = request.header(&self.key_header(), &api_key.key);
            if let Some(param) = &api_key.query_param {
                request = request.query(param, &api_key.key);
            }
        }
        request
    }

    fn upstream(status: u16, response: &HttpResponse) -> SigtraderError {
        SigtraderError::Upstream {
            source_name: SOURCE,
            status: Some(status),
            message: extract_error_message(&response.body),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        request: HttpRequest,
        cancel: &CancelToken,
    ) -> Result<T, SigtraderError> {
        let request = self.authorize(request);
        let masked = self
            .api_key
            .as_ref()
            .map_or_else(|| "(none)".to_string(), ApiKey::masked);
        let mut retry = self.retry.start();

        loop {
            let response = cancel
                .run(self.http.get(&request))
                .await?
                .map_err(|e| SigtraderError::Transport {
                    source_name: SOURCE,
                    reason: e.reason,
                })?;

            if let Some(remaining) = response.header("x-ratelimit-remaining") {
                debug!(
                    path,
                    remaining,
                    reset = response.header("x-ratelimit-reset").unwrap_or("-"),
                    key = %masked,
                    "rate limit"
                );
            }

            let status = response.status;
            match classify_status(status) {
                StatusClass::Success => {
                    return serde_json::from_str(&response.body).map_err(|e| {
                        SigtraderError::ResponseFormat {
                            source_name: SOURCE,
                            reason: format!("{path}: {e}"),
                        }
                    });
                }
                StatusClass::Unauthorized => {
                    return Err(SigtraderError::Unauthorized {
                        source_name: SOURCE,
                        status,
                        message: format!(
                            "{}; check the API key (sent as '{}')",
                            extract_error_message(&response.body),
                            self.key_header()
                        ),
                    });
                }
                StatusClass::Terminal => return Err(Self::upstream(status, &response)),
                StatusClass::Retryable => match retry.on_retryable_failure() {
                    RetryDecision::Retry { delay } => {
                        warn!(
                            path,
                            status,
                            attempt = retry.attempt(),
                            delay_ms = delay.as_millis() as u64,
                            message = %extract_error_message(&response.body),
                            "retrying"
                        );
                        cancel.sleep(delay).await?;
                    }
                    RetryDecision::GiveUp => return Err(Self::upstream(status, &response)),
                },
            }
        }
    }
}

#[async_trait]
impl DataPort for CoinGeckoSource {
    async fn fetch_series(
        &self,
        request: &FetchRequest,
        cancel: &CancelToken,
    ) -> Result<Series, SigtraderError> {
        let (start, end) = clamp_range(request.start, request.end, self.max_lookback_days);
        let granularity = Granularity::for_span(start, end);
        let coin_id = request.symbol.trim().to_lowercase();
        let path = format!("/coins/{coin_id}/market_chart/range");
        let url = format!("{}/api/v3{path}", self.base_url.trim_end_matches('/'));

        debug!(
            coin = %coin_id,
            start = %start,
            end = %end,
            granularity = granularity.as_str(),
            "coingecko range"
        );

        let http_request = HttpRequest::get(url)
            .query("vs_currency", normalize_vs_currency(&request.quote_currency))
            .query("from", start.timestamp())
            .query("to", end.timestamp());
        let chart: MarketChart = self.get_json(&path, http_request, cancel).await?;

        let bars = resample(
            &points(&chart.prices),
            &points(&chart.total_volumes),
            granularity,
        );
        Ok(Series::new(&request.symbol, request.interval.to_string(), bars).filtered(start, end))
    }
}
