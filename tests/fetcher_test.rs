//! Fetch pipeline tests against a scripted HTTP port.
//!
//! All tests run on tokio's paused clock, so page delays and retry backoff
//! are observed without real waiting.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use common::*;
use sigtrader::adapters::binance::BinanceSource;
use sigtrader::adapters::coingecko::{ApiKey, CoinGeckoSource};
use sigtrader::adapters::ohlc_fetcher::OhlcFetcher;
use sigtrader::domain::cancel::CancelToken;
use sigtrader::domain::error::SigtraderError;
use sigtrader::domain::fetch::FetchRequest;
use sigtrader::ports::data_port::DataPort;

const KLINES: &str = "/klines";
const CHART: &str = "/market_chart";

fn hours(h: i64) -> chrono::Duration {
    chrono::Duration::hours(h)
}

fn fetcher_with(http: &Arc<MockHttp>, secondary: CoinGeckoSource) -> OhlcFetcher {
    let primary = BinanceSource::new(http.clone(), "http://binance.test")
        .with_paging(10, Duration::from_millis(120));
    OhlcFetcher::new(Arc::new(primary), Arc::new(secondary))
}

fn fetcher(http: &Arc<MockHttp>) -> OhlcFetcher {
    fetcher_with(http, CoinGeckoSource::new(http.clone(), "http://cg.test"))
}

fn request(symbol: &str, interval: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> FetchRequest {
    FetchRequest::new(symbol, interval, start, end, "usd").unwrap()
}

fn small_chart() -> String {
    market_chart(
        &[
            (t0() + hours(1), 100.0),
            (t0() + hours(1) + chrono::Duration::minutes(20), 104.0),
            (t0() + hours(1) + chrono::Duration::minutes(40), 98.0),
            (t0() + hours(2), 101.0),
        ],
        &[(t0() + hours(1), 5.0), (t0() + hours(1) + chrono::Duration::minutes(30), 7.0)],
    )
}

fn assert_gap(a: &Call, b: &Call, expected: Duration) {
    let gap = b.at - a.at;
    assert!(
        gap >= expected && gap < expected + Duration::from_millis(10),
        "gap {gap:?}, expected {expected:?}"
    );
}

mod primary {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn pages_until_end_with_courtesy_delay() {
        let http = Arc::new(
            MockHttp::new()
                .on(KLINES, ok(kline_page(t0(), hours(1), 10, 100.0)))
                .on(KLINES, ok(kline_page(t0() + hours(10), hours(1), 10, 110.0)))
                .on(KLINES, ok(kline_page(t0() + hours(20), hours(1), 5, 120.0))),
        );
        let series = fetcher(&http)
            .fetch_series(&request("bitcoin", "1h", t0(), t0() + hours(24)), &CancelToken::none())
            .await
            .unwrap();

        assert_eq!(series.len(), 25);
        assert_eq!(series.bars[0].timestamp, t0());
        assert_eq!(series.bars[24].timestamp, t0() + hours(24));
        assert!(series.bars.windows(2).all(|w| w[0].timestamp < w[1].timestamp));

        let calls = http.calls_to(KLINES);
        assert_eq!(calls.len(), 3);
        assert!(http.calls_to(CHART).is_empty());

        let first = &calls[0].request;
        assert_eq!(first.query_value("symbol"), Some("BTCUSDT"));
        assert_eq!(first.query_value("interval"), Some("1h"));
        assert_eq!(first.query_value("limit"), Some("10"));
        assert_eq!(first.query_value("startTime"), Some(ms(t0()).to_string().as_str()));
        assert_eq!(
            first.query_value("endTime"),
            Some((ms(t0() + hours(10)) - 1).to_string().as_str())
        );
        assert_eq!(
            calls[1].request.query_value("startTime"),
            Some(ms(t0() + hours(10)).to_string().as_str())
        );
        assert_eq!(
            calls[2].request.query_value("endTime"),
            Some(ms(t0() + hours(24)).to_string().as_str())
        );

        assert_gap(&calls[0], &calls[1], Duration::from_millis(120));
        assert_gap(&calls[1], &calls[2], Duration::from_millis(120));
    }

    #[tokio::test(start_paused = true)]
    async fn pair_symbols_pass_through() {
        let http = Arc::new(MockHttp::new().on(KLINES, ok(kline_page(t0(), hours(1), 3, 1.0))));
        let series = fetcher(&http)
            .fetch_series(&request("ETHBTC", "1h", t0(), t0() + hours(2)), &CancelToken::none())
            .await
            .unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(http.calls_to(KLINES)[0].request.query_value("symbol"), Some("ETHBTC"));
    }

    #[tokio::test(start_paused = true)]
    async fn client_error_falls_back_to_secondary() {
        let http = Arc::new(
            MockHttp::new()
                .on(KLINES, status(400, r#"{"code":-1121,"msg":"Invalid symbol."}"#))
                .on(CHART, ok(small_chart())),
        );
        let series = fetcher(&http)
            .fetch_series(&request("bitcoin", "1h", t0(), t0() + hours(48)), &CancelToken::none())
            .await
            .unwrap();

        assert_eq!(http.calls_to(KLINES).len(), 1);
        assert_eq!(http.calls_to(CHART).len(), 1);
        assert_eq!(series.len(), 2);

        let bar = &series.bars[0];
        assert_eq!(bar.timestamp, t0() + hours(1));
        assert_eq!((bar.open, bar.high, bar.low, bar.close), (100.0, 104.0, 98.0, 98.0));
        assert_eq!(bar.volume, 12.0);
        assert_eq!(series.bars[1].volume, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn connection_failure_falls_back_to_secondary() {
        let http = Arc::new(
            MockHttp::new()
                .on_transport_error(KLINES, "connection reset")
                .on(CHART, ok(small_chart())),
        );
        let series = fetcher(&http)
            .fetch_series(&request("bitcoin", "1h", t0(), t0() + hours(48)), &CancelToken::none())
            .await
            .unwrap();

        assert_eq!(http.calls_to(KLINES).len(), 1);
        assert_eq!(http.calls_to(CHART).len(), 1);
        assert_eq!(series.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn server_error_propagates_without_fallback() {
        let http = Arc::new(
            MockHttp::new()
                .on(KLINES, status(502, "bad gateway"))
                .on(CHART, ok(small_chart())),
        );
        let err = fetcher(&http)
            .fetch_series(&request("bitcoin", "1h", t0(), t0() + hours(5)), &CancelToken::none())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(502));
        assert!(http.calls_to(CHART).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_interval_skips_primary() {
        let http = Arc::new(MockHttp::new().on(CHART, ok(small_chart())));
        let series = fetcher(&http)
            .fetch_series(&request("bitcoin", "2d", t0(), t0() + hours(48)), &CancelToken::none())
            .await
            .unwrap();
        assert!(http.calls_to(KLINES).is_empty());
        assert!(!series.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_primary_page_falls_back() {
        let http = Arc::new(MockHttp::new().on(KLINES, ok("[]")).on(CHART, ok(small_chart())));
        let series = fetcher(&http)
            .fetch_series(&request("bitcoin", "1h", t0(), t0() + hours(48)), &CancelToken::none())
            .await
            .unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(http.calls_to(KLINES).len(), 1);
    }
}

mod secondary {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn range_is_clamped_from_end() {
        let end = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let start = end - chrono::Duration::days(800);
        let day = chrono::Duration::days(1);
        let http = Arc::new(MockHttp::new().on(
            CHART,
            ok(market_chart(
                &[
                    (end - chrono::Duration::days(400), 1.0),
                    (end - day * 2, 10.0),
                    (end - day * 2 + hours(12), 12.0),
                    (end - day, 11.0),
                ],
                &[],
            )),
        ));
        let req = FetchRequest::new("some-coin", "1d", start, end, "USDT").unwrap();
        let series = fetcher(&http).fetch_series(&req, &CancelToken::none()).await.unwrap();

        let calls = http.calls_to(CHART);
        assert_eq!(calls.len(), 1);
        let sent = &calls[0].request;
        assert!(sent.url.ends_with("/api/v3/coins/some-coin/market_chart/range"));
        let clamped_start = end - chrono::Duration::days(365);
        assert_eq!(sent.query_value("from"), Some(clamped_start.timestamp().to_string().as_str()));
        assert_eq!(sent.query_value("to"), Some(end.timestamp().to_string().as_str()));
        assert_eq!(sent.query_value("vs_currency"), Some("usd"));

        // Daily buckets; the point before the clamped start is dropped.
        assert_eq!(series.len(), 2);
        assert_eq!(series.bars[0].timestamp, end - day * 2);
        assert_eq!(series.bars[0].close, 12.0);
        assert!(series.bars.iter().all(|b| b.timestamp >= clamped_start));
    }

    #[tokio::test(start_paused = true)]
    async fn three_rate_limits_then_success() {
        let http = Arc::new(
            MockHttp::new()
                .on(CHART, status(429, r#"{"status":{"error_code":429,"error_message":"Throttled"}}"#))
                .on(CHART, status(429, ""))
                .on(CHART, status(429, ""))
                .on(CHART, ok(small_chart()).with_header("x-ratelimit-remaining", "0")),
        );
        let series = fetcher(&http)
            .fetch_series(&request("some-coin", "1h", t0(), t0() + hours(48)), &CancelToken::none())
            .await
            .unwrap();
        assert_eq!(series.len(), 2);

        let calls = http.calls_to(CHART);
        assert_eq!(calls.len(), 4);
        assert_gap(&calls[0], &calls[1], Duration::from_millis(1500));
        assert_gap(&calls[1], &calls[2], Duration::from_millis(3000));
        assert_gap(&calls[2], &calls[3], Duration::from_millis(6000));
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_exhaust_retries() {
        let http = Arc::new(MockHttp::new().on(CHART, status(503, "Service Unavailable")));
        let err = fetcher(&http)
            .fetch_series(&request("some-coin", "1h", t0(), t0() + hours(48)), &CancelToken::none())
            .await
            .unwrap_err();
        match err {
            SigtraderError::Upstream { status, message, .. } => {
                assert_eq!(status, Some(503));
                assert_eq!(message, "Service Unavailable");
            }
            other => panic!("expected Upstream, got {other:?}"),
        }
        assert_eq!(http.calls_to(CHART).len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_is_immediate_and_names_header() {
        let http = Arc::new(MockHttp::new().on(
            CHART,
            status(401, r#"{"error":{"status":{"error_code":10002,"error_message":"Invalid API key"}}}"#),
        ));
        let secondary = CoinGeckoSource::new(http.clone(), "http://cg.test").with_api_key(Some(ApiKey {
            key: "CG-secret-1234".into(),
            header: None,
            query_param: Some("x_cg_demo_api_key".into()),
        }));
        let err = fetcher_with(&http, secondary)
            .fetch_series(&request("some-coin", "1h", t0(), t0() + hours(48)), &CancelToken::none())
            .await
            .unwrap_err();

        match &err {
            SigtraderError::Unauthorized { status, message, .. } => {
                assert_eq!(*status, 401);
                assert!(message.contains("Invalid API key"));
                assert!(message.contains("x-cg-demo-api-key"));
                assert!(!message.contains("CG-secret-1234"));
            }
            other => panic!("expected Unauthorized, got {other:?}"),
        }
        let calls = http.calls_to(CHART);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].request.header_value("x-cg-demo-api-key"), Some("CG-secret-1234"));
        assert_eq!(calls[0].request.query_value("x_cg_demo_api_key"), Some("CG-secret-1234"));
    }

    #[tokio::test(start_paused = true)]
    async fn pro_base_url_uses_pro_header() {
        let http = Arc::new(MockHttp::new().on(CHART, ok(small_chart())));
        let secondary = CoinGeckoSource::new(http.clone(), "https://pro-api.coingecko.test")
            .with_api_key(Some(ApiKey::new("pro-key-9999")));
        assert_eq!(secondary.key_header(), "x-cg-pro-api-key");
        fetcher_with(&http, secondary)
            .fetch_series(&request("some-coin", "1h", t0(), t0() + hours(48)), &CancelToken::none())
            .await
            .unwrap();
        let sent = &http.calls_to(CHART)[0].request;
        assert_eq!(sent.header_value("x-cg-pro-api-key"), Some("pro-key-9999"));
        assert_eq!(sent.query_value("x_cg_pro_api_key"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn other_client_errors_are_terminal() {
        let http = Arc::new(MockHttp::new().on(CHART, status(404, r#"{"error":"coin not found"}"#)));
        let err = fetcher(&http)
            .fetch_series(&request("some-coin", "1h", t0(), t0() + hours(48)), &CancelToken::none())
            .await
            .unwrap_err();
        match err {
            SigtraderError::Upstream { status, message, .. } => {
                assert_eq!(status, Some(404));
                assert_eq!(message, "coin not found");
            }
            other => panic!("expected Upstream, got {other:?}"),
        }
        assert_eq!(http.calls_to(CHART).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_surfaces() {
        let http = Arc::new(MockHttp::new().on_transport_error(CHART, "connection refused"));
        let err = fetcher(&http)
            .fetch_series(&request("some-coin", "1h", t0(), t0() + hours(48)), &CancelToken::none())
            .await
            .unwrap_err();
        assert!(matches!(err, SigtraderError::Transport { source_name: "coingecko", .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_body_is_format_error() {
        let http = Arc::new(MockHttp::new().on(CHART, ok("<html>maintenance</html>")));
        let err = fetcher(&http)
            .fetch_series(&request("some-coin", "1h", t0(), t0() + hours(48)), &CancelToken::none())
            .await
            .unwrap_err();
        assert!(matches!(err, SigtraderError::ResponseFormat { .. }));
    }
}

mod outcomes {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn both_sources_empty_is_no_data() {
        let http = Arc::new(
            MockHttp::new()
                .on(KLINES, ok("[]"))
                .on(CHART, ok(r#"{"prices":[],"total_volumes":[]}"#)),
        );
        let err = fetcher(&http)
            .fetch_series(&request("bitcoin", "1h", t0(), t0() + hours(48)), &CancelToken::none())
            .await
            .unwrap_err();
        match err {
            SigtraderError::NoData { symbol, interval } => {
                assert_eq!(symbol, "bitcoin");
                assert_eq!(interval, "1h");
            }
            other => panic!("expected NoData, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_backoff() {
        let http = Arc::new(MockHttp::new().on(CHART, status(429, "")));
        let (handle, token) = CancelToken::channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            handle.cancel();
        });
        let err = fetcher(&http)
            .fetch_series(&request("some-coin", "1h", t0(), t0() + hours(48)), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, SigtraderError::Cancelled));
        // First attempt plus the retry at 1.5s; cancelled while waiting 3s.
        assert_eq!(http.calls_to(CHART).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_stops_retries() {
        let http = Arc::new(MockHttp::new().on(CHART, status(500, "")));
        let token = CancelToken::none().with_timeout(Duration::from_secs(2));
        let err = fetcher(&http)
            .fetch_series(&request("some-coin", "1h", t0(), t0() + hours(48)), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, SigtraderError::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_contract_rejects_bad_interval() {
        let http = Arc::new(MockHttp::new());
        let err = fetcher(&http)
            .fetch("bitcoin", "90s", t0(), t0() + hours(1), "usd", &CancelToken::none())
            .await
            .unwrap_err();
        assert!(matches!(err, SigtraderError::InvalidRequest { .. }));
        assert!(http.calls().is_empty());
    }
}
