#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use sigtrader::domain::ohlcv::Bar;
use sigtrader::domain::signal::SignalSeries;
use sigtrader::ports::http_port::{HttpPort, HttpRequest, HttpResponse, TransportError};
use tokio::time::Instant;

/// A recorded call: when it was made (tokio clock) and what was sent.
#[derive(Debug, Clone)]
pub struct Call {
    pub at: Instant,
    pub request: HttpRequest,
}

/// Scripted HTTP port. Responses are routed by URL substring and served in
/// order; once a route's script runs out its last response repeats.
#[derive(Default)]
pub struct MockHttp {
    routes: Mutex<Vec<(String, Vec<Result<HttpResponse, TransportError>>, usize)>>,
    calls: Mutex<Vec<Call>>,
}

impl MockHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, url_part: &str, response: HttpResponse) -> Self {
        self.push(url_part, Ok(response));
        self
    }

    pub fn on_transport_error(self, url_part: &str, reason: &str) -> Self {
        self.push(
            url_part,
            Err(TransportError {
                reason: reason.to_string(),
            }),
        );
        self
    }

    fn push(&self, url_part: &str, response: Result<HttpResponse, TransportError>) {
        let mut routes = self.routes.lock().unwrap();
        match routes.iter_mut().find(|(part, _, _)| part == url_part) {
            Some((_, script, _)) => script.push(response),
            None => routes.push((url_part.to_string(), vec![response], 0)),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, url_part: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.request.url.contains(url_part))
            .collect()
    }
}

#[async_trait]
impl HttpPort for MockHttp {
    async fn get(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.calls.lock().unwrap().push(Call {
            at: Instant::now(),
            request: request.clone(),
        });
        let mut routes = self.routes.lock().unwrap();
        let Some((_, script, next)) = routes
            .iter_mut()
            .find(|(part, _, _)| request.url.contains(part.as_str()))
        else {
            return Err(TransportError {
                reason: format!("no scripted route for {}", request.url),
            });
        };
        let index = (*next).min(script.len() - 1);
        *next += 1;
        script[index].clone()
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn ms(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// One kline row per step starting at `start`, closes rising by 1.
pub fn kline_page(start: DateTime<Utc>, step: Duration, n: usize, base: f64) -> String {
    let rows: Vec<String> = (0..n)
        .map(|i| {
            let open_time = start + step * i as i32;
            let close = base + i as f64;
            format!(
                "[{},\"{}\",\"{}\",\"{}\",\"{}\",\"10.0\",{},\"0\",1,\"0\",\"0\",\"0\"]",
                ms(open_time),
                close - 0.5,
                close + 1.0,
                close - 1.0,
                close,
                ms(open_time + step) - 1
            )
        })
        .collect();
    format!("[{}]", rows.join(","))
}

/// Market chart body from `(time, price)` and `(time, volume)` points.
pub fn market_chart(prices: &[(DateTime<Utc>, f64)], volumes: &[(DateTime<Utc>, f64)]) -> String {
    let encode = |points: &[(DateTime<Utc>, f64)]| {
        points
            .iter()
            .map(|(ts, v)| format!("[{},{}]", ms(*ts), v))
            .collect::<Vec<_>>()
            .join(",")
    };
    format!(
        "{{\"prices\":[{}],\"market_caps\":[],\"total_volumes\":[{}]}}",
        encode(prices),
        encode(volumes)
    )
}

pub fn ok(body: impl Into<String>) -> HttpResponse {
    HttpResponse::new(200, body)
}

pub fn status(code: u16, body: &str) -> HttpResponse {
    HttpResponse::new(code, body)
}

pub fn make_bars(start: DateTime<Utc>, step: Duration, closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            timestamp: start + step * i as i32,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 100.0,
        })
        .collect()
}

/// Smooth oscillating closes that produce regular crossovers.
pub fn wave_closes(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 100.0 + 15.0 * (i as f64 / 8.0).sin() + i as f64 * 0.05)
        .collect()
}

pub fn signal_for(bars: &[Bar], values: &[i8]) -> SignalSeries {
    SignalSeries::new(bars.iter().map(|b| b.timestamp).collect(), values.to_vec()).unwrap()
}

pub fn bars_csv(bars: &[Bar]) -> String {
    let mut out = String::from("timestamp,open,high,low,close,volume\n");
    for b in bars {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            b.timestamp.to_rfc3339(),
            b.open,
            b.high,
            b.low,
            b.close,
            b.volume
        ));
    }
    out
}
