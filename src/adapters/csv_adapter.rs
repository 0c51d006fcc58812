//! CSV bar source and CSV writers for bars, indicators, trades and equity.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

use crate::domain::backtest::EquityPoint;
use crate::domain::cancel::CancelToken;
use crate::domain::config_validation::parse_date_time;
use crate::domain::error::SigtraderError;
use crate::domain::fetch::FetchRequest;
use crate::domain::indicator::IndicatorOutput;
use crate::domain::ohlcv::{Bar, Series};
use crate::domain::position::Trade;
use crate::ports::data_port::DataPort;

/// Reads `{symbol}_{interval}.csv` files from a directory.
pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str, interval: &str) -> PathBuf {
        self.base_path.join(format!("{symbol}_{interval}.csv"))
    }
}

#[async_trait]
impl DataPort for CsvAdapter {
    async fn fetch_series(
        &self,
        request: &FetchRequest,
        cancel: &CancelToken,
    ) -> Result<Series, SigtraderError> {
        cancel.check()?;
        let interval = request.interval.to_string();
        let path = self.csv_path(&request.symbol, &interval);
        let series = read_series(&path, &request.symbol, &interval)?;
        Ok(series.filtered(request.start, request.end))
    }
}

/// Accepts the config date formats plus epoch milliseconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    parse_date_time(raw).or_else(|| {
        raw.trim()
            .parse::<i64>()
            .ok()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    })
}

fn csv_err(line: usize, reason: impl std::fmt::Display) -> SigtraderError {
    SigtraderError::Csv {
        reason: format!("line {line}: {reason}"),
    }
}

/// Parse `timestamp,open,high,low,close,volume` rows into a sorted series.
pub fn parse_series<R: std::io::Read>(
    reader: R,
    symbol: &str,
    interval: &str,
) -> Result<Series, SigtraderError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut bars = Vec::new();

    for (i, result) in rdr.records().enumerate() {
        let line = i + 2;
        let record = result?;
        let raw_ts = record.get(0).ok_or_else(|| csv_err(line, "missing timestamp"))?;
        let timestamp =
            parse_timestamp(raw_ts).ok_or_else(|| csv_err(line, format!("bad timestamp '{raw_ts}'")))?;

        let field = |idx: usize, name: &str| -> Result<f64, SigtraderError> {
            record
                .get(idx)
                .ok_or_else(|| csv_err(line, format!("missing {name} column")))?
                .parse()
                .map_err(|e| csv_err(line, format!("invalid {name} value: {e}")))
        };
        // Volume is optional in hand-made files.
        let volume = match record.get(5).filter(|v| !v.is_empty()) {
            Some(_) => field(5, "volume")?,
            None => 0.0,
        };

        let bar = Bar {
            timestamp,
            open: field(1, "open")?,
            high: field(2, "high")?,
            low: field(3, "low")?,
            close: field(4, "close")?,
            volume,
        };
        if !bar.is_well_formed() {
            return Err(csv_err(line, "prices and volume must be finite and non-negative"));
        }
        bars.push(bar);
    }

    Ok(Series::new(symbol, interval, bars).normalized())
}

pub fn read_series(path: &Path, symbol: &str, interval: &str) -> Result<Series, SigtraderError> {
    let file = fs::File::open(path).map_err(|e| SigtraderError::Csv {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;
    parse_series(file, symbol, interval)
}

fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

pub fn write_bars<W: Write>(writer: W, bars: &[Bar]) -> Result<(), SigtraderError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["timestamp", "open", "high", "low", "close", "volume"])?;
    for bar in bars {
        wtr.write_record([
            fmt_ts(&bar.timestamp),
            bar.open.to_string(),
            bar.high.to_string(),
            bar.low.to_string(),
            bar.close.to_string(),
            bar.volume.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// One row per bar: timestamp, close, then every indicator column.
/// Undefined values are written as empty fields.
pub fn write_indicators<W: Write>(
    writer: W,
    bars: &[Bar],
    outputs: &[IndicatorOutput],
) -> Result<(), SigtraderError> {
    let columns: Vec<(String, Vec<Option<f64>>)> =
        outputs.iter().flat_map(IndicatorOutput::columns).collect();
    if let Some((key, values)) = columns.iter().find(|(_, v)| v.len() != bars.len()) {
        return Err(SigtraderError::Csv {
            reason: format!("column {key} has {} values for {} bars", values.len(), bars.len()),
        });
    }

    let mut wtr = csv::Writer::from_writer(writer);
    let mut header = vec!["timestamp".to_string(), "close".to_string()];
    header.extend(columns.iter().map(|(k, _)| k.clone()));
    wtr.write_record(&header)?;

    for (i, bar) in bars.iter().enumerate() {
        let mut row = vec![fmt_ts(&bar.timestamp), bar.close.to_string()];
        row.extend(columns.iter().map(|(_, v)| fmt_opt(v[i])));
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_trades<W: Write>(writer: W, trades: &[Trade]) -> Result<(), SigtraderError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for trade in trades {
        wtr.serialize(trade)?;
    }
    if trades.is_empty() {
        wtr.write_record(["entry_time", "exit_time", "entry_price", "exit_price", "profit_pct"])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_equity<W: Write>(writer: W, curve: &[EquityPoint]) -> Result<(), SigtraderError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for point in curve {
        wtr.serialize(point)?;
    }
    if curve.is_empty() {
        wtr.write_record(["timestamp", "equity", "bar_return", "in_position"])?;
    }
    wtr.flush()?;
    Ok(())
}
