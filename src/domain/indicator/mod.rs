//! Technical indicator implementations.
//!
//! Every indicator is a pure function of the bar series and is index-aligned
//! 1:1 with it. Points before enough history exists carry `None`, never a
//! coerced zero.
//!
//! - `IndicatorSeries`: single-column output (SMA, EMA, RSI)
//! - `MacdFrame` / `BollingerFrame`: fixed multi-column outputs
//! - `IndicatorType`: identity + parameters, parsed from names like `sma20`

pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;
mod stddev;

pub use bollinger::{BollingerFrame, calculate_bollinger};
pub use ema::calculate_ema;
pub use macd::{MacdFrame, calculate_macd};
pub use rsi::calculate_rsi;
pub use sma::calculate_sma;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::domain::error::SigtraderError;
use crate::domain::ohlcv::Bar;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorType {
    Sma(usize),
    Ema(usize),
    Rsi(usize),
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Bollinger {
        period: usize,
        n_std: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    pub(crate) fn from_values(
        indicator_type: IndicatorType,
        bars: &[Bar],
        values: Vec<Option<f64>>,
    ) -> Self {
        let values = bars
            .iter()
            .zip(values)
            .map(|(bar, value)| IndicatorPoint {
                timestamp: bar.timestamp,
                value,
            })
            .collect();
        Self {
            indicator_type,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value_at(&self, index: usize) -> Option<f64> {
        self.values.get(index).and_then(|p| p.value)
    }

    pub fn raw(&self) -> Vec<Option<f64>> {
        self.values.iter().map(|p| p.value).collect()
    }

    /// Column name used in tabular output.
    pub fn key(&self) -> String {
        self.indicator_type.key()
    }
}

/// Result of computing an indicator by type.
#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorOutput {
    Series(IndicatorSeries),
    Macd(MacdFrame),
    Bollinger(BollingerFrame),
}

impl IndicatorOutput {
    /// `(column_key, values)` pairs in output order.
    pub fn columns(&self) -> Vec<(String, Vec<Option<f64>>)> {
        match self {
            IndicatorOutput::Series(s) => vec![(s.key(), s.raw())],
            IndicatorOutput::Macd(m) => m
                .columns()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_vec()))
                .collect(),
            IndicatorOutput::Bollinger(b) => b
                .columns()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_vec()))
                .collect(),
        }
    }
}

impl IndicatorType {
    pub fn compute(&self, bars: &[Bar]) -> IndicatorOutput {
        match *self {
            IndicatorType::Sma(n) => IndicatorOutput::Series(calculate_sma(bars, n)),
            IndicatorType::Ema(n) => IndicatorOutput::Series(calculate_ema(bars, n)),
            IndicatorType::Rsi(n) => IndicatorOutput::Series(calculate_rsi(bars, n)),
            IndicatorType::Macd { fast, slow, signal } => {
                IndicatorOutput::Macd(calculate_macd(bars, fast, slow, signal))
            }
            IndicatorType::Bollinger { period, n_std } => {
                IndicatorOutput::Bollinger(calculate_bollinger(bars, period, n_std))
            }
        }
    }

    /// Lower-case column key, e.g. `sma20`, `rsi14`.
    pub fn key(&self) -> String {
        match self {
            IndicatorType::Sma(n) => format!("sma{n}"),
            IndicatorType::Ema(n) => format!("ema{n}"),
            IndicatorType::Rsi(n) => format!("rsi{n}"),
            IndicatorType::Macd { .. } => "macd".to_string(),
            IndicatorType::Bollinger { .. } => "bollinger".to_string(),
        }
    }
}

impl FromStr for IndicatorType {
    type Err = SigtraderError;

    /// Accepts `smaN`, `emaN`, `rsi`/`rsiN`, `macd`, `bollinger`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        let unknown = || SigtraderError::invalid_request(format!("unknown indicator '{s}'"));
        let window = |digits: &str| -> Result<usize, SigtraderError> {
            match digits.parse::<usize>() {
                Ok(n) if n > 0 => Ok(n),
                _ => Err(unknown()),
            }
        };

        match name.as_str() {
            "macd" => Ok(IndicatorType::Macd {
                fast: macd::DEFAULT_FAST,
                slow: macd::DEFAULT_SLOW,
                signal: macd::DEFAULT_SIGNAL,
            }),
            "bollinger" | "bb" => Ok(IndicatorType::Bollinger {
                period: bollinger::DEFAULT_PERIOD,
                n_std: bollinger::DEFAULT_N_STD,
            }),
            "rsi" => Ok(IndicatorType::Rsi(rsi::DEFAULT_PERIOD)),
            _ => {
                if let Some(d) = name.strip_prefix("sma") {
                    Ok(IndicatorType::Sma(window(d)?))
                } else if let Some(d) = name.strip_prefix("ema") {
                    Ok(IndicatorType::Ema(window(d)?))
                } else if let Some(d) = name.strip_prefix("rsi") {
                    Ok(IndicatorType::Rsi(window(d)?))
                } else {
                    Err(unknown())
                }
            }
        }
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::Ema(period) => write!(f, "EMA({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::Macd { fast, slow, signal } => {
                write!(f, "MACD({},{},{})", fast, slow, signal)
            }
            IndicatorType::Bollinger { period, n_std } => {
                write!(f, "BOLLINGER({},{})", period, n_std)
            }
        }
    }
}

/// Parse a comma-separated indicator list such as `sma20,rsi,macd`.
pub fn parse_indicator_list(list: &str) -> Result<Vec<IndicatorType>, SigtraderError> {
    let types = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect::<Result<Vec<IndicatorType>, _>>()?;
    if types.is_empty() {
        return Err(SigtraderError::invalid_request("no indicators requested"));
    }
    Ok(types)
}
