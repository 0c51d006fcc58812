//! MACD (Moving Average Convergence Divergence).
//!
//! macd = EMA(fast) - EMA(slow)
//! macd_signal = EMA(signal) of macd, seeded once `signal` macd values exist
//! macd_diff = macd - macd_signal
//!
//! Each column is defined independently: macd from index max(fast, slow)-1,
//! signal and diff `signal - 1` points later.

use chrono::{DateTime, Utc};

use crate::domain::indicator::ema::ema_values;
use crate::domain::ohlcv::Bar;

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

#[derive(Debug, Clone, PartialEq)]
pub struct MacdFrame {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
    pub timestamps: Vec<DateTime<Utc>>,
    pub macd: Vec<Option<f64>>,
    pub macd_signal: Vec<Option<f64>>,
    pub macd_diff: Vec<Option<f64>>,
}

impl MacdFrame {
    pub fn columns(&self) -> [(&'static str, &[Option<f64>]); 3] {
        [
            ("macd", self.macd.as_slice()),
            ("macd_signal", self.macd_signal.as_slice()),
            ("macd_diff", self.macd_diff.as_slice()),
        ]
    }
}

pub fn calculate_macd(bars: &[Bar], fast: usize, slow: usize, signal: usize) -> MacdFrame {
    let closes: Vec<Option<f64>> = bars.iter().map(|b| Some(b.close)).collect();
    let ema_fast = ema_values(&closes, fast);
    let ema_slow = ema_values(&closes, slow);

    let macd: Vec<Option<f64>> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();
    let macd_signal = ema_values(&macd, signal);
    let macd_diff = macd
        .iter()
        .zip(&macd_signal)
        .map(|(m, s)| Some((*m)? - (*s)?))
        .collect();

    MacdFrame {
        fast,
        slow,
        signal,
        timestamps: bars.iter().map(|b| b.timestamp).collect(),
        macd,
        macd_signal,
        macd_diff,
    }
}
