//! Bollinger Bands.
//!
//! - bb_mid: SMA over n periods
//! - bb_upper / bb_lower: mid ± (multiplier × population stddev)
//!
//! Defaults: period=20, multiplier=2.0. First (period-1) points undefined.

use chrono::{DateTime, Utc};

use crate::domain::indicator::sma::sma_values;
use crate::domain::indicator::stddev::stddev_values;
use crate::domain::ohlcv::Bar;

pub const DEFAULT_PERIOD: usize = 20;
pub const DEFAULT_N_STD: f64 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct BollingerFrame {
    pub period: usize,
    pub n_std: f64,
    pub timestamps: Vec<DateTime<Utc>>,
    pub bb_lower: Vec<Option<f64>>,
    pub bb_mid: Vec<Option<f64>>,
    pub bb_upper: Vec<Option<f64>>,
}

impl BollingerFrame {
    pub fn columns(&self) -> [(&'static str, &[Option<f64>]); 3] {
        [
            ("bb_lower", self.bb_lower.as_slice()),
            ("bb_mid", self.bb_mid.as_slice()),
            ("bb_upper", self.bb_upper.as_slice()),
        ]
    }
}

pub fn calculate_bollinger(bars: &[Bar], period: usize, n_std: f64) -> BollingerFrame {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let mid = sma_values(&closes, period);
    let std = stddev_values(&closes, period);

    let band = |sign: f64| -> Vec<Option<f64>> {
        mid.iter()
            .zip(&std)
            .map(|(m, s)| Some((*m)? + sign * n_std * (*s)?))
            .collect()
    };
    let bb_upper = band(1.0);
    let bb_lower = band(-1.0);

    BollingerFrame {
        period,
        n_std,
        timestamps: bars.iter().map(|b| b.timestamp).collect(),
        bb_lower,
        bb_mid: mid,
        bb_upper,
    }
}
