//! Exponential Moving Average.
//!
//! k = 2/(n+1), seed with the SMA of the first n values, then
//! EMA[i] = C[i]*k + EMA[i-1]*(1-k). First (n-1) points are undefined.

use crate::domain::indicator::{IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::Bar;

pub fn calculate_ema(bars: &[Bar], period: usize) -> IndicatorSeries {
    let closes: Vec<Option<f64>> = bars.iter().map(|b| Some(b.close)).collect();
    IndicatorSeries::from_values(IndicatorType::Ema(period), bars, ema_values(&closes, period))
}

/// EMA over a series whose leading points may be undefined. Seeding starts
/// at the first defined value; an undefined point after seeding leaves the
/// output undefined there and does not update the average.
pub fn ema_values(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }
    let k = 2.0 / (period as f64 + 1.0);
    let mut seen = 0usize;
    let mut sum = 0.0;
    let mut ema: Option<f64> = None;

    for (i, v) in values.iter().enumerate() {
        let Some(v) = *v else { continue };
        match ema {
            Some(prev) => {
                let next = v * k + prev * (1.0 - k);
                ema = Some(next);
                out[i] = Some(next);
            }
            None => {
                seen += 1;
                sum += v;
                if seen == period {
                    let seed = sum / period as f64;
                    ema = Some(seed);
                    out[i] = Some(seed);
                }
            }
        }
    }
    out
}
