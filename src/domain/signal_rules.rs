//! Indicator-to-signal rules built on crossover detection.

use crate::domain::indicator::{BollingerFrame, IndicatorSeries, MacdFrame, calculate_ema, calculate_sma};
use crate::domain::ohlcv::Bar;
use crate::domain::signal::{BEARISH, BULLISH, NEUTRAL, SignalSeries};

pub const DEFAULT_RSI_LOW: f64 = 30.0;
pub const DEFAULT_RSI_HIGH: f64 = 70.0;
pub const DEFAULT_SMA_FAST: usize = 20;
pub const DEFAULT_SMA_SLOW: usize = 50;

/// `a` crosses above `b` at `t`: a[t-1] < b[t-1] and a[t] >= b[t].
/// All four points must be defined.
pub fn crosses_above(a: &[Option<f64>], b: &[Option<f64>], t: usize) -> bool {
    match points(a, b, t) {
        Some((a0, b0, a1, b1)) => a0 < b0 && a1 >= b1,
        None => false,
    }
}

/// `a` crosses below `b` at `t`: a[t-1] > b[t-1] and a[t] <= b[t].
pub fn crosses_below(a: &[Option<f64>], b: &[Option<f64>], t: usize) -> bool {
    match points(a, b, t) {
        Some((a0, b0, a1, b1)) => a0 > b0 && a1 <= b1,
        None => false,
    }
}

fn points(a: &[Option<f64>], b: &[Option<f64>], t: usize) -> Option<(f64, f64, f64, f64)> {
    if t == 0 {
        return None;
    }
    Some((
        (*a.get(t - 1)?)?,
        (*b.get(t - 1)?)?,
        (*a.get(t)?)?,
        (*b.get(t)?)?,
    ))
}

/// +1 where `bullish(t)`, -1 where `bearish(t)`, 0 otherwise.
fn classify(
    timestamps: Vec<chrono::DateTime<chrono::Utc>>,
    bullish: impl Fn(usize) -> bool,
    bearish: impl Fn(usize) -> bool,
) -> SignalSeries {
    let values = (0..timestamps.len())
        .map(|t| {
            if bullish(t) {
                BULLISH
            } else if bearish(t) {
                BEARISH
            } else {
                NEUTRAL
            }
        })
        .collect();
    SignalSeries { timestamps, values }
}

pub fn macd_cross_signal(frame: &MacdFrame) -> SignalSeries {
    let (m, s) = (&frame.macd, &frame.macd_signal);
    classify(
        frame.timestamps.clone(),
        |t| crosses_above(m, s, t),
        |t| crosses_below(m, s, t),
    )
}

/// +1 when RSI drops from above `low` to at or below it; -1 when it rises
/// from below `high` to at or above it.
pub fn rsi_signal(rsi: &IndicatorSeries, low: f64, high: f64) -> SignalSeries {
    let values = rsi.raw();
    let low_line = vec![Some(low); values.len()];
    let high_line = vec![Some(high); values.len()];
    classify(
        rsi.values.iter().map(|p| p.timestamp).collect(),
        |t| crosses_below(&values, &low_line, t),
        |t| crosses_above(&values, &high_line, t),
    )
}

/// +1 when close crosses below the lower band; -1 when it crosses above the
/// upper band.
pub fn bollinger_signal(bars: &[Bar], frame: &BollingerFrame) -> SignalSeries {
    let close: Vec<Option<f64>> = bars.iter().map(|b| Some(b.close)).collect();
    classify(
        frame.timestamps.clone(),
        |t| crosses_below(&close, &frame.bb_lower, t),
        |t| crosses_above(&close, &frame.bb_upper, t),
    )
}

/// Golden cross (+1) / death cross (-1) between two moving averages.
pub fn crossover_signal(fast: &IndicatorSeries, slow: &IndicatorSeries) -> SignalSeries {
    let (f, s) = (fast.raw(), slow.raw());
    classify(
        fast.values.iter().map(|p| p.timestamp).collect(),
        |t| crosses_above(&f, &s, t),
        |t| crosses_below(&f, &s, t),
    )
}

pub fn sma_crossover_signal(bars: &[Bar], fast: usize, slow: usize) -> SignalSeries {
    crossover_signal(&calculate_sma(bars, fast), &calculate_sma(bars, slow))
}

pub fn ema_crossover_signal(bars: &[Bar], fast: usize, slow: usize) -> SignalSeries {
    crossover_signal(&calculate_ema(bars, fast), &calculate_ema(bars, slow))
}
