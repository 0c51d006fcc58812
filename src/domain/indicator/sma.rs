//! Simple Moving Average.
//!
//! SMA(n)[i] = mean(C[i-n+1..=i]). First (n-1) points are undefined.

use crate::domain::indicator::{IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::Bar;

pub fn calculate_sma(bars: &[Bar], period: usize) -> IndicatorSeries {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    IndicatorSeries::from_values(IndicatorType::Sma(period), bars, sma_values(&closes, period))
}

/// Rolling mean over a running sum.
pub fn sma_values(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for (i, v) in values.iter().enumerate() {
        sum += v;
        if i >= period {
            sum -= values[i - period];
        }
        if i + 1 >= period {
            out.push(Some(sum / period as f64));
        } else {
            out.push(None);
        }
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    pub(crate) fn make_bars(prices: &[f64]) -> Vec<Bar> {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: t0 + Duration::hours(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn sma_warmup_and_values() {
        let bars = make_bars(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let series = calculate_sma(&bars, 3);

        assert_eq!(series.values.len(), 5);
        assert_eq!(series.value_at(0), None);
        assert_eq!(series.value_at(1), None);
        assert!((series.value_at(2).unwrap() - 2.0).abs() < f64::EPSILON);
        assert!((series.value_at(3).unwrap() - 3.0).abs() < f64::EPSILON);
        assert!((series.value_at(4).unwrap() - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn sma_timestamps_aligned() {
        let bars = make_bars(&[1.0, 2.0, 3.0]);
        let series = calculate_sma(&bars, 2);
        for (p, b) in series.values.iter().zip(&bars) {
            assert_eq!(p.timestamp, b.timestamp);
        }
    }

    #[test]
    fn sma_period_longer_than_series() {
        let bars = make_bars(&[1.0, 2.0]);
        let series = calculate_sma(&bars, 5);
        assert!(series.values.iter().all(|p| p.value.is_none()));
    }

    #[test]
    fn sma_period_0_all_undefined() {
        let bars = make_bars(&[1.0, 2.0]);
        let series = calculate_sma(&bars, 0);
        assert_eq!(series.len(), 2);
        assert!(series.values.iter().all(|p| p.value.is_none()));
    }

    #[test]
    fn sma_indicator_type() {
        let series = calculate_sma(&make_bars(&[1.0]), 20);
        assert_eq!(series.indicator_type, IndicatorType::Sma(20));
    }
}
