//! OHLCV bar and series representation.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// True when every price and the volume are finite and non-negative.
    pub fn is_well_formed(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0)
    }
}

/// An ordered run of bars for one symbol and interval. Gaps are allowed;
/// missing periods are never synthesized.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Series {
    pub symbol: String,
    pub interval: String,
    pub bars: Vec<Bar>,
}

impl Series {
    pub fn new(symbol: impl Into<String>, interval: impl Into<String>, bars: Vec<Bar>) -> Self {
        Self {
            symbol: symbol.into(),
            interval: interval.into(),
            bars,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// Keep only bars with `start <= timestamp <= end`.
    pub fn filtered(self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let bars = self
            .bars
            .into_iter()
            .filter(|b| b.timestamp >= start && b.timestamp <= end)
            .collect();
        Self { bars, ..self }
    }

    /// Sort by timestamp and drop duplicate timestamps, keeping the first.
    pub fn normalized(mut self) -> Self {
        self.bars.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        self.bars.dedup_by(|later, earlier| later.timestamp == earlier.timestamp);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar(hour: u32, close: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10.0,
        }
    }

    #[test]
    fn well_formed_rejects_negative_and_nan() {
        assert!(bar(0, 10.0).is_well_formed());
        let mut b = bar(0, 10.0);
        b.volume = -1.0;
        assert!(!b.is_well_formed());
        b.volume = f64::NAN;
        assert!(!b.is_well_formed());
    }

    #[test]
    fn filtered_is_inclusive() {
        let series = Series::new("BTCUSDT", "1h", (0..5).map(|h| bar(h, 100.0)).collect());
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 3, 0, 0).unwrap();
        let out = series.filtered(start, end);
        assert_eq!(out.len(), 3);
        assert_eq!(out.bars[0].timestamp, start);
        assert_eq!(out.bars[2].timestamp, end);
    }

    #[test]
    fn normalized_sorts_and_dedups() {
        let series = Series::new(
            "X",
            "1h",
            vec![bar(2, 3.0), bar(0, 1.0), bar(2, 99.0), bar(1, 2.0)],
        )
        .normalized();
        assert_eq!(series.closes(), vec![1.0, 2.0, 3.0]);
    }
}
