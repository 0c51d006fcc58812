//! Bounded per-symbol price history.

use std::collections::{HashMap, VecDeque};

use crate::domain::ohlcv::{Bar, Series};

/// Fixed-capacity ring buffer of bars per symbol; the oldest bar is evicted
/// once a symbol is full. Bars must arrive in timestamp order: a bar with
/// the same timestamp as the newest replaces it, an older one is ignored.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    capacity: usize,
    buffers: HashMap<String, VecDeque<Bar>>,
}

impl PriceHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            buffers: HashMap::new(),
        }
    }

    /// Returns false when the bar was older than the newest retained bar.
    pub fn record(&mut self, symbol: &str, bar: Bar) -> bool {
        let buf = self
            .buffers
            .entry(symbol.to_string())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));

        match buf.back_mut() {
            Some(last) if bar.timestamp < last.timestamp => return false,
            Some(last) if bar.timestamp == last.timestamp => {
                *last = bar;
                return true;
            }
            _ => {}
        }
        if buf.len() == self.capacity {
            buf.pop_front();
        }
        buf.push_back(bar);
        true
    }

    /// Record every bar of `series`; returns how many were accepted.
    pub fn record_series(&mut self, series: &Series) -> usize {
        series
            .bars
            .iter()
            .filter(|bar| self.record(&series.symbol, (*bar).clone()))
            .count()
    }

    /// Retained bars for `symbol`, oldest first.
    pub fn snapshot(&self, symbol: &str, interval: &str) -> Series {
        let bars = self
            .buffers
            .get(symbol)
            .map(|buf| buf.iter().cloned().collect())
            .unwrap_or_default();
        Series::new(symbol, interval, bars)
    }
}
