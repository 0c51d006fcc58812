//! Example extraction: pick recent signal points, cut a bar window around
//! each, hand it to a chart sink and report the forward outcome.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::domain::error::SigtraderError;
use crate::domain::ohlcv::Bar;
use crate::domain::signal::SignalSeries;
use crate::domain::strategy::Overlays;
use crate::ports::chart_port::ChartPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractConfig {
    pub num_examples: usize,
    pub lookback: usize,
    pub lookforward: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            num_examples: 3,
            lookback: 30,
            lookforward: 30,
        }
    }
}

/// A line drawn over the price panel or the secondary panel.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayLine {
    pub label: &'static str,
    pub values: Vec<Option<f64>>,
}

/// Everything a chart sink needs to draw one example.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartWindow {
    pub symbol: String,
    pub signal_time: DateTime<Utc>,
    pub signal_value: i8,
    pub bars: Vec<Bar>,
    /// Position of the signal bar inside `bars`.
    pub marker_index: usize,
    /// Lines sharing the price axis (Bollinger bands).
    pub price_overlays: Vec<OverlayLine>,
    /// Lines on their own axis (MACD).
    pub secondary_overlays: Vec<OverlayLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExampleRecord {
    pub timestamp: DateTime<Utc>,
    pub signal_value: i8,
    pub artifact_path: String,
    pub outcome_pct: Option<f64>,
}

/// `(close[i + lookforward] - close[i]) / close[i]`, if that bar exists.
pub fn forward_return(bars: &[Bar], index: usize, lookforward: usize) -> Option<f64> {
    let now = bars.get(index)?.close;
    let later = bars.get(index.checked_add(lookforward)?)?.close;
    if now == 0.0 {
        return None;
    }
    Some((later - now) / now)
}

/// Up to `num_examples` most recent non-zero signal indices, oldest first.
pub fn select_signal_indices(signal: &SignalSeries, num_examples: usize) -> Vec<usize> {
    let active = signal.active_indices();
    let skip = active.len().saturating_sub(num_examples);
    active[skip..].to_vec()
}

fn slice(values: &[Option<f64>], start: usize, end: usize) -> Vec<Option<f64>> {
    values.get(start..=end).map(<[_]>::to_vec).unwrap_or_default()
}

/// Build the chart windows without rendering them.
pub fn build_windows(
    symbol: &str,
    bars: &[Bar],
    signal: &SignalSeries,
    overlays: &Overlays,
    config: &ExtractConfig,
) -> Result<Vec<(ChartWindow, Option<f64>)>, SigtraderError> {
    if signal.len() != bars.len()
        || bars
            .iter()
            .zip(&signal.timestamps)
            .any(|(b, ts)| b.timestamp != *ts)
    {
        return Err(SigtraderError::invalid_request(
            "signal does not cover the series timestamps",
        ));
    }

    let windows = select_signal_indices(signal, config.num_examples)
        .into_iter()
        .map(|i| {
            let start = i.saturating_sub(config.lookback);
            let end = i.saturating_add(config.lookforward).min(bars.len() - 1);

            let mut price_overlays = Vec::new();
            if let Some(bb) = &overlays.bollinger {
                price_overlays.push(OverlayLine {
                    label: "BB Upper",
                    values: slice(&bb.bb_upper, start, end),
                });
                price_overlays.push(OverlayLine {
                    label: "BB Lower",
                    values: slice(&bb.bb_lower, start, end),
                });
            }
            let mut secondary_overlays = Vec::new();
            if let Some(macd) = &overlays.macd {
                secondary_overlays.push(OverlayLine {
                    label: "MACD",
                    values: slice(&macd.macd, start, end),
                });
                secondary_overlays.push(OverlayLine {
                    label: "MACD Signal",
                    values: slice(&macd.macd_signal, start, end),
                });
            }

            let window = ChartWindow {
                symbol: symbol.to_string(),
                signal_time: bars[i].timestamp,
                signal_value: signal.values[i],
                bars: bars[start..=end].to_vec(),
                marker_index: i - start,
                price_overlays,
                secondary_overlays,
            };
            (window, forward_return(bars, i, config.lookforward))
        })
        .collect();
    Ok(windows)
}

/// Render each selected example through `chart` and collect the records.
pub fn find_examples(
    symbol: &str,
    bars: &[Bar],
    signal: &SignalSeries,
    overlays: &Overlays,
    config: &ExtractConfig,
    chart: &dyn ChartPort,
) -> Result<Vec<ExampleRecord>, SigtraderError> {
    let windows = build_windows(symbol, bars, signal, overlays, config)?;
    debug!(symbol, count = windows.len(), "rendering examples");

    windows
        .into_iter()
        .map(|(window, outcome_pct)| {
            let artifact_path = chart.render(&window)?;
            Ok(ExampleRecord {
                timestamp: window.signal_time,
                signal_value: window.signal_value,
                artifact_path,
                outcome_pct,
            })
        })
        .collect()
}
