//! Long-only backtest simulator.
//!
//! Walks the bars once, feeding each bar's composite signal through the
//! position state machine. Realized capital only moves on exits; the equity
//! curve marks the open position to market every bar.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::error::SigtraderError;
use crate::domain::metrics::Metrics;
use crate::domain::ohlcv::Bar;
use crate::domain::position::{PositionState, Trade};
use crate::domain::signal::SignalSeries;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    /// Proportional fee applied on entry (added) and exit (subtracted).
    pub fee_pct: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: 1000.0,
            fee_pct: 0.0,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), SigtraderError> {
        if !(self.initial_capital > 0.0) || !self.initial_capital.is_finite() {
            return Err(SigtraderError::invalid_request(format!(
                "initial_capital must be positive, got {}",
                self.initial_capital
            )));
        }
        if !(0.0..1.0).contains(&self.fee_pct) {
            return Err(SigtraderError::invalid_request(format!(
                "fee_pct must be in [0, 1), got {}",
                self.fee_pct
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
    pub bar_return: f64,
    pub in_position: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestResult {
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub initial_capital: f64,
    /// Capital compounded over closed trades only.
    pub final_capital: f64,
    pub open_position: bool,
    pub metrics: Metrics,
}

pub fn run_backtest(
    bars: &[Bar],
    signal: &SignalSeries,
    config: &BacktestConfig,
) -> Result<BacktestResult, SigtraderError> {
    config.validate()?;
    if signal.len() != bars.len()
        || bars
            .iter()
            .zip(&signal.timestamps)
            .any(|(b, ts)| b.timestamp != *ts)
    {
        return Err(SigtraderError::invalid_request(format!(
            "signal ({} points) does not cover the series timestamps ({} bars)",
            signal.len(),
            bars.len()
        )));
    }

    let mut state = PositionState::Flat;
    let mut capital = config.initial_capital;
    let mut equity = config.initial_capital;
    let mut trades = Vec::new();
    let mut equity_curve = Vec::with_capacity(bars.len());

    for (i, bar) in bars.iter().enumerate() {
        let held = state.is_long();
        let (next, trade) = state.step(signal.values[i], bar.close, bar.timestamp, config.fee_pct);
        state = next;
        if let Some(trade) = trade {
            capital *= 1.0 + trade.profit_pct;
            trades.push(trade);
        }

        // The move into this bar belongs to whatever position was held over it.
        let bar_return = match (held, i.checked_sub(1).map(|p| bars[p].close)) {
            (true, Some(prev)) if prev != 0.0 => (bar.close - prev) / prev,
            _ => 0.0,
        };
        equity *= 1.0 + bar_return;
        equity_curve.push(EquityPoint {
            timestamp: bar.timestamp,
            equity,
            bar_return,
            in_position: state.is_long(),
        });
    }

    let equity_values: Vec<f64> = equity_curve.iter().map(|p| p.equity).collect();
    let returns: Vec<f64> = equity_curve.iter().map(|p| p.bar_return).collect();
    let metrics = Metrics::compute(config.initial_capital, capital, &equity_values, &returns, &trades);

    Ok(BacktestResult {
        trades,
        equity_curve,
        initial_capital: config.initial_capital,
        final_capital: capital,
        open_position: state.is_long(),
        metrics,
    })
}
