//! Performance metrics over an equity curve and a trade list.

use serde::Serialize;

use crate::domain::position::Trade;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub pnl: f64,
    pub win_rate: f64,
    pub max_drawdown: f64,
    pub sharpe: f64,
    pub trades_won: usize,
    pub trades_lost: usize,
}

impl Metrics {
    pub fn compute(
        initial_capital: f64,
        final_capital: f64,
        equity: &[f64],
        returns: &[f64],
        trades: &[Trade],
    ) -> Self {
        let pnl = if initial_capital > 0.0 {
            final_capital / initial_capital - 1.0
        } else {
            0.0
        };
        let trades_won = trades.iter().filter(|t| t.is_win()).count();
        Self {
            pnl,
            win_rate: win_rate(trades),
            max_drawdown: compute_drawdown(equity),
            sharpe: sharpe_ratio(returns),
            trades_won,
            trades_lost: trades.len() - trades_won,
        }
    }
}

/// Fraction of trades with positive profit; 0 with no trades.
pub fn win_rate(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.is_win()).count() as f64 / trades.len() as f64
}

/// Largest peak-to-trough decline as a positive fraction of the peak.
pub fn compute_drawdown(equity: &[f64]) -> f64 {
    let Some(&first) = equity.first() else {
        return 0.0;
    };
    let mut peak = first;
    let mut max_dd = 0.0_f64;
    for &value in equity {
        if value > peak {
            peak = value;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - value) / peak);
        }
    }
    max_dd
}

/// mean / population std of per-bar returns, scaled by sqrt(n).
/// 0 when there are no returns or they have zero variance.
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    // Identical returns can leave rounding noise in the variance.
    if std < 1e-12 || !std.is_finite() {
        return 0.0;
    }
    mean / std * n.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn make_trade(profit_pct: f64) -> Trade {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Trade {
            entry_time: t,
            exit_time: t + chrono::Duration::days(1),
            entry_price: 100.0,
            exit_price: 100.0 * (1.0 + profit_pct),
            profit_pct,
        }
    }

    #[test]
    fn win_rate_counts_strict_profit() {
        let trades = vec![make_trade(0.1), make_trade(-0.05), make_trade(0.0), make_trade(0.2)];
        assert!((win_rate(&trades) - 0.5).abs() < f64::EPSILON);
        assert_eq!(win_rate(&[]), 0.0);
    }

    #[test]
    fn drawdown_from_peak() {
        let dd = compute_drawdown(&[100.0, 120.0, 90.0, 110.0, 60.0, 130.0]);
        assert!((dd - 0.5).abs() < 1e-12);
    }

    #[test]
    fn drawdown_monotonic_rise_is_zero() {
        assert_eq!(compute_drawdown(&[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(compute_drawdown(&[]), 0.0);
    }

    #[test]
    fn sharpe_population_std() {
        let returns = [0.01, -0.01, 0.02, 0.0];
        let mean = 0.005;
        let var = ((0.005f64).powi(2) + (0.015f64).powi(2) + (0.015f64).powi(2) + (0.005f64).powi(2)) / 4.0;
        let expected = mean / var.sqrt() * 2.0;
        assert!((sharpe_ratio(&returns) - expected).abs() < 1e-12);
    }

    #[test]
    fn sharpe_zero_variance_is_zero() {
        assert_eq!(sharpe_ratio(&[0.0, 0.0, 0.0]), 0.0);
        assert_eq!(sharpe_ratio(&[0.01; 5]), 0.0);
        assert_eq!(sharpe_ratio(&[]), 0.0);
    }

    #[test]
    fn metrics_compute_pnl() {
        let m = Metrics::compute(1000.0, 1100.0, &[1000.0, 1100.0], &[0.0, 0.1], &[make_trade(0.1)]);
        assert!((m.pnl - 0.1).abs() < 1e-12);
        assert_eq!(m.trades_won, 1);
        assert_eq!(m.trades_lost, 0);
        assert!((m.win_rate - 1.0).abs() < f64::EPSILON);
    }
}
