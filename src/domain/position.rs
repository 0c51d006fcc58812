//! Single-position state machine and completed trades.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionState {
    Flat,
    Long {
        entry_price: f64,
        entry_time: DateTime<Utc>,
    },
}

impl PositionState {
    pub fn is_long(&self) -> bool {
        matches!(self, PositionState::Long { .. })
    }

    /// Apply one bar's signal. Returns the next state and, on exit, the
    /// completed trade.
    pub fn step(
        self,
        signal: i8,
        close: f64,
        timestamp: DateTime<Utc>,
        fee_pct: f64,
    ) -> (PositionState, Option<Trade>) {
        match self {
            // No entry at a non-positive price: the trade return would be undefined.
            PositionState::Flat if signal > 0 && close > 0.0 => (
                PositionState::Long {
                    entry_price: close * (1.0 + fee_pct),
                    entry_time: timestamp,
                },
                None,
            ),
            PositionState::Long {
                entry_price,
                entry_time,
            } if signal < 0 => {
                let exit_price = close * (1.0 - fee_pct);
                let trade = Trade {
                    entry_time,
                    exit_time: timestamp,
                    entry_price,
                    exit_price,
                    profit_pct: (exit_price - entry_price) / entry_price,
                };
                (PositionState::Flat, Some(trade))
            }
            state => (state, None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_price: f64,
    pub profit_pct: f64,
}

impl Trade {
    pub fn is_win(&self) -> bool {
        self.profit_pct > 0.0
    }
}
