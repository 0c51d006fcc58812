//! Discrete directional signals and their boolean composition.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::error::SigtraderError;
use crate::domain::ohlcv::Bar;

pub const BULLISH: i8 = 1;
pub const BEARISH: i8 = -1;
pub const NEUTRAL: i8 = 0;

/// A {-1, 0, +1} value per timestamp, index-aligned with its source series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalSeries {
    pub timestamps: Vec<DateTime<Utc>>,
    pub values: Vec<i8>,
}

impl SignalSeries {
    /// All-neutral signal over the timestamps of `bars`.
    pub fn neutral(bars: &[Bar]) -> Self {
        Self {
            timestamps: bars.iter().map(|b| b.timestamp).collect(),
            values: vec![NEUTRAL; bars.len()],
        }
    }

    /// Build from explicit values; lengths must match.
    pub fn new(timestamps: Vec<DateTime<Utc>>, values: Vec<i8>) -> Result<Self, SigtraderError> {
        if timestamps.len() != values.len() {
            return Err(SigtraderError::invalid_rule(format!(
                "signal has {} timestamps but {} values",
                timestamps.len(),
                values.len()
            )));
        }
        let values = values.into_iter().map(i8::signum).collect();
        Ok(Self { timestamps, values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn same_domain(&self, other: &SignalSeries) -> bool {
        self.timestamps == other.timestamps
    }

    /// Indices where the signal is non-zero.
    pub fn active_indices(&self) -> Vec<usize> {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != NEUTRAL)
            .map(|(i, _)| i)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logic {
    And,
    Or,
}

impl FromStr for Logic {
    type Err = SigtraderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "and" => Ok(Logic::And),
            "or" => Ok(Logic::Or),
            other => Err(SigtraderError::invalid_rule(format!(
                "logic must be 'and' or 'or', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Logic::And => write!(f, "and"),
            Logic::Or => write!(f, "or"),
        }
    }
}

/// Combine signals under `logic` ("and" / "or", case-insensitive).
pub fn combine_signals(signals: &[SignalSeries], logic: &str) -> Result<SignalSeries, SigtraderError> {
    combine(signals, logic.parse()?)
}

/// AND: +1 where every input is +1, -1 where every input is -1, else 0.
/// OR: +1 where some input is +1 and none is -1 (and symmetrically); mixed
/// signs yield 0.
pub fn combine(signals: &[SignalSeries], logic: Logic) -> Result<SignalSeries, SigtraderError> {
    let Some(first) = signals.first() else {
        return Err(SigtraderError::invalid_rule("no signals to combine"));
    };
    if let Some(pos) = signals.iter().position(|s| !s.same_domain(first)) {
        return Err(SigtraderError::invalid_rule(format!(
            "signal {pos} does not share the timestamps of signal 0"
        )));
    }

    let values = (0..first.len())
        .map(|i| {
            let any_pos = signals.iter().any(|s| s.values[i] > 0);
            let any_neg = signals.iter().any(|s| s.values[i] < 0);
            match logic {
                Logic::And => {
                    if signals.iter().all(|s| s.values[i] > 0) {
                        BULLISH
                    } else if signals.iter().all(|s| s.values[i] < 0) {
                        BEARISH
                    } else {
                        NEUTRAL
                    }
                }
                Logic::Or => match (any_pos, any_neg) {
                    (true, false) => BULLISH,
                    (false, true) => BEARISH,
                    _ => NEUTRAL,
                },
            }
        })
        .collect();

    Ok(SignalSeries {
        timestamps: first.timestamps.clone(),
        values,
    })
}

/// Carry the last non-zero sign forward for `lookback` bars after it fires.
/// A new non-zero value replaces the held one.
pub fn hold_signals(signal: &SignalSeries, lookback: usize) -> SignalSeries {
    let mut held = NEUTRAL;
    let mut remaining = 0usize;
    let values = signal
        .values
        .iter()
        .map(|&v| {
            if v != NEUTRAL {
                held = v;
                remaining = lookback;
                v
            } else if remaining > 0 {
                remaining -= 1;
                held
            } else {
                NEUTRAL
            }
        })
        .collect();
    SignalSeries {
        timestamps: signal.timestamps.clone(),
        values,
    }
}
