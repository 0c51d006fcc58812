//! Core domain types and logic.

pub mod ohlcv;
pub mod interval;
pub mod fetch;
pub mod cancel;
pub mod history;
pub mod indicator;
pub mod signal;
pub mod signal_rules;
pub mod strategy;
pub mod position;
pub mod backtest;
pub mod metrics;
pub mod example_extractor;
pub mod config_validation;
pub mod error;
