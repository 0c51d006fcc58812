//! sigtrader: OHLC fetching, technical indicators, composable trading
//! signals, a long-only backtester and signal example extraction.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
