//! Concrete adapter implementations for ports.

pub mod binance;
pub mod chart_svg;
pub mod coingecko;
pub mod csv_adapter;
pub mod file_config_adapter;
pub mod ohlc_fetcher;
pub mod reqwest_http;
