//! CLI definition and dispatch.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::adapters::chart_svg::SvgChartAdapter;
use crate::adapters::coingecko::ApiKey;
use crate::adapters::csv_adapter::{self, CsvAdapter};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::ohlc_fetcher::{FetcherConfig, OhlcFetcher};
use crate::adapters::reqwest_http::ReqwestHttp;
use crate::domain::backtest::{BacktestConfig, BacktestResult, run_backtest};
use crate::domain::cancel::CancelToken;
use crate::domain::config_validation::{
    parse_date_time, validate_backtest_config, validate_examples_config, validate_fetcher_config,
    validate_strategy_config,
};
use crate::domain::error::SigtraderError;
use crate::domain::example_extractor::{ExampleRecord, ExtractConfig, find_examples};
use crate::domain::fetch::{FetchRequest, RetryPolicy};
use crate::domain::history::PriceHistory;
use crate::domain::indicator::{IndicatorOutput, parse_indicator_list};
use crate::domain::ohlcv::Series;
use crate::domain::strategy::{Strategy, StrategyEvaluation};
use crate::ports::chart_port::ChartPort;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;

pub const DEFAULT_INDICATORS: &str = "sma20,ema20,rsi14,macd,bollinger";
pub const DEFAULT_HISTORY_CAPACITY: i64 = 5000;

#[derive(Parser, Debug)]
#[command(
    name = "sigtrader",
    about = "Crypto OHLC fetcher, signal engine and backtester"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Where bars come from and how long a command may take.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Read `{symbol}_{interval}.csv` files from this directory instead of
    /// the network
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// Abort the fetch after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch OHLC bars and write them as CSV
    Fetch {
        #[arg(long)]
        symbol: String,
        #[arg(long, default_value = "1h")]
        interval: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        #[arg(long, default_value = "usd")]
        quote: String,
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Compute indicators over fetched bars and write them as CSV
    Indicators {
        #[arg(long)]
        symbol: String,
        #[arg(long, default_value = "1h")]
        interval: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        #[arg(long, default_value = "usd")]
        quote: String,
        /// Comma-separated indicator names, e.g. `sma20,rsi14,macd`
        #[arg(long, default_value = DEFAULT_INDICATORS)]
        indicators: String,
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Run a strategy backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
        /// Directory for trades.csv and equity.csv
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print the result as JSON on stdout
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Render charts for the most recent strategy signals
    Examples {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
        /// Overrides `[examples] output_dir`
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => return fail(SigtraderError::Io(e)),
    };

    match cli.command {
        Command::Fetch {
            symbol,
            interval,
            start,
            end,
            quote,
            config,
            output,
            source,
        } => runtime.block_on(async {
            let request = match parse_request(&symbol, &interval, &start, &end, &quote) {
                Ok(r) => r,
                Err(e) => return fail(e),
            };
            run_fetch(&request, config.as_ref(), output.as_deref(), &source).await
        }),
        Command::Indicators {
            symbol,
            interval,
            start,
            end,
            quote,
            indicators,
            config,
            output,
            source,
        } => runtime.block_on(async {
            let request = match parse_request(&symbol, &interval, &start, &end, &quote) {
                Ok(r) => r,
                Err(e) => return fail(e),
            };
            run_indicators(&request, &indicators, config.as_ref(), output.as_deref(), &source).await
        }),
        Command::Backtest {
            config,
            symbol,
            output,
            json,
            source,
        } => runtime.block_on(run_backtest_command(
            &config,
            symbol.as_deref(),
            output.as_deref(),
            json,
            &source,
        )),
        Command::Examples {
            config,
            symbol,
            output_dir,
            source,
        } => runtime.block_on(run_examples_command(
            &config,
            symbol.as_deref(),
            output_dir,
            &source,
        )),
        Command::Validate { config } => run_validate(&config),
    }
}

fn fail(err: SigtraderError) -> ExitCode {
    eprintln!("error: {err}");
    (&err).into()
}

/// Print a strategy error, with a caret under the offending position for
/// syntax errors.
fn fail_strategy(err: SigtraderError, signals: &str) -> ExitCode {
    match &err {
        SigtraderError::RuleParse(parse) => {
            eprintln!("error: failed to parse signals:\n{}", parse.display_with_context(signals));
        }
        other => eprintln!("error: {other}"),
    }
    (&err).into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, SigtraderError> {
    Ok(FileConfigAdapter::from_file(path)?.with_env())
}

fn parse_time(key: &str, raw: &str) -> Result<DateTime<Utc>, SigtraderError> {
    parse_date_time(raw).ok_or_else(|| {
        SigtraderError::invalid_request(format!(
            "invalid {key} '{raw}', expected YYYY-MM-DD or RFC 3339"
        ))
    })
}

pub fn parse_request(
    symbol: &str,
    interval: &str,
    start: &str,
    end: &str,
    quote: &str,
) -> Result<FetchRequest, SigtraderError> {
    FetchRequest::new(
        symbol,
        interval,
        parse_time("start", start)?,
        parse_time("end", end)?,
        quote,
    )
}

fn int_setting<T: TryFrom<i64>>(
    adapter: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<T, SigtraderError> {
    let value = adapter.get_int(section, key, default);
    T::try_from(value).map_err(|_| SigtraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: format!("{value} is out of range"),
    })
}

pub fn build_fetcher_config(adapter: &dyn ConfigPort) -> Result<FetcherConfig, SigtraderError> {
    validate_fetcher_config(adapter)?;
    let defaults = FetcherConfig::default();

    let api_key = adapter
        .get_string("fetcher", "coingecko_api_key")
        .map(|key| ApiKey {
            key,
            header: adapter.get_string("fetcher", "coingecko_api_key_header"),
            query_param: adapter.get_string("fetcher", "coingecko_api_key_param"),
        });

    Ok(FetcherConfig {
        binance_base_url: adapter
            .get_string("fetcher", "binance_base_url")
            .unwrap_or(defaults.binance_base_url),
        coingecko_base_url: adapter
            .get_string("fetcher", "coingecko_base_url")
            .unwrap_or(defaults.coingecko_base_url),
        coingecko_api_key: api_key,
        max_lookback_days: adapter.get_int("fetcher", "max_lookback_days", defaults.max_lookback_days),
        retry: RetryPolicy {
            max_retries: int_setting(adapter, "fetcher", "max_retries", defaults.retry.max_retries.into())?,
            base_delay: adapter.get_secs("fetcher", "backoff_base_secs", defaults.retry.base_delay),
        },
        page_limit: int_setting(adapter, "fetcher", "page_limit", defaults.page_limit.into())?,
        page_delay: adapter.get_millis("fetcher", "page_delay_ms", defaults.page_delay),
        request_timeout: adapter.get_secs("fetcher", "request_timeout_secs", defaults.request_timeout),
    })
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, SigtraderError> {
    let defaults = BacktestConfig::default();
    let config = BacktestConfig {
        initial_capital: adapter.get_double("backtest", "initial_capital", defaults.initial_capital),
        fee_pct: adapter.get_double("backtest", "fee_pct", defaults.fee_pct),
    };
    config.validate()?;
    Ok(config)
}

/// The `[backtest]` range as a fetch request; `symbol` overrides the file.
pub fn build_fetch_request(
    adapter: &dyn ConfigPort,
    symbol: Option<&str>,
) -> Result<FetchRequest, SigtraderError> {
    let symbol = match symbol {
        Some(s) => s.to_string(),
        None => adapter
            .get_string("backtest", "symbol")
            .ok_or_else(|| SigtraderError::ConfigMissing {
                section: "backtest".into(),
                key: "symbol".into(),
            })?,
    };
    let get = |key: &str| {
        adapter
            .get_string("backtest", key)
            .ok_or_else(|| SigtraderError::ConfigMissing {
                section: "backtest".into(),
                key: key.into(),
            })
    };
    let interval = adapter
        .get_string("backtest", "interval")
        .unwrap_or_else(|| "1h".to_string());
    let quote = adapter
        .get_string("backtest", "quote_currency")
        .unwrap_or_else(|| "usd".to_string());
    parse_request(&symbol, &interval, &get("start")?, &get("end")?, &quote)
}

/// Returns the raw `signals` string alongside so parse errors can be shown
/// in context.
pub fn build_strategy(adapter: &dyn ConfigPort) -> Result<Strategy, (SigtraderError, String)> {
    let signals = adapter.get_string("strategy", "signals").unwrap_or_default();
    let name = adapter
        .get_string("strategy", "name")
        .unwrap_or_else(|| "Unnamed".to_string());
    let logic = adapter
        .get_string("strategy", "logic")
        .unwrap_or_else(|| "and".to_string());
    let hold_bars = adapter.get_int("strategy", "hold_bars", 0).max(0) as usize;
    Strategy::parse(&name, &signals, &logic, hold_bars).map_err(|e| (e, signals))
}

pub fn build_extract_config(adapter: &dyn ConfigPort) -> ExtractConfig {
    let defaults = ExtractConfig::default();
    let get = |key: &str, default: usize| adapter.get_int("examples", key, default as i64).max(0) as usize;
    ExtractConfig {
        num_examples: get("num_examples", defaults.num_examples),
        lookback: get("lookback", defaults.lookback),
        lookforward: get("lookforward", defaults.lookforward),
    }
}

/// Token wired to Ctrl-C and the optional timeout.
fn cancel_token(timeout_secs: Option<u64>) -> CancelToken {
    let (handle, token) = CancelToken::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            handle.cancel();
        }
    });
    match timeout_secs {
        Some(secs) => token.with_timeout(Duration::from_secs(secs)),
        None => token,
    }
}

fn data_port(
    source: &SourceArgs,
    config: Option<&dyn ConfigPort>,
) -> Result<Box<dyn DataPort>, SigtraderError> {
    if let Some(dir) = &source.data_dir {
        info!(dir = %dir.display(), "reading bars from CSV");
        return Ok(Box::new(CsvAdapter::new(dir.clone())));
    }
    let fetcher_config = match config {
        Some(c) => build_fetcher_config(c)?,
        None => {
            let env = FileConfigAdapter::empty().with_env();
            build_fetcher_config(&env)?
        }
    };
    let http = Arc::new(ReqwestHttp::new(fetcher_config.request_timeout)?);
    Ok(Box::new(OhlcFetcher::from_config(&fetcher_config, http)))
}

/// Fetch through `data_port`, treating an empty series as `NoData`.
pub async fn load_series(
    data_port: &dyn DataPort,
    request: &FetchRequest,
    cancel: &CancelToken,
) -> Result<Series, SigtraderError> {
    let series = data_port.fetch_series(request, cancel).await?;
    if series.is_empty() {
        return Err(SigtraderError::NoData {
            symbol: request.symbol.clone(),
            interval: request.interval.to_string(),
        });
    }
    Ok(series)
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>, SigtraderError> {
    Ok(match path {
        Some(p) => Box::new(fs::File::create(p)?),
        None => Box::new(io::stdout().lock()),
    })
}

fn optional_config(path: Option<&PathBuf>) -> Result<Option<FileConfigAdapter>, SigtraderError> {
    path.map(|p| load_config(p)).transpose()
}

async fn run_fetch(
    request: &FetchRequest,
    config_path: Option<&PathBuf>,
    output: Option<&Path>,
    source: &SourceArgs,
) -> ExitCode {
    let result = async {
        let config = optional_config(config_path)?;
        let port = data_port(source, config.as_ref().map(|c| c as &dyn ConfigPort))?;
        let series = load_series(port.as_ref(), request, &cancel_token(source.timeout_secs)).await?;
        csv_adapter::write_bars(open_output(output)?, &series.bars)?;
        Ok::<_, SigtraderError>(series.len())
    }
    .await;

    match result {
        Ok(n) => {
            eprintln!("Fetched {n} bars for {} ({})", request.symbol, request.interval);
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

async fn run_indicators(
    request: &FetchRequest,
    indicators: &str,
    config_path: Option<&PathBuf>,
    output: Option<&Path>,
    source: &SourceArgs,
) -> ExitCode {
    let result = async {
        let types = parse_indicator_list(indicators)?;
        let config = optional_config(config_path)?;
        let port = data_port(source, config.as_ref().map(|c| c as &dyn ConfigPort))?;
        let series = load_series(port.as_ref(), request, &cancel_token(source.timeout_secs)).await?;
        let outputs: Vec<IndicatorOutput> = types.iter().map(|t| t.compute(&series.bars)).collect();
        csv_adapter::write_indicators(open_output(output)?, &series.bars, &outputs)?;
        Ok::<_, SigtraderError>((series.len(), types.len()))
    }
    .await;

    match result {
        Ok((bars, count)) => {
            eprintln!("Computed {count} indicators over {bars} bars");
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

/// Everything a backtest run produced.
#[derive(Debug)]
pub struct BacktestReport {
    pub series: Series,
    pub evaluation: StrategyEvaluation,
    pub result: BacktestResult,
}

pub async fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    request: &FetchRequest,
    strategy: &Strategy,
    config: &BacktestConfig,
    cancel: &CancelToken,
) -> Result<BacktestReport, SigtraderError> {
    let series = load_series(data_port, request, cancel).await?;
    let evaluation = strategy.evaluate(&series.bars)?;
    let result = run_backtest(&series.bars, &evaluation.composite, config)?;
    Ok(BacktestReport {
        series,
        evaluation,
        result,
    })
}

pub fn print_summary(strategy: &Strategy, report: &BacktestReport) {
    let m = &report.result.metrics;
    eprintln!("\n=== {} on {} ({}) ===", strategy.name, report.series.symbol, report.series.interval);
    eprintln!("Bars:             {}", report.series.len());
    eprintln!("Signals:          {}", report.evaluation.composite.active_indices().len());
    eprintln!("PnL:              {:.2}%", m.pnl * 100.0);
    eprintln!("Final Capital:    {:.2}", report.result.final_capital);
    eprintln!("Sharpe Ratio:     {:.2}", m.sharpe);
    eprintln!("Max Drawdown:     -{:.1}%", m.max_drawdown * 100.0);
    eprintln!("Total Trades:     {}", report.result.trades.len());
    eprintln!("Win Rate:         {:.1}%", m.win_rate * 100.0);
    if report.result.open_position {
        eprintln!("Open position at end of series (not included in PnL)");
    }
}

fn write_backtest_outputs(dir: &Path, result: &BacktestResult) -> Result<(), SigtraderError> {
    fs::create_dir_all(dir)?;
    csv_adapter::write_trades(fs::File::create(dir.join("trades.csv"))?, &result.trades)?;
    csv_adapter::write_equity(fs::File::create(dir.join("equity.csv"))?, &result.equity_curve)?;
    Ok(())
}

async fn run_backtest_command(
    config_path: &Path,
    symbol: Option<&str>,
    output: Option<&Path>,
    json: bool,
    source: &SourceArgs,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(e) => return fail(e),
    };
    if symbol.is_none() {
        if let Err(e) = validate_backtest_config(&adapter) {
            return fail(e);
        }
    }
    if let Err(e) = validate_strategy_config(&adapter) {
        return fail(e);
    }
    let strategy = match build_strategy(&adapter) {
        Ok(s) => s,
        Err((e, signals)) => return fail_strategy(e, &signals),
    };
    eprintln!("Loading strategy: {}", strategy.name);

    let prepared = (|| {
        Ok::<_, SigtraderError>((
            build_backtest_config(&adapter)?,
            build_fetch_request(&adapter, symbol)?,
            data_port(source, Some(&adapter))?,
        ))
    })();
    let (bt_config, request, port) = match prepared {
        Ok(p) => p,
        Err(e) => return fail(e),
    };

    let cancel = cancel_token(source.timeout_secs);
    let report = match run_backtest_pipeline(port.as_ref(), &request, &strategy, &bt_config, &cancel).await {
        Ok(r) => r,
        Err(e) => return fail(e),
    };
    print_summary(&strategy, &report);

    if let Some(dir) = output {
        if let Err(e) = write_backtest_outputs(dir, &report.result) {
            return fail(e);
        }
        eprintln!("\nTrades and equity written to: {}", dir.display());
    }
    if json {
        match serde_json::to_string_pretty(&report.result) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("error: failed to serialize result: {e}");
                return ExitCode::from(1);
            }
        }
    }
    ExitCode::SUCCESS
}

/// Fetch, keep the most recent `history_capacity` bars, evaluate the
/// strategy and render its latest signals.
pub async fn run_examples_pipeline(
    data_port: &dyn DataPort,
    request: &FetchRequest,
    strategy: &Strategy,
    extract: &ExtractConfig,
    history_capacity: usize,
    chart: &dyn ChartPort,
    cancel: &CancelToken,
) -> Result<Vec<ExampleRecord>, SigtraderError> {
    let fetched = load_series(data_port, request, cancel).await?;
    let mut history = PriceHistory::new(history_capacity);
    history.record_series(&fetched);
    let series = history.snapshot(&fetched.symbol, &fetched.interval);

    let evaluation = strategy.evaluate(&series.bars)?;
    find_examples(
        &series.symbol,
        &series.bars,
        &evaluation.composite,
        &evaluation.overlays,
        extract,
        chart,
    )
}

async fn run_examples_command(
    config_path: &Path,
    symbol: Option<&str>,
    output_dir: Option<PathBuf>,
    source: &SourceArgs,
) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(e) => return fail(e),
    };
    if let Err(e) = validate_strategy_config(&adapter).and_then(|()| validate_examples_config(&adapter)) {
        return fail(e);
    }
    let strategy = match build_strategy(&adapter) {
        Ok(s) => s,
        Err((e, signals)) => return fail_strategy(e, &signals),
    };
    let extract = build_extract_config(&adapter);
    let capacity = adapter
        .get_int("examples", "history_capacity", DEFAULT_HISTORY_CAPACITY)
        .max(1) as usize;
    let output_dir = output_dir
        .or_else(|| adapter.get_string("examples", "output_dir").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("examples_out"));

    let prepared = (|| {
        Ok::<_, SigtraderError>((
            build_fetch_request(&adapter, symbol)?,
            data_port(source, Some(&adapter))?,
        ))
    })();
    let (request, port) = match prepared {
        Ok(p) => p,
        Err(e) => return fail(e),
    };

    let chart = SvgChartAdapter::new(output_dir.clone());
    let cancel = cancel_token(source.timeout_secs);
    let records = match run_examples_pipeline(
        port.as_ref(),
        &request,
        &strategy,
        &extract,
        capacity,
        &chart,
        &cancel,
    )
    .await
    {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    if records.is_empty() {
        eprintln!("No signals found for {}", request.symbol);
    }
    match serde_json::to_string_pretty(&records) {
        Ok(text) => println!("{text}"),
        Err(e) => {
            eprintln!("error: failed to serialize examples: {e}");
            return ExitCode::from(1);
        }
    }
    eprintln!("{} examples written to {}", records.len(), output_dir.display());
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(e) => return fail(e),
    };

    let checks = validate_fetcher_config(&adapter)
        .and_then(|()| validate_backtest_config(&adapter))
        .and_then(|()| validate_strategy_config(&adapter))
        .and_then(|()| validate_examples_config(&adapter));
    if let Err(e) = checks {
        return fail(e);
    }

    let strategy = match build_strategy(&adapter) {
        Ok(s) => s,
        Err((e, signals)) => return fail_strategy(e, &signals),
    };

    eprintln!("\nStrategy: {}", strategy.name);
    for rule in &strategy.rules {
        eprintln!("  Rule:   {rule}");
    }
    eprintln!("  Logic:  {}", strategy.logic);
    if strategy.hold_bars > 0 {
        eprintln!("  Hold:   {} bars", strategy.hold_bars);
    }
    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}
