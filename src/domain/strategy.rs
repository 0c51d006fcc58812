//! Strategy composition: named signal rules, a combination logic and an
//! optional hold window.
//!
//! Rule list grammar (whitespace-insensitive):
//!
//! ```text
//! rules  := rule ("," rule)*
//! rule   := name [ "(" number ("," number)* ")" ]
//! name   := macd_cross | rsi | bollinger | sma_crossover | ema_crossover
//! ```
//!
//! Omitted parameters take their defaults, e.g. `rsi` is `rsi(14,30,70)`.

use std::fmt;

use crate::domain::error::{ParseError, SigtraderError};
use crate::domain::indicator::{
    BollingerFrame, MacdFrame, bollinger, calculate_bollinger, calculate_macd, calculate_rsi, macd,
    rsi,
};
use crate::domain::ohlcv::Bar;
use crate::domain::signal::{Logic, SignalSeries, combine, hold_signals};
use crate::domain::signal_rules::{
    DEFAULT_RSI_HIGH, DEFAULT_RSI_LOW, DEFAULT_SMA_FAST, DEFAULT_SMA_SLOW, bollinger_signal,
    ema_crossover_signal, macd_cross_signal, rsi_signal, sma_crossover_signal,
};

const DEFAULT_EMA_FAST: usize = 12;
const DEFAULT_EMA_SLOW: usize = 26;

#[derive(Debug, Clone, PartialEq)]
pub enum SignalRule {
    MacdCross { fast: usize, slow: usize, signal: usize },
    Rsi { window: usize, low: f64, high: f64 },
    Bollinger { window: usize, n_std: f64 },
    SmaCrossover { fast: usize, slow: usize },
    EmaCrossover { fast: usize, slow: usize },
}

/// What one rule produced: its signal plus any frame worth charting.
enum RuleOutput {
    Plain(SignalSeries),
    WithMacd(SignalSeries, MacdFrame),
    WithBollinger(SignalSeries, BollingerFrame),
}

impl SignalRule {
    fn evaluate(&self, bars: &[Bar]) -> RuleOutput {
        match *self {
            SignalRule::MacdCross { fast, slow, signal } => {
                let frame = calculate_macd(bars, fast, slow, signal);
                RuleOutput::WithMacd(macd_cross_signal(&frame), frame)
            }
            SignalRule::Rsi { window, low, high } => {
                RuleOutput::Plain(rsi_signal(&calculate_rsi(bars, window), low, high))
            }
            SignalRule::Bollinger { window, n_std } => {
                let frame = calculate_bollinger(bars, window, n_std);
                RuleOutput::WithBollinger(bollinger_signal(bars, &frame), frame)
            }
            SignalRule::SmaCrossover { fast, slow } => {
                RuleOutput::Plain(sma_crossover_signal(bars, fast, slow))
            }
            SignalRule::EmaCrossover { fast, slow } => {
                RuleOutput::Plain(ema_crossover_signal(bars, fast, slow))
            }
        }
    }

    fn from_parts(name: &str, params: &[f64]) -> Result<Self, SigtraderError> {
        let arity = |max: usize| -> Result<(), SigtraderError> {
            if params.len() > max {
                return Err(SigtraderError::invalid_rule(format!(
                    "{name} takes at most {max} parameters, got {}",
                    params.len()
                )));
            }
            Ok(())
        };
        let window = |idx: usize, default: usize| -> Result<usize, SigtraderError> {
            match params.get(idx) {
                None => Ok(default),
                Some(&v) if v >= 1.0 && v.fract() == 0.0 => Ok(v as usize),
                Some(&v) => Err(SigtraderError::invalid_rule(format!(
                    "{name}: window must be a positive integer, got {v}"
                ))),
            }
        };
        let real = |idx: usize, default: f64| params.get(idx).copied().unwrap_or(default);

        let rule = match name {
            "macd_cross" | "macd" => {
                arity(3)?;
                SignalRule::MacdCross {
                    fast: window(0, macd::DEFAULT_FAST)?,
                    slow: window(1, macd::DEFAULT_SLOW)?,
                    signal: window(2, macd::DEFAULT_SIGNAL)?,
                }
            }
            "rsi" => {
                arity(3)?;
                SignalRule::Rsi {
                    window: window(0, rsi::DEFAULT_PERIOD)?,
                    low: real(1, DEFAULT_RSI_LOW),
                    high: real(2, DEFAULT_RSI_HIGH),
                }
            }
            "bollinger" | "bb" => {
                arity(2)?;
                SignalRule::Bollinger {
                    window: window(0, bollinger::DEFAULT_PERIOD)?,
                    n_std: real(1, bollinger::DEFAULT_N_STD),
                }
            }
            "sma_crossover" | "sma_cross" => {
                arity(2)?;
                SignalRule::SmaCrossover {
                    fast: window(0, DEFAULT_SMA_FAST)?,
                    slow: window(1, DEFAULT_SMA_SLOW)?,
                }
            }
            "ema_crossover" | "ema_cross" => {
                arity(2)?;
                SignalRule::EmaCrossover {
                    fast: window(0, DEFAULT_EMA_FAST)?,
                    slow: window(1, DEFAULT_EMA_SLOW)?,
                }
            }
            other => {
                return Err(SigtraderError::invalid_rule(format!(
                    "unknown signal rule '{other}'"
                )));
            }
        };
        rule.validate()?;
        Ok(rule)
    }

    fn validate(&self) -> Result<(), SigtraderError> {
        match *self {
            SignalRule::MacdCross { fast, slow, .. }
            | SignalRule::SmaCrossover { fast, slow }
            | SignalRule::EmaCrossover { fast, slow }
                if fast >= slow =>
            {
                Err(SigtraderError::invalid_rule(format!(
                    "{self}: fast window must be shorter than slow window"
                )))
            }
            SignalRule::Rsi { low, high, .. }
                if !(0.0..=100.0).contains(&low) || !(0.0..=100.0).contains(&high) || low >= high =>
            {
                Err(SigtraderError::invalid_rule(format!(
                    "{self}: thresholds must satisfy 0 <= low < high <= 100"
                )))
            }
            SignalRule::Bollinger { n_std, .. } if n_std <= 0.0 || !n_std.is_finite() => {
                Err(SigtraderError::invalid_rule(format!(
                    "{self}: band width must be positive"
                )))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for SignalRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalRule::MacdCross { fast, slow, signal } => {
                write!(f, "macd_cross({fast},{slow},{signal})")
            }
            SignalRule::Rsi { window, low, high } => write!(f, "rsi({window},{low},{high})"),
            SignalRule::Bollinger { window, n_std } => write!(f, "bollinger({window},{n_std})"),
            SignalRule::SmaCrossover { fast, slow } => write!(f, "sma_crossover({fast},{slow})"),
            SignalRule::EmaCrossover { fast, slow } => write!(f, "ema_crossover({fast},{slow})"),
        }
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn error(&self, message: impl Into<String>, position: usize) -> ParseError {
        ParseError {
            message: message.into(),
            position,
        }
    }

    fn found(&self) -> String {
        self.peek()
            .map(|c| format!("'{c}'"))
            .unwrap_or_else(|| "end of input".to_string())
    }

    fn parse_ident(&mut self) -> Result<String, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
            self.advance();
        }
        if self.pos == start {
            return Err(self.error(format!("expected rule name, found {}", self.found()), start));
        }
        Ok(self.input[start..self.pos].to_lowercase())
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0;

        if self.peek() == Some('-') {
            self.advance();
        }
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }
        if digits == 0 {
            return Err(self.error("expected number", start));
        }
        self.input[start..self.pos]
            .parse()
            .map_err(|_| self.error("invalid number", start))
    }

    fn parse_params(&mut self) -> Result<Vec<f64>, ParseError> {
        self.skip_whitespace();
        if self.peek() != Some('(') {
            return Ok(Vec::new());
        }
        self.advance();
        let mut params = vec![self.parse_number()?];
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(',') => {
                    self.advance();
                    params.push(self.parse_number()?);
                }
                Some(')') => {
                    self.advance();
                    return Ok(params);
                }
                _ => {
                    let msg = format!("expected ',' or ')', found {}", self.found());
                    return Err(self.error(msg, self.pos));
                }
            }
        }
    }

    fn parse_rules(&mut self) -> Result<Vec<(String, Vec<f64>)>, ParseError> {
        let mut rules = Vec::new();
        loop {
            let name = self.parse_ident()?;
            let params = self.parse_params()?;
            rules.push((name, params));
            self.skip_whitespace();
            match self.peek() {
                None => return Ok(rules),
                Some(',') => {
                    self.advance();
                }
                Some(_) => {
                    let msg = format!("expected ',', found {}", self.found());
                    return Err(self.error(msg, self.pos));
                }
            }
        }
    }
}

/// Parse a comma-separated rule list such as `macd_cross, rsi(14,25,75)`.
pub fn parse_rules(input: &str) -> Result<Vec<SignalRule>, SigtraderError> {
    if input.trim().is_empty() {
        return Err(SigtraderError::invalid_rule("strategy has no signal rules"));
    }
    let parsed = Parser::new(input).parse_rules()?;
    parsed
        .into_iter()
        .map(|(name, params)| SignalRule::from_parts(&name, &params))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    pub name: String,
    pub rules: Vec<SignalRule>,
    pub logic: Logic,
    /// Bars each rule's signal is held for before combination; 0 disables.
    pub hold_bars: usize,
}

/// Indicator frames a strategy computed, kept for chart overlays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overlays {
    pub macd: Option<MacdFrame>,
    pub bollinger: Option<BollingerFrame>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyEvaluation {
    pub rule_signals: Vec<(String, SignalSeries)>,
    pub composite: SignalSeries,
    pub overlays: Overlays,
}

impl Strategy {
    pub fn new(
        name: impl Into<String>,
        rules: Vec<SignalRule>,
        logic: Logic,
        hold_bars: usize,
    ) -> Result<Self, SigtraderError> {
        if rules.is_empty() {
            return Err(SigtraderError::invalid_rule("strategy has no signal rules"));
        }
        Ok(Self {
            name: name.into(),
            rules,
            logic,
            hold_bars,
        })
    }

    pub fn parse(name: &str, rules: &str, logic: &str, hold_bars: usize) -> Result<Self, SigtraderError> {
        Self::new(name, parse_rules(rules)?, logic.parse()?, hold_bars)
    }

    pub fn evaluate(&self, bars: &[Bar]) -> Result<StrategyEvaluation, SigtraderError> {
        let mut overlays = Overlays::default();
        let mut rule_signals = Vec::with_capacity(self.rules.len());

        for rule in &self.rules {
            let signal = match rule.evaluate(bars) {
                RuleOutput::Plain(s) => s,
                RuleOutput::WithMacd(s, frame) => {
                    overlays.macd.get_or_insert(frame);
                    s
                }
                RuleOutput::WithBollinger(s, frame) => {
                    overlays.bollinger.get_or_insert(frame);
                    s
                }
            };
            let signal = if self.hold_bars > 0 {
                hold_signals(&signal, self.hold_bars)
            } else {
                signal
            };
            rule_signals.push((rule.to_string(), signal));
        }

        let signals: Vec<SignalSeries> = rule_signals.iter().map(|(_, s)| s.clone()).collect();
        let composite = combine(&signals, self.logic)?;
        Ok(StrategyEvaluation {
            rule_signals,
            composite,
            overlays,
        })
    }
}
