//! Domain error types.

/// A parse error with position information for strategy rule parsing.
#[derive(Debug, Clone, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Top-level error type for sigtrader.
#[derive(Debug, thiserror::Error)]
pub enum SigtraderError {
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error(transparent)]
    RuleParse(#[from] ParseError),

    #[error("invalid rule: {reason}")]
    InvalidRule { reason: String },

    /// The primary source cannot serve this symbol/interval. Absorbed by the
    /// fetcher's fallback and never returned from `fetch`.
    #[error("{source_name} unavailable: {reason}")]
    UpstreamUnavailable {
        source_name: &'static str,
        reason: String,
    },

    #[error("{source_name} rejected credentials (HTTP {status}): {message}")]
    Unauthorized {
        source_name: &'static str,
        status: u16,
        message: String,
    },

    #[error("{source_name} error{}: {message}", .status.map(|s| format!(" {s}")).unwrap_or_default())]
    Upstream {
        source_name: &'static str,
        status: Option<u16>,
        message: String,
    },

    #[error("{source_name} transport failure: {reason}")]
    Transport {
        source_name: &'static str,
        reason: String,
    },

    #[error("unexpected response from {source_name}: {reason}")]
    ResponseFormat {
        source_name: &'static str,
        reason: String,
    },

    #[error("no data for {symbol} ({interval}) in the requested range")]
    NoData { symbol: String, interval: String },

    #[error("fetch cancelled")]
    Cancelled,

    #[error("fetch deadline exceeded")]
    DeadlineExceeded,

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("csv error: {reason}")]
    Csv { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SigtraderError {
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        SigtraderError::InvalidRequest {
            reason: reason.into(),
        }
    }

    pub fn invalid_rule(reason: impl Into<String>) -> Self {
        SigtraderError::InvalidRule {
            reason: reason.into(),
        }
    }

    /// HTTP status carried by upstream failures, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            SigtraderError::Unauthorized { status, .. } => Some(*status),
            SigtraderError::Upstream { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<csv::Error> for SigtraderError {
    fn from(err: csv::Error) -> Self {
        SigtraderError::Csv {
            reason: err.to_string(),
        }
    }
}

impl From<&SigtraderError> for std::process::ExitCode {
    fn from(err: &SigtraderError) -> Self {
        let code: u8 = match err {
            SigtraderError::Io(_) | SigtraderError::Csv { .. } => 1,
            SigtraderError::ConfigParse { .. }
            | SigtraderError::ConfigMissing { .. }
            | SigtraderError::ConfigInvalid { .. } => 2,
            SigtraderError::UpstreamUnavailable { .. }
            | SigtraderError::Unauthorized { .. }
            | SigtraderError::Upstream { .. }
            | SigtraderError::Transport { .. }
            | SigtraderError::ResponseFormat { .. } => 3,
            SigtraderError::InvalidRequest { .. }
            | SigtraderError::RuleParse(_)
            | SigtraderError::InvalidRule { .. } => 4,
            SigtraderError::NoData { .. } => 5,
            SigtraderError::Cancelled | SigtraderError::DeadlineExceeded => 6,
        };
        std::process::ExitCode::from(code)
    }
}
