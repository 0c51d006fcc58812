//! INI file configuration adapter.

use std::path::Path;

use configparser::ini::Ini;
use tracing::debug;

use crate::domain::error::SigtraderError;
use crate::ports::config_port::ConfigPort;

/// Environment variables that take precedence over the file.
pub const ENV_OVERRIDES: &[(&str, &str, &str)] = &[
    ("COINGECKO_API_KEY", "fetcher", "coingecko_api_key"),
    ("COINGECKO_BASE_URL", "fetcher", "coingecko_base_url"),
    ("COINGECKO_API_KEY_HEADER", "fetcher", "coingecko_api_key_header"),
    ("COINGECKO_API_KEY_PARAM", "fetcher", "coingecko_api_key_param"),
];

#[derive(Debug)]
pub struct FileConfigAdapter {
    config: Ini,
}

/// Trim whitespace and one pair of matching surrounding quotes.
pub fn clean_value(raw: &str) -> String {
    let trimmed = raw.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|s| s.strip_suffix(quote))
        {
            return inner.trim().to_string();
        }
    }
    trimmed.to_string()
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SigtraderError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| SigtraderError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, SigtraderError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| SigtraderError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    /// An empty configuration; every lookup falls back to its default.
    pub fn empty() -> Self {
        Self { config: Ini::new() }
    }

    /// Apply `(variable, value)` pairs mapped through [`ENV_OVERRIDES`].
    /// Blank values are ignored.
    pub fn with_overrides<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (var, value) in vars {
            let value = clean_value(&value);
            if value.is_empty() {
                continue;
            }
            if let Some((_, section, key)) = ENV_OVERRIDES.iter().find(|(name, _, _)| *name == var) {
                debug!(var = %var, section, key, "config overridden from environment");
                self.config.set(section, key, Some(value));
            }
        }
        self
    }

    pub fn with_env(self) -> Self {
        let vars = ENV_OVERRIDES
            .iter()
            .filter_map(|(name, _, _)| std::env::var(name).ok().map(|v| (name.to_string(), v)));
        self.with_overrides(vars)
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config
            .get(section, key)
            .map(|v| clean_value(&v))
            .filter(|v| !v.is_empty())
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.get_string(section, key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.get_string(section, key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }
}
