//! Export configuration.
//!
//! Loaded from an optional TOML file; every key is optional and falls back
//! to the built-in defaults (`MSFT`, `MSFT_Data.json`, `1mo`, daily bars).
//! Command-line flags are applied on top by the CLI.

use crate::export::ExportOptions;
use crate::normalize::IndexColumn;
use crate::provider::{HistoryWindow, Interval};
use crate::yahoo::YahooOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    /// Instrument to export.
    pub ticker: String,
    /// Destination file. Defaults to `<ticker>_Data.json`.
    pub output: Option<PathBuf>,
    /// History window token, passed to the provider as-is.
    pub period: String,
    /// Bar size token.
    pub interval: String,
    /// Name of the history index column. Unset means "first column".
    pub index_column: Option<String>,
    pub auto_adjust: bool,
    /// Include dividend and split columns.
    pub actions: bool,
    /// HTTP timeout. Unset waits indefinitely.
    pub timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            ticker: "MSFT".to_string(),
            output: None,
            period: "1mo".to_string(),
            interval: "1d".to_string(),
            index_column: None,
            auto_adjust: true,
            actions: true,
            timeout_secs: None,
            user_agent: None,
        }
    }
}

impl ExportConfig {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ticker.trim().is_empty() {
            return Err(ConfigError::Invalid("ticker must not be empty".into()));
        }
        if self.period.trim().is_empty() {
            return Err(ConfigError::Invalid("period must not be empty".into()));
        }
        if self.interval.trim().is_empty() {
            return Err(ConfigError::Invalid("interval must not be empty".into()));
        }
        if self.output.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
            return Err(ConfigError::Invalid("output path must not be empty".into()));
        }
        if self.timeout_secs == Some(0) {
            return Err(ConfigError::Invalid("timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}_Data.json", self.ticker)))
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            window: HistoryWindow::new(self.period.as_str()),
            interval: Interval::new(self.interval.as_str()),
            index_column: IndexColumn::from_name(self.index_column.clone()),
        }
    }

    pub fn yahoo_options(&self) -> YahooOptions {
        let defaults = YahooOptions::default();
        YahooOptions {
            user_agent: self.user_agent.clone().unwrap_or(defaults.user_agent),
            timeout: self.timeout_secs.map(Duration::from_secs),
            auto_adjust: self.auto_adjust,
            actions: self.actions,
        }
    }
}
