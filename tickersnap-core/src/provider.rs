//! Market data provider trait and structured error types.
//!
//! The MarketDataProvider trait abstracts over data sources so the export
//! pipeline can run against Yahoo Finance in production and a stub in tests.

use crate::fetch::Fetched;
use crate::model::MetadataRecord;
use crate::table::HistoryTable;
use std::fmt;
use thiserror::Error;

/// Structured error types for provider operations.
///
/// The export pipeline absorbs all of these; they surface only in logs and
/// in the export report.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("network unreachable: {0}")]
    Network(String),

    #[error("HTTP {status} for {symbol}")]
    Http { status: u16, symbol: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("provider error {code}: {description}")]
    Upstream { code: String, description: String },

    #[error("session setup failed: {0}")]
    Session(String),

    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

/// How far back to request history. Provider-defined (`1mo`, `ytd`, `max`, ...)
/// and passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HistoryWindow(String);

impl HistoryWindow {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self::new("1mo")
    }
}

impl fmt::Display for HistoryWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bar size (`1d`, `1wk`, `1h`, `5m`, ...). Provider-defined like the window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Interval(String);

impl Interval {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Minute and hour bars. `1mo` is monthly, not minutes.
    pub fn is_intraday(&self) -> bool {
        self.0.ends_with('m') || self.0.ends_with('h')
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self::new("1d")
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trait for market data providers.
///
/// Both operations may fail; callers decide what a failure means. The
/// export pipeline treats every failure as "no data".
pub trait MarketDataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Descriptive data about the instrument.
    fn metadata(&self, symbol: &str) -> Result<MetadataRecord, ProviderError>;

    /// Price bars over `window`, indexed by bar time.
    fn history(
        &self,
        symbol: &str,
        window: &HistoryWindow,
        interval: &Interval,
    ) -> Result<HistoryTable, ProviderError>;
}

/// Handle to one instrument at one provider.
pub struct Ticker<'p> {
    provider: &'p dyn MarketDataProvider,
    symbol: String,
}

impl<'p> Ticker<'p> {
    pub fn new(provider: &'p dyn MarketDataProvider, symbol: impl Into<String>) -> Self {
        Self {
            provider,
            symbol: symbol.into(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Metadata, or an empty mapping if the provider failed.
    pub fn info(&self) -> Fetched<MetadataRecord> {
        let fetched = Fetched::from_result(self.provider.metadata(&self.symbol));
        if let Some(reason) = fetched.reason() {
            log::warn!(
                "[{}] metadata unavailable from {}: {reason}; using an empty mapping",
                self.symbol,
                self.provider.name()
            );
        }
        fetched
    }

    /// History over `window`, or an empty table if the provider failed.
    pub fn history(&self, window: &HistoryWindow, interval: &Interval) -> Fetched<HistoryTable> {
        let result = self.provider.history(&self.symbol, window, interval);
        let fetched = Fetched::from_result_or_else(result, || HistoryTable::empty("Date"));
        if let Some(reason) = fetched.reason() {
            log::warn!(
                "[{}] {window} history unavailable from {}: {reason}; using an empty array",
                self.symbol,
                self.provider.name()
            );
        }
        fetched
    }
}
