//! tickersnap core — fetch a ticker's metadata and price history and export it as JSON.
//!
//! This crate contains the whole pipeline:
//! - Data model for the exported document (`info` + `history`)
//! - Indexed history tables and their flattening into row records
//! - Market data provider trait, with a Yahoo Finance implementation
//! - Explicit fallback outcomes for provider failures
//! - The export pipeline and its JSON writer
//! - TOML-backed export configuration

pub mod config;
pub mod export;
pub mod fetch;
pub mod model;
pub mod normalize;
pub mod provider;
pub mod table;
pub mod yahoo;

pub use config::{ConfigError, ExportConfig};
pub use export::{export, export_with_report, ExportError, ExportOptions, ExportReport, Exporter};
pub use fetch::{Fetched, SectionStatus};
pub use model::{ExportDocument, HistoryRecord, MetadataRecord};
pub use normalize::{normalize_history, IndexColumn};
pub use provider::{HistoryWindow, Interval, MarketDataProvider, ProviderError, Ticker};
pub use table::{Cell, FlatTable, HistoryTable, TableError};
pub use yahoo::{YahooOptions, YahooProvider};
