//! tickersnap CLI — export one ticker's metadata and price history to JSON.
//!
//! With no arguments it exports MSFT over the last month to
//! `MSFT_Data.json` in the current directory and prints the saved path.
//! Settings come from built-in defaults, then `--config`, then flags.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tickersnap_core::{ExportConfig, Exporter, YahooProvider};

#[derive(Parser)]
#[command(
    name = "tickersnap",
    about = "Save a ticker's metadata and price history as JSON"
)]
struct Cli {
    /// Ticker symbol (e.g., MSFT, NESN.SW, ^GSPC). Defaults to MSFT.
    ticker: Option<String>,

    /// Output file. Defaults to <TICKER>_Data.json.
    output: Option<PathBuf>,

    /// History window: 1d, 5d, 1mo, 3mo, 6mo, 1y, 2y, 5y, 10y, ytd, max.
    #[arg(long)]
    period: Option<String>,

    /// Bar size: 1m, 5m, 1h, 1d, 1wk, 1mo, ...
    #[arg(long)]
    interval: Option<String>,

    /// Name of the history index column. Defaults to the first column.
    #[arg(long)]
    index_column: Option<String>,

    /// Report raw OHLC plus an Adj Close column instead of adjusting prices.
    #[arg(long, default_value_t = false)]
    no_auto_adjust: bool,

    /// Leave out the Dividends and Stock Splits columns.
    #[arg(long, default_value_t = false)]
    no_actions: bool,

    /// HTTP timeout in seconds. Unset waits indefinitely.
    #[arg(long)]
    timeout: Option<u64>,

    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    /// Layer flags over the config file (or defaults).
    fn into_config(self) -> Result<ExportConfig> {
        let mut cfg = match &self.config {
            Some(path) => ExportConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => ExportConfig::default(),
        };

        if let Some(ticker) = self.ticker {
            cfg.ticker = ticker;
        }
        if self.output.is_some() {
            cfg.output = self.output;
        }
        if let Some(period) = self.period {
            cfg.period = period;
        }
        if let Some(interval) = self.interval {
            cfg.interval = interval;
        }
        if self.index_column.is_some() {
            cfg.index_column = self.index_column;
        }
        if self.no_auto_adjust {
            cfg.auto_adjust = false;
        }
        if self.no_actions {
            cfg.actions = false;
        }
        if self.timeout.is_some() {
            cfg.timeout_secs = self.timeout;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = Cli::parse().into_config()?;
    let provider =
        YahooProvider::new(cfg.yahoo_options()).context("setting up Yahoo Finance client")?;
    let output = cfg.output_path();

    let report = Exporter::new(&provider, cfg.export_options())
        .run(&cfg.ticker, &output)
        .with_context(|| format!("exporting {} to {}", cfg.ticker, output.display()))?;

    if report.is_degraded() {
        log::warn!(
            "[{}] export is incomplete (info: {:?}, history: {:?})",
            cfg.ticker,
            report.info,
            report.history
        );
    }

    println!("Saved data to: {}", report.path.display());
    Ok(())
}
