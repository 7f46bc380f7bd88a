//! Yahoo Finance data provider.
//!
//! History comes from the v8 chart API; metadata from the v10 quoteSummary
//! API, which only answers requests that carry a session cookie and the
//! matching crumb token. Both are fetched once per provider and reused.
//!
//! Yahoo Finance has no official API and is subject to unannounced format
//! changes. Every parse failure maps to `ProviderError::ResponseFormatChanged`.

use crate::model::MetadataRecord;
use crate::provider::{HistoryWindow, Interval, MarketDataProvider, ProviderError};
use crate::table::{Cell, HistoryTable};
use chrono::{DateTime, FixedOffset, Offset, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

const CHART_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";
const QUOTE_SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";
const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_URL: &str = "https://query2.finance.yahoo.com/v1/test/getcrumb";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// quoteSummary modules merged into the metadata record, in merge order.
pub const QUOTE_SUMMARY_MODULES: &[&str] = &[
    "assetProfile",
    "summaryProfile",
    "summaryDetail",
    "quoteType",
    "defaultKeyStatistics",
    "financialData",
    "price",
];

/// Keys whose formatted rendering is kept instead of the raw number.
const FORMATTED_KEYS: &[&str] = &["regularMarketTime", "postMarketTime", "preMarketTime"];

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ApiError>,
}

/// Error object shared by the chart and quoteSummary APIs.
#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
    events: Option<Events>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartMeta {
    /// Exchange UTC offset in seconds.
    #[serde(default)]
    gmtoffset: i32,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

#[derive(Debug, Default, Deserialize)]
struct Events {
    #[serde(default)]
    dividends: HashMap<String, DividendEvent>,
    #[serde(default)]
    splits: HashMap<String, SplitEvent>,
}

#[derive(Debug, Deserialize)]
struct DividendEvent {
    amount: f64,
    date: i64,
}

#[derive(Debug, Deserialize)]
struct SplitEvent {
    date: i64,
    numerator: f64,
    denominator: f64,
}

/// Yahoo Finance v10 quoteSummary API response.
#[derive(Debug, Deserialize)]
struct QuoteSummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummaryResult,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryResult {
    result: Option<Vec<Map<String, Value>>>,
    error: Option<ApiError>,
}

/// Knobs for the Yahoo provider.
#[derive(Debug, Clone)]
pub struct YahooOptions {
    pub user_agent: String,
    /// `None` waits as long as the server does.
    pub timeout: Option<Duration>,
    /// Scale OHLC by the adjusted close instead of emitting `Adj Close`.
    pub auto_adjust: bool,
    /// Include `Dividends` and `Stock Splits` columns.
    pub actions: bool,
}

impl Default for YahooOptions {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: None,
            auto_adjust: true,
            actions: true,
        }
    }
}

/// Yahoo Finance data provider.
pub struct YahooProvider {
    client: reqwest::blocking::Client,
    options: YahooOptions,
    crumb: Mutex<Option<String>>,
}

impl YahooProvider {
    pub fn new(options: YahooOptions) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .timeout(options.timeout)
            .user_agent(options.user_agent.as_str())
            .build()
            .map_err(|e| ProviderError::Client(e.to_string()))?;

        Ok(Self {
            client,
            options,
            crumb: Mutex::new(None),
        })
    }

    pub fn options(&self) -> &YahooOptions {
        &self.options
    }

    /// Session crumb, fetched on first use.
    fn crumb(&self) -> Result<String, ProviderError> {
        let mut cached = self.crumb.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(crumb) = cached.as_ref() {
            return Ok(crumb.clone());
        }

        // Answers 404, but the response still sets the session cookie.
        log::debug!("GET {COOKIE_URL}");
        self.client.get(COOKIE_URL).send().map_err(network)?;

        log::debug!("GET {CRUMB_URL}");
        let resp = self.client.get(CRUMB_URL).send().map_err(network)?;
        let status = resp.status();
        let body = resp.text().map_err(network)?;
        let crumb = body.trim();
        if !status.is_success() || !is_plausible_crumb(crumb) {
            return Err(ProviderError::Session(format!(
                "no crumb returned (HTTP {status})"
            )));
        }

        *cached = Some(crumb.to_string());
        Ok(crumb.to_string())
    }

    /// Send a request and decode its JSON body.
    ///
    /// Yahoo reports unknown symbols with a 404 whose body still carries a
    /// structured error, so the body is decoded regardless of status.
    fn get_json<T: DeserializeOwned>(
        &self,
        symbol: &str,
        request: reqwest::blocking::RequestBuilder,
    ) -> Result<T, ProviderError> {
        let resp = request.send().map_err(network)?;
        let status = resp.status();
        log::debug!("{} -> HTTP {status}", resp.url());
        let body = resp.text().map_err(network)?;

        match serde_json::from_str(&body) {
            Ok(parsed) => Ok(parsed),
            Err(e) if status.is_success() => Err(ProviderError::ResponseFormatChanged(format!(
                "failed to parse response for {symbol}: {e}"
            ))),
            Err(_) => Err(ProviderError::Http {
                status: status.as_u16(),
                symbol: symbol.to_string(),
            }),
        }
    }
}

impl MarketDataProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn metadata(&self, symbol: &str) -> Result<MetadataRecord, ProviderError> {
        let crumb = self.crumb()?;
        let modules = QUOTE_SUMMARY_MODULES.join(",");
        let request = self
            .client
            .get(format!("{QUOTE_SUMMARY_URL}/{symbol}"))
            .query(&[("modules", modules.as_str()), ("crumb", crumb.as_str())]);

        let resp: QuoteSummaryResponse = self.get_json(symbol, request)?;
        parse_quote_summary(symbol, resp)
    }

    fn history(
        &self,
        symbol: &str,
        window: &HistoryWindow,
        interval: &Interval,
    ) -> Result<HistoryTable, ProviderError> {
        let request = self.client.get(format!("{CHART_URL}/{symbol}")).query(&[
            ("range", window.as_str()),
            ("interval", interval.as_str()),
            ("events", "div,splits"),
            ("includeAdjustedClose", "true"),
        ]);

        let resp: ChartResponse = self.get_json(symbol, request)?;
        parse_chart(symbol, resp, interval, &self.options)
    }
}

fn network(e: reqwest::Error) -> ProviderError {
    ProviderError::Network(e.to_string())
}

fn is_plausible_crumb(crumb: &str) -> bool {
    !crumb.is_empty() && !crumb.contains('<') && !crumb.contains(char::is_whitespace)
}

fn api_error(symbol: &str, err: ApiError) -> ProviderError {
    if err.code == "Not Found" {
        ProviderError::SymbolNotFound {
            symbol: symbol.to_string(),
        }
    } else {
        ProviderError::Upstream {
            code: err.code,
            description: err.description,
        }
    }
}

/// Merge the quoteSummary modules into one flat mapping.
fn parse_quote_summary(
    symbol: &str,
    resp: QuoteSummaryResponse,
) -> Result<MetadataRecord, ProviderError> {
    let summary = resp.quote_summary;
    let mut modules = match (summary.result, summary.error) {
        (_, Some(err)) => return Err(api_error(symbol, err)),
        (Some(result), None) => result.into_iter().next().ok_or_else(|| {
            ProviderError::ResponseFormatChanged("quoteSummary result array is empty".into())
        })?,
        (None, None) => {
            return Err(ProviderError::ResponseFormatChanged(
                "empty quoteSummary with no error".into(),
            ))
        }
    };

    let mut info = MetadataRecord::new();
    for module in QUOTE_SUMMARY_MODULES {
        let Some(Value::Object(fields)) = modules.remove(*module) else {
            continue;
        };
        for (key, value) in fields {
            if key == "maxAge" || info.contains_key(&key) {
                continue;
            }
            let value = unwrap_value(&key, value);
            info.insert(key, value);
        }
    }

    if !info.contains_key("symbol") {
        info.insert("symbol".into(), Value::String(symbol.to_string()));
    }
    Ok(info)
}

/// Strip Yahoo's `{"raw": .., "fmt": ..}` wrappers and non-breaking spaces.
fn unwrap_value(key: &str, value: Value) -> Value {
    match value {
        Value::Object(mut obj) if obj.contains_key("raw") && obj.contains_key("fmt") => {
            let pick = if FORMATTED_KEYS.contains(&key) { "fmt" } else { "raw" };
            obj.remove(pick).unwrap_or(Value::Null)
        }
        Value::Object(obj) if obj.is_empty() => Value::Null,
        Value::Object(obj) => Value::Object(
            obj.into_iter()
                .map(|(k, v)| {
                    let v = unwrap_value(&k, v);
                    (k, v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(|v| unwrap_value("", v)).collect()),
        Value::String(s) => Value::String(s.replace('\u{a0}', " ")),
        other => other,
    }
}

/// Bar time in the exchange's offset. Daily and longer bars are pinned to
/// local midnight so the index reads as a trading date.
fn bar_time(ts: i64, offset: FixedOffset, intraday: bool) -> Result<DateTime<FixedOffset>, ProviderError> {
    let local = DateTime::from_timestamp(ts, 0)
        .ok_or_else(|| ProviderError::ResponseFormatChanged(format!("invalid timestamp: {ts}")))?
        .with_timezone(&offset);
    if intraday {
        return Ok(local);
    }
    local
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| offset.from_local_datetime(&midnight).single())
        .ok_or_else(|| ProviderError::ResponseFormatChanged(format!("invalid timestamp: {ts}")))
}

/// Parse the chart API response into an indexed history table.
fn parse_chart(
    symbol: &str,
    resp: ChartResponse,
    interval: &Interval,
    options: &YahooOptions,
) -> Result<HistoryTable, ProviderError> {
    let intraday = interval.is_intraday();
    let index_name = if intraday { "Datetime" } else { "Date" };

    let data = match (resp.chart.result, resp.chart.error) {
        (_, Some(err)) => return Err(api_error(symbol, err)),
        (Some(result), None) => result
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ResponseFormatChanged("result array is empty".into()))?,
        (None, None) => {
            return Err(ProviderError::ResponseFormatChanged(
                "empty result with no error".into(),
            ))
        }
    };

    // A window with no trading has no timestamps at all.
    let Some(timestamps) = data.timestamp else {
        return Ok(HistoryTable::empty(index_name));
    };

    let offset = FixedOffset::east_opt(data.meta.gmtoffset).unwrap_or_else(|| Utc.fix());
    let quote = data.indicators.quote.into_iter().next().unwrap_or_default();
    let adj_closes = data
        .indicators
        .adjclose
        .and_then(|v| v.into_iter().next())
        .map(|a| a.adjclose);

    let events = data.events.unwrap_or_default();
    let mut dividends: HashMap<DateTime<FixedOffset>, f64> = HashMap::new();
    for ev in events.dividends.into_values() {
        *dividends.entry(bar_time(ev.date, offset, intraday)?).or_default() += ev.amount;
    }
    let mut splits: HashMap<DateTime<FixedOffset>, f64> = HashMap::new();
    for ev in events.splits.into_values() {
        if ev.denominator != 0.0 {
            splits.insert(bar_time(ev.date, offset, intraday)?, ev.numerator / ev.denominator);
        }
    }

    let n = timestamps.len();
    let mut index = Vec::with_capacity(n);
    let mut opens = Vec::with_capacity(n);
    let mut highs = Vec::with_capacity(n);
    let mut lows = Vec::with_capacity(n);
    let mut closes = Vec::with_capacity(n);
    let mut adj = Vec::with_capacity(n);
    let mut volumes = Vec::with_capacity(n);
    let mut divs = Vec::with_capacity(n);
    let mut spl = Vec::with_capacity(n);

    for (i, &ts) in timestamps.iter().enumerate() {
        let open = quote.open.get(i).copied().flatten();
        let high = quote.high.get(i).copied().flatten();
        let low = quote.low.get(i).copied().flatten();
        let close = quote.close.get(i).copied().flatten();
        let volume = quote.volume.get(i).copied().flatten();
        let adj_close = adj_closes.as_ref().and_then(|v| v.get(i).copied().flatten());

        // Skip bars where all OHLCV are None (holidays/non-trading days)
        if open.is_none() && high.is_none() && low.is_none() && close.is_none() && volume.is_none() {
            continue;
        }

        let stamp = bar_time(ts, offset, intraday)?;
        let (open, high, low, close) = match (options.auto_adjust, close, adj_close) {
            (true, Some(c), Some(a)) if c != 0.0 => {
                let ratio = a / c;
                (open.map(|x| x * ratio), high.map(|x| x * ratio), low.map(|x| x * ratio), Some(a))
            }
            _ => (open, high, low, close),
        };

        opens.push(Cell::float(open));
        highs.push(Cell::float(high));
        lows.push(Cell::float(low));
        closes.push(Cell::float(close));
        adj.push(Cell::float(adj_close));
        volumes.push(Cell::int(volume));
        divs.push(Cell::float(Some(dividends.get(&stamp).copied().unwrap_or(0.0))));
        spl.push(Cell::float(Some(splits.get(&stamp).copied().unwrap_or(0.0))));
        index.push(Cell::Timestamp(stamp));
    }

    let mut columns = vec![("Open", opens), ("High", highs), ("Low", lows), ("Close", closes)];
    if !options.auto_adjust {
        columns.push(("Adj Close", adj));
    }
    columns.push(("Volume", volumes));
    if options.actions {
        columns.push(("Dividends", divs));
        columns.push(("Stock Splits", spl));
    }

    let mut table = HistoryTable::new(index_name, index);
    for (name, values) in columns {
        table
            .push_column(name, values)
            .map_err(|e| ProviderError::ResponseFormatChanged(e.to_string()))?;
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // 2024-01-02 and 2024-01-03, 09:30 New York time.
    const CHART_BODY: &str = r#"{
      "chart": {
        "result": [{
          "meta": {"currency": "USD", "symbol": "MSFT", "gmtoffset": -18000, "exchangeTimezoneName": "America/New_York"},
          "timestamp": [1704205800, 1704292200, 1704378600],
          "events": {
            "dividends": {"1704292200": {"amount": 0.75, "date": 1704292200}}
          },
          "indicators": {
            "quote": [{
              "open":   [373.86, 369.01, null],
              "high":   [375.90, 373.26, null],
              "low":    [366.77, 368.51, null],
              "close":  [370.87, 370.60, null],
              "volume": [25258600, 23083500, null]
            }],
            "adjclose": [{"adjclose": [370.87, 370.60, null]}]
          }
        }],
        "error": null
      }
    }"#;

    fn chart(body: &str) -> ChartResponse {
        serde_json::from_str(body).unwrap()
    }

    fn daily() -> Interval {
        Interval::new("1d")
    }

    #[test]
    fn parses_daily_bars_at_local_midnight() {
        let table = parse_chart("MSFT", chart(CHART_BODY), &daily(), &YahooOptions::default()).unwrap();
        assert_eq!(table.index_name(), "Date");
        // Third bar is all-null and dropped.
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.index()[0].to_iso8601().unwrap(),
            "2024-01-02T00:00:00-05:00"
        );
        let names: Vec<&str> = table.column_names().collect();
        assert_eq!(
            names,
            ["Open", "High", "Low", "Close", "Volume", "Dividends", "Stock Splits"]
        );
    }

    #[test]
    fn joins_dividends_to_matching_bar() {
        let table = parse_chart("MSFT", chart(CHART_BODY), &daily(), &YahooOptions::default()).unwrap();
        let divs = table.column("Dividends").unwrap();
        assert_eq!(divs[0].as_f64(), Some(0.0));
        assert_eq!(divs[1].as_f64(), Some(0.75));
    }

    #[test]
    fn intraday_keeps_time_of_day() {
        let table =
            parse_chart("MSFT", chart(CHART_BODY), &Interval::new("1h"), &YahooOptions::default())
                .unwrap();
        assert_eq!(table.index_name(), "Datetime");
        assert_eq!(
            table.index()[0].to_iso8601().unwrap(),
            "2024-01-02T09:30:00-05:00"
        );
    }

    #[test]
    fn unadjusted_adds_adj_close_and_drops_actions() {
        let opts = YahooOptions {
            auto_adjust: false,
            actions: false,
            ..YahooOptions::default()
        };
        let table = parse_chart("MSFT", chart(CHART_BODY), &daily(), &opts).unwrap();
        let names: Vec<&str> = table.column_names().collect();
        assert_eq!(names, ["Open", "High", "Low", "Close", "Adj Close", "Volume"]);
    }

    #[test]
    fn auto_adjust_scales_by_adjusted_close() {
        let body = CHART_BODY.replace(
            r#""adjclose": [370.87, 370.60, null]"#,
            r#""adjclose": [185.435, 370.60, null]"#,
        );
        let table = parse_chart("MSFT", chart(&body), &daily(), &YahooOptions::default()).unwrap();
        let open = table.column("Open").unwrap()[0].as_f64().unwrap();
        let close = table.column("Close").unwrap()[0].as_f64().unwrap();
        assert!((open - 373.86 / 2.0).abs() < 1e-9);
        assert!((close - 185.435).abs() < 1e-9);
    }

    #[test]
    fn not_found_maps_to_symbol_not_found() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let err = parse_chart("ZZZZ", chart(body), &daily(), &YahooOptions::default()).unwrap_err();
        assert_eq!(
            err,
            ProviderError::SymbolNotFound {
                symbol: "ZZZZ".into()
            }
        );
    }

    #[test]
    fn missing_timestamps_is_empty_table() {
        let body = r#"{"chart":{"result":[{"meta":{"gmtoffset":-18000},"indicators":{"quote":[{}],"adjclose":[{}]}}],"error":null}}"#;
        let table = parse_chart("MSFT", chart(body), &daily(), &YahooOptions::default()).unwrap();
        assert!(table.is_empty());
    }

    fn summary(body: Value) -> QuoteSummaryResponse {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn quote_summary_flattens_modules_in_order() {
        let body = json!({
            "quoteSummary": {
                "result": [{
                    "price": {"maxAge": 1, "longName": "Microsoft Corporation", "currency": "USD",
                              "regularMarketTime": {"raw": 1704402000, "fmt": "4:00PM EST"}},
                    "assetProfile": {"maxAge": 86400, "sector": "Technology",
                                     "longBusinessSummary": "Microsoft\u{a0}Corporation develops software.",
                                     "companyOfficers": [{"name": "Satya Nadella", "totalPay": {"raw": 7029512, "fmt": "7.03M", "longFmt": "7,029,512"}}]},
                    "summaryDetail": {"marketCap": {"raw": 2_750_000_000_000_i64, "fmt": "2.75T"},
                                      "currency": "EUR", "expireDate": {}}
                }],
                "error": null
            }
        });

        let info = parse_quote_summary("MSFT", summary(body)).unwrap();
        let keys: Vec<&str> = info.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            [
                "sector",
                "longBusinessSummary",
                "companyOfficers",
                "marketCap",
                "currency",
                "expireDate",
                "longName",
                "regularMarketTime",
                "symbol"
            ]
        );
        assert_eq!(info["marketCap"], json!(2_750_000_000_000_i64));
        // summaryDetail merges before price, so its currency wins.
        assert_eq!(info["currency"], json!("EUR"));
        assert_eq!(info["expireDate"], Value::Null);
        assert_eq!(info["regularMarketTime"], json!("4:00PM EST"));
        assert_eq!(info["longBusinessSummary"], json!("Microsoft Corporation develops software."));
        assert_eq!(info["companyOfficers"][0]["totalPay"], json!(7029512));
        assert_eq!(info["symbol"], json!("MSFT"));
    }

    #[test]
    fn quote_summary_error_is_surfaced() {
        let body = json!({"quoteSummary": {"result": null,
            "error": {"code": "Unauthorized", "description": "Invalid Crumb"}}});
        let err = parse_quote_summary("MSFT", summary(body)).unwrap_err();
        assert_eq!(
            err,
            ProviderError::Upstream {
                code: "Unauthorized".into(),
                description: "Invalid Crumb".into()
            }
        );
    }

    #[test]
    fn crumb_plausibility() {
        assert!(is_plausible_crumb("a1b2C3d4/Ef"));
        assert!(!is_plausible_crumb(""));
        assert!(!is_plausible_crumb("<html>Too Many Requests</html>"));
        assert!(!is_plausible_crumb("Too Many Requests"));
    }
}
