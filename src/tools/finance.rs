//! Financial data from Yahoo Finance's public JSON endpoints.
//!
//! Four functions mirror what an analyst desk would reach for first: last
//! price, recent news, a short profile, and analyst price targets. Every
//! result carries its source and a UTC retrieval timestamp.

use super::{BROWSER_USER_AGENT, Capability, required_str, truncate};
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::llm::ToolDef;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

const BASE_URL: &str = "https://query1.finance.yahoo.com";
const SOURCE: &str = "Yahoo Finance";

pub struct FinanceData {
    http: HttpClient,
    base_url: String,
    news_count: usize,
}

impl FinanceData {
    pub fn new(news_count: usize) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(BROWSER_USER_AGENT)?,
            base_url: BASE_URL.into(),
            news_count: news_count.max(1),
        })
    }

    async fn stock_price(&self, symbol: &str) -> Result<String> {
        let url = self.url(
            &format!("/v8/finance/chart/{symbol}"),
            &[("range", "1d"), ("interval", "1d")],
        )?;
        let body = self.http.get_text(url.as_str()).await?;
        format_price(&body, Utc::now())
    }

    async fn company_news(&self, symbol: &str, count: usize) -> Result<String> {
        let count = count.to_string();
        let url = self.url(
            "/v1/finance/search",
            &[("q", symbol), ("quotesCount", "0"), ("newsCount", count.as_str())],
        )?;
        let body = self.http.get_text(url.as_str()).await?;
        format_news(symbol, &body, Utc::now())
    }

    async fn company_profile(&self, symbol: &str) -> Result<String> {
        let url = self.url(
            "/v1/finance/search",
            &[("q", symbol), ("quotesCount", "1"), ("newsCount", "0")],
        )?;
        let body = self.http.get_text(url.as_str()).await?;
        format_profile(symbol, &body, Utc::now())
    }

    async fn price_targets(&self, symbol: &str) -> Result<String> {
        let url = self.url(
            &format!("/v10/finance/quoteSummary/{symbol}"),
            &[("modules", "financialData")],
        )?;
        let body = self.http.get_text(url.as_str()).await?;
        format_price_targets(symbol, &body, Utc::now())
    }

    fn url(&self, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        Url::parse_with_params(&format!("{}{path}", self.base_url), params)
            .map_err(|e| Error::parse(format!("finance URL: {e}")))
    }
}

#[async_trait]
impl Capability for FinanceData {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn functions(&self) -> Vec<ToolDef> {
        let symbol_only = json!({
            "type": "object",
            "properties": {
                "symbol": {
                    "type": "string",
                    "description": "Ticker symbol, e.g. AAPL, MSFT, BTC-USD, ^GSPC."
                }
            },
            "required": ["symbol"]
        });
        vec![
            ToolDef {
                name: "get_stock_price".into(),
                description: "Get the latest price of a stock, index, ETF or crypto pair, with \
                              previous close, day range, 52-week range and volume."
                    .into(),
                parameters: symbol_only.clone(),
            },
            ToolDef {
                name: "get_company_news".into(),
                description: "Get recent news headlines for a symbol with publisher, link and \
                              publication time."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "symbol": {
                            "type": "string",
                            "description": "Ticker symbol."
                        },
                        "num_stories": {
                            "type": "integer",
                            "description": format!("Number of stories (default {}).", self.news_count)
                        }
                    },
                    "required": ["symbol"]
                }),
            },
            ToolDef {
                name: "get_company_profile".into(),
                description: "Get the name, exchange, asset type, sector and industry of a symbol."
                    .into(),
                parameters: symbol_only.clone(),
            },
            ToolDef {
                name: "get_price_targets".into(),
                description: "Get analyst price targets (low, mean, median, high), the consensus \
                              recommendation and the number of analysts."
                    .into(),
                parameters: symbol_only,
            },
        ]
    }

    async fn dispatch(&self, function: &str, input: &Value) -> (String, bool) {
        if !matches!(
            function,
            "get_stock_price" | "get_company_news" | "get_company_profile" | "get_price_targets"
        ) {
            return (format!("Unknown tool: {function}"), true);
        }
        let symbol = match required_str(input, "symbol") {
            Ok(s) => s.to_uppercase(),
            Err(e) => return (e, true),
        };
        if !is_valid_symbol(&symbol) {
            return (format!("Invalid symbol: {symbol}"), true);
        }

        debug!(function, symbol = %symbol, "finance call");
        let result = match function {
            "get_stock_price" => self.stock_price(&symbol).await,
            "get_company_news" => {
                let count = input["num_stories"]
                    .as_u64()
                    .map(|n| (n as usize).clamp(1, 20))
                    .unwrap_or(self.news_count);
                self.company_news(&symbol, count).await
            }
            "get_company_profile" => self.company_profile(&symbol).await,
            "get_price_targets" => self.price_targets(&symbol).await,
            _ => return (format!("Unknown tool: {function}"), true),
        };

        match result {
            Ok(text) => (truncate(text), false),
            Err(e) => (format!("{function}({symbol}) failed: {e}"), true),
        }
    }
}

/// Tickers are short and drawn from a small alphabet; anything else would
/// end up interpolated into a URL path.
pub fn is_valid_symbol(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol.len() <= 24
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '^' | '=' | '_'))
}

fn stamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn from_unix(ts: i64) -> Option<String> {
    DateTime::from_timestamp(ts, 0).map(stamp)
}

fn fmt_num(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.2}")).unwrap_or_else(|| "n/a".into())
}

// -- chart --

#[derive(Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    error: Option<YahooError>,
}

#[derive(Deserialize)]
struct ChartResult {
    meta: ChartMeta,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    symbol: String,
    currency: Option<String>,
    exchange_name: Option<String>,
    instrument_type: Option<String>,
    long_name: Option<String>,
    short_name: Option<String>,
    regular_market_price: Option<f64>,
    chart_previous_close: Option<f64>,
    previous_close: Option<f64>,
    regular_market_day_high: Option<f64>,
    regular_market_day_low: Option<f64>,
    regular_market_volume: Option<u64>,
    fifty_two_week_high: Option<f64>,
    fifty_two_week_low: Option<f64>,
    regular_market_time: Option<i64>,
}

#[derive(Deserialize)]
struct YahooError {
    code: Option<String>,
    description: Option<String>,
}

impl YahooError {
    fn into_error(self) -> Error {
        Error::api(
            SOURCE,
            format!(
                "{}: {}",
                self.code.unwrap_or_else(|| "error".into()),
                self.description.unwrap_or_default()
            ),
        )
    }
}

pub fn format_price(body: &str, retrieved: DateTime<Utc>) -> Result<String> {
    let envelope: ChartEnvelope =
        serde_json::from_str(body).map_err(|e| Error::parse(format!("chart response: {e}")))?;
    if let Some(err) = envelope.chart.error {
        return Err(err.into_error());
    }
    let meta = envelope
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .map(|r| r.meta)
        .ok_or_else(|| Error::parse("chart response has no result"))?;

    let price = meta
        .regular_market_price
        .ok_or_else(|| Error::parse(format!("no market price for {}", meta.symbol)))?;
    let previous = meta.previous_close.or(meta.chart_previous_close);
    let change = previous
        .filter(|p| *p != 0.0)
        .map(|p| format!("{:+.2} ({:+.2}%)", price - p, (price - p) / p * 100.0))
        .unwrap_or_else(|| "n/a".into());
    let name = meta.long_name.or(meta.short_name).unwrap_or_default();
    let currency = meta.currency.unwrap_or_default();

    let mut out = format!("{} {}\n", meta.symbol, name).trim_end().to_string();
    out.push('\n');
    out.push_str(&format!("Price: {price:.2} {currency}\n"));
    out.push_str(&format!("Change vs previous close: {change}\n"));
    out.push_str(&format!("Previous close: {}\n", fmt_num(previous)));
    out.push_str(&format!(
        "Day range: {} - {}\n",
        fmt_num(meta.regular_market_day_low),
        fmt_num(meta.regular_market_day_high)
    ));
    out.push_str(&format!(
        "52-week range: {} - {}\n",
        fmt_num(meta.fifty_two_week_low),
        fmt_num(meta.fifty_two_week_high)
    ));
    if let Some(volume) = meta.regular_market_volume {
        out.push_str(&format!("Volume: {volume}\n"));
    }
    if let Some(kind) = meta.instrument_type {
        out.push_str(&format!("Instrument: {kind}\n"));
    }
    if let Some(exchange) = meta.exchange_name {
        out.push_str(&format!("Exchange: {exchange}\n"));
    }
    if let Some(at) = meta.regular_market_time.and_then(from_unix) {
        out.push_str(&format!("Market time: {at}\n"));
    }
    out.push_str(&format!("Source: {SOURCE} (retrieved {})", stamp(retrieved)));
    Ok(out)
}

// -- search (news + profile) --

#[derive(Deserialize)]
struct SearchEnvelope {
    #[serde(default)]
    quotes: Vec<SearchQuote>,
    #[serde(default)]
    news: Vec<NewsItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchQuote {
    symbol: Option<String>,
    #[serde(rename = "shortname")]
    short_name: Option<String>,
    #[serde(rename = "longname")]
    long_name: Option<String>,
    exch_disp: Option<String>,
    quote_type: Option<String>,
    type_disp: Option<String>,
    sector: Option<String>,
    industry: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsItem {
    title: String,
    publisher: Option<String>,
    link: Option<String>,
    provider_publish_time: Option<i64>,
}

pub fn format_news(symbol: &str, body: &str, retrieved: DateTime<Utc>) -> Result<String> {
    let envelope: SearchEnvelope =
        serde_json::from_str(body).map_err(|e| Error::parse(format!("news response: {e}")))?;
    if envelope.news.is_empty() {
        return Ok(format!("No recent news found for {symbol}"));
    }

    let mut out = format!("Recent news for {symbol}:\n");
    for (i, item) in envelope.news.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, item.title));
        let mut meta = Vec::new();
        if let Some(publisher) = &item.publisher {
            meta.push(publisher.clone());
        }
        if let Some(at) = item.provider_publish_time.and_then(from_unix) {
            meta.push(at);
        }
        if !meta.is_empty() {
            out.push_str(&format!("   {}\n", meta.join(", ")));
        }
        if let Some(link) = &item.link {
            out.push_str(&format!("   {link}\n"));
        }
    }
    out.push_str(&format!("Source: {SOURCE} (retrieved {})", stamp(retrieved)));
    Ok(out)
}

pub fn format_profile(symbol: &str, body: &str, retrieved: DateTime<Utc>) -> Result<String> {
    let envelope: SearchEnvelope =
        serde_json::from_str(body).map_err(|e| Error::parse(format!("profile response: {e}")))?;
    // prefer the exact ticker when the search returns close matches first
    let quote = envelope
        .quotes
        .iter()
        .find(|q| q.symbol.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(symbol)))
        .or_else(|| envelope.quotes.first());
    let Some(quote) = quote else {
        return Ok(format!("No profile found for {symbol}"));
    };

    let mut out = String::new();
    let fields = [
        ("Symbol", quote.symbol.as_deref()),
        ("Name", quote.long_name.as_deref().or(quote.short_name.as_deref())),
        ("Exchange", quote.exch_disp.as_deref()),
        ("Asset type", quote.type_disp.as_deref().or(quote.quote_type.as_deref())),
        ("Sector", quote.sector.as_deref()),
        ("Industry", quote.industry.as_deref()),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            out.push_str(&format!("{label}: {value}\n"));
        }
    }
    out.push_str(&format!("Source: {SOURCE} (retrieved {})", stamp(retrieved)));
    Ok(out)
}

// -- quoteSummary --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryEnvelope {
    quote_summary: QuoteSummary,
}

#[derive(Deserialize)]
struct QuoteSummary {
    #[serde(default)]
    result: Option<Vec<SummaryResult>>,
    error: Option<YahooError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryResult {
    financial_data: Option<FinancialData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinancialData {
    current_price: Option<RawValue>,
    target_high_price: Option<RawValue>,
    target_low_price: Option<RawValue>,
    target_mean_price: Option<RawValue>,
    target_median_price: Option<RawValue>,
    recommendation_key: Option<String>,
    number_of_analyst_opinions: Option<RawValue>,
    financial_currency: Option<String>,
}

#[derive(Deserialize)]
struct RawValue {
    raw: Option<f64>,
}

fn raw(v: &Option<RawValue>) -> Option<f64> {
    v.as_ref().and_then(|r| r.raw)
}

pub fn format_price_targets(symbol: &str, body: &str, retrieved: DateTime<Utc>) -> Result<String> {
    let envelope: SummaryEnvelope = serde_json::from_str(body)
        .map_err(|e| Error::parse(format!("quote summary response: {e}")))?;
    if let Some(err) = envelope.quote_summary.error {
        return Err(err.into_error());
    }
    let data = envelope
        .quote_summary
        .result
        .and_then(|r| r.into_iter().next())
        .and_then(|r| r.financial_data);
    let Some(data) = data else {
        return Ok(format!("No analyst price targets available for {symbol}"));
    };
    if raw(&data.target_mean_price).is_none() && raw(&data.target_high_price).is_none() {
        return Ok(format!("No analyst price targets available for {symbol}"));
    }

    let currency = data.financial_currency.unwrap_or_default();
    let mut out = format!("Analyst price targets for {symbol} ({currency}):\n");
    out.push_str(&format!("Current price: {}\n", fmt_num(raw(&data.current_price))));
    out.push_str(&format!("Low: {}\n", fmt_num(raw(&data.target_low_price))));
    out.push_str(&format!("Mean: {}\n", fmt_num(raw(&data.target_mean_price))));
    out.push_str(&format!("Median: {}\n", fmt_num(raw(&data.target_median_price))));
    out.push_str(&format!("High: {}\n", fmt_num(raw(&data.target_high_price))));
    if let Some(key) = data.recommendation_key {
        out.push_str(&format!("Consensus: {key}\n"));
    }
    if let Some(n) = raw(&data.number_of_analyst_opinions) {
        out.push_str(&format!("Analysts: {n:.0}\n"));
    }
    out.push_str(&format!("Source: {SOURCE} (retrieved {})", stamp(retrieved)));
    Ok(out)
}
