use chrono::{TimeZone, Utc};
use market_intel::tools::finance::{format_news, format_price, format_price_targets, format_profile};
use market_intel::tools::web_search::parse_results;
use std::fs;

fn fixture(path: &str) -> String {
    fs::read_to_string(format!("tests/fixtures/{path}"))
        .unwrap_or_else(|e| panic!("missing fixture {path}: {e}"))
}

fn retrieved() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 18, 9, 30, 0).unwrap()
}

#[test]
fn duckduckgo_results_skip_ads() {
    let hits = parse_results(&fixture("duckduckgo/nvda_news.html"), 10);
    assert_eq!(hits.len(), 3, "ad should be skipped: {hits:?}");
    assert!(hits.iter().all(|h| !h.title.contains("Commission-Free")));
}

#[test]
fn duckduckgo_redirects_are_resolved() {
    let hits = parse_results(&fixture("duckduckgo/nvda_news.html"), 10);
    assert_eq!(hits[0].url, "https://www.reuters.com/technology/nvidia-results/");
    assert_eq!(hits[0].title, "Nvidia forecasts revenue above estimates");
    assert_eq!(
        hits[0].snippet,
        "Nvidia on Wednesday forecast quarterly revenue above Wall Street estimates."
    );
    assert_eq!(hits[1].url, "https://www.cnbc.com/quotes/NVDA");
    assert_eq!(hits[2].url, "https://www.ft.com/content/nvidia");
    assert!(hits[2].snippet.is_empty());
}

#[test]
fn duckduckgo_limit_is_respected() {
    let hits = parse_results(&fixture("duckduckgo/nvda_news.html"), 2);
    assert_eq!(hits.len(), 2);
}

#[test]
fn duckduckgo_page_without_results() {
    assert!(parse_results("<html><body><p>No results.</p></body></html>", 5).is_empty());
}

#[test]
fn chart_price_summary() {
    let text = format_price(&fixture("yahoo/chart_aapl.json"), retrieved()).unwrap();
    assert!(text.starts_with("AAPL Apple Inc.\n"), "{text}");
    assert!(text.contains("Price: 216.67 USD"));
    assert!(text.contains("Change vs previous close: +4.18 (+1.97%)"));
    assert!(text.contains("Day range: 212.72 - 218.95"));
    assert!(text.contains("52-week range: 164.08 - 220.20"));
    assert!(text.contains("Volume: 93728300"));
    assert!(text.contains("Market time: 2024-06-17 20:00 UTC"));
    assert!(text.ends_with("Source: Yahoo Finance (retrieved 2024-06-18 09:30 UTC)"));
}

#[test]
fn chart_error_becomes_api_error() {
    let err = format_price(&fixture("yahoo/chart_not_found.json"), retrieved()).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("Not Found"), "{msg}");
    assert!(msg.contains("symbol may be delisted"), "{msg}");
}

#[test]
fn news_lists_headlines_with_publishers() {
    let text = format_news("AAPL", &fixture("yahoo/search_aapl.json"), retrieved()).unwrap();
    assert!(text.starts_with("Recent news for AAPL:\n"));
    assert!(text.contains("1. Apple unveils new AI features at WWDC\n   Reuters, 2024-06-11 15:00 UTC"));
    assert!(text.contains("2. Why Apple stock hit a record high"));
    assert!(text.contains("https://finance.yahoo.com/news/why-apple-stock-record.html"));
    assert!(text.contains("Source: Yahoo Finance"));
}

#[test]
fn profile_prefers_exact_symbol() {
    let text = format_profile("aapl", &fixture("yahoo/search_aapl.json"), retrieved()).unwrap();
    assert!(text.contains("Symbol: AAPL\n"), "{text}");
    assert!(text.contains("Exchange: NASDAQ"));
    assert!(text.contains("Sector: Technology"));
    assert!(text.contains("Industry: Consumer Electronics"));
    assert!(!text.contains("AAPL.NE"));
}

#[test]
fn price_targets_from_quote_summary() {
    let text =
        format_price_targets("AAPL", &fixture("yahoo/quote_summary_aapl.json"), retrieved()).unwrap();
    assert!(text.starts_with("Analyst price targets for AAPL (USD):"));
    assert!(text.contains("Low: 164.00"));
    assert!(text.contains("Mean: 218.42"));
    assert!(text.contains("High: 275.00"));
    assert!(text.contains("Consensus: buy"));
    assert!(text.contains("Analysts: 38"));
}
