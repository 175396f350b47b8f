//! Prompt templates for the request operations.

/// Substrings that mark a symbol as a crypto asset.
pub const CRYPTO_MARKERS: [&str; 4] = ["BTC", "ETH", "USDT", "BNB"];

pub const ALL_MARKETS: &str = "all major markets";

/// Guess the asset type from the ticker alone: "crypto" if it contains a
/// known crypto marker (case-insensitive), otherwise "stock".
///
/// This is a substring heuristic: "ETHAN" classifies as crypto.
pub fn classify_symbol(symbol: &str) -> &'static str {
    let upper = symbol.to_uppercase();
    if CRYPTO_MARKERS.iter().any(|m| upper.contains(m)) {
        "crypto"
    } else {
        "stock"
    }
}

/// An explicit asset type is used verbatim; only a missing one is inferred.
pub fn resolve_asset_type<'a>(symbol: &str, asset_type: Option<&'a str>) -> &'a str {
    asset_type.unwrap_or_else(|| classify_symbol(symbol))
}

pub fn asset_prompt(symbol: &str, asset_type: &str) -> String {
    format!(
        "Analyze {symbol} ({asset_type}):
1. Get current price using get_stock_price
2. Search latest news using get_company_news
3. Get company/asset profile using get_company_profile
4. Check price targets using get_price_targets
5. Analyze broader market impact and trends

Adapt the analysis for {asset_type} specifically."
    )
}

/// "all major markets" when no focus is given, otherwise the areas joined by ", ".
pub fn focus_phrase(focus_areas: Option<&[String]>) -> String {
    match focus_areas {
        Some(areas) if !areas.is_empty() => areas.join(", "),
        _ => ALL_MARKETS.to_string(),
    }
}

pub fn overview_prompt(focus_areas: Option<&[String]>) -> String {
    let focus = focus_phrase(focus_areas);
    format!(
        "Provide a market overview focusing on {focus}, including:
1. Use get_stock_price for key market indicators
2. Get latest news using get_company_news for major market movers
3. Check market trends and patterns
4. Analyze sector/asset performance"
    )
}
