//! Interactive menu loop.

use crate::error::{FailureKind, RequestError, Result};
use crate::output::Completion;
use crate::system::MarketIntelligenceSystem;
use std::fmt::Display;
use std::io::{self, BufRead, Write};
use tracing::{debug, error};

const MENU: &str = "\nMarket Intelligence System
1. Analyze specific asset (stock/crypto)
2. Market overview
3. Custom query
4. Exit
";

/// Read menu choices from `input` until the operator exits or input ends.
///
/// Failed requests are already shown to the operator and the loop goes on;
/// only errors reading the terminal or writing to `out` end it.
pub async fn run<R: BufRead, W: Write>(
    system: &MarketIntelligenceSystem,
    mut input: R,
    out: &mut W,
) -> Result<()> {
    loop {
        out.write_all(MENU.as_bytes())?;
        let Some(choice) = ask(&mut input, out, "\nEnter your choice (1-4): ")? else {
            debug!("input closed");
            writeln!(out)?;
            break;
        };

        match choice.trim() {
            "1" => {
                let Some(symbol) = ask(&mut input, out, "Enter asset symbol (e.g., AAPL, BTC-USD): ")? else {
                    break;
                };
                let symbol = symbol.trim();
                if symbol.is_empty() {
                    writeln!(out, "Asset symbol cannot be empty.")?;
                    continue;
                }
                let Some(asset_type) = ask(
                    &mut input,
                    out,
                    "Enter asset type (stock/crypto) or press Enter to auto-detect: ",
                )?
                else {
                    break;
                };
                let asset_type = parse_asset_type(&asset_type);
                let result = system.analyze_asset(symbol, asset_type.as_deref(), out).await;
                surface(result)?;
            }
            "2" => {
                let Some(areas) = ask(
                    &mut input,
                    out,
                    "Enter focus areas (comma-separated) or press Enter for all markets: ",
                )?
                else {
                    break;
                };
                let focus_areas = parse_focus_areas(&areas);
                let result = system.market_overview(focus_areas.as_deref(), out).await;
                surface(result)?;
            }
            "3" => {
                let Some(query) = ask(&mut input, out, "Enter your custom query: ")? else {
                    break;
                };
                let result = system.custom_analysis(&query, out).await;
                surface(result)?;
            }
            "4" => break,
            _ => writeln!(out, "Invalid choice. Please try again.")?,
        }
    }
    writeln!(out, "Exiting...")?;
    out.flush()?;
    Ok(())
}

/// Show `prompt` and read one line without its line ending. `None` at end of input.
fn ask<R: BufRead, W: Write>(input: &mut R, out: &mut W, prompt: &str) -> Result<Option<String>> {
    out.write_all(prompt.as_bytes())?;
    out.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let len = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(len);
    Ok(Some(line))
}

/// Request failures were reported by the system; terminal failures end the loop.
fn surface(result: std::result::Result<Completion, RequestError>) -> Result<()> {
    match result {
        Err(e) if e.kind == FailureKind::Terminal => Err(e.source),
        _ => Ok(()),
    }
}

/// Log an error that ends the session and tell the operator.
pub fn report_fatal<E: Display, W: Write>(err: &E, out: &mut W) -> io::Result<()> {
    error!("{err:#}");
    writeln!(out, "An error occurred: {err}")?;
    writeln!(out, "Exiting due to error...")?;
    out.flush()
}

/// Lowercased asset type, `None` when left blank.
pub fn parse_asset_type(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
}

/// Comma-separated focus areas, trimmed. `None` when left blank.
pub fn parse_focus_areas(raw: &str) -> Option<Vec<String>> {
    if raw.trim().is_empty() {
        return None;
    }
    let areas: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(String::from)
        .collect();
    (!areas.is_empty()).then_some(areas)
}
