//! Retrieval capabilities the agents can call.
//!
//! Each capability exposes one or more functions to the model and executes
//! them on request. A call always produces text for the model: failures are
//! reported back as `(message, true)` so the model can adjust instead of the
//! whole request failing.

pub mod finance;
pub mod web_search;

pub use finance::FinanceData;
pub use web_search::WebSearch;

use crate::llm::ToolDef;
use async_trait::async_trait;
use serde_json::Value;

/// Max chars returned from any single tool invocation.
pub const MAX_RESULT_CHARS: usize = 6000;

/// User agent for scraping-style endpoints that reject unknown clients.
pub(crate) const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[async_trait]
pub trait Capability: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Function definitions sent to the model.
    fn functions(&self) -> Vec<ToolDef>;

    /// Run `function` with the model-supplied arguments. Returns
    /// `(result_text, is_error)`.
    async fn dispatch(&self, function: &str, input: &Value) -> (String, bool);
}

/// Cap tool output so one verbose result cannot crowd out the conversation.
pub fn truncate(s: String) -> String {
    if s.len() <= MAX_RESULT_CHARS {
        return s;
    }
    let mut cut = MAX_RESULT_CHARS;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut out = s[..cut].to_string();
    out.push_str("\n... [truncated]");
    out
}

/// Fetch a required string argument, trimmed.
pub(crate) fn required_str<'a>(input: &'a Value, key: &str) -> Result<&'a str, String> {
    input[key]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing '{key}' parameter"))
}
