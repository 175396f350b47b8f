use super::{BROWSER_USER_AGENT, Capability, required_str, truncate};
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::llm::ToolDef;
use async_trait::async_trait;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Value, json};
use tracing::{debug, info};

const SEARCH_URL: &str = "https://html.duckduckgo.com/html/";
const MAX_ALLOWED_RESULTS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Web search through DuckDuckGo's HTML endpoint.
pub struct WebSearch {
    http: HttpClient,
    max_results: usize,
}

impl WebSearch {
    pub fn new(max_results: usize) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(BROWSER_USER_AGENT)?,
            max_results: max_results.clamp(1, MAX_ALLOWED_RESULTS),
        })
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let url = Url::parse_with_params(SEARCH_URL, &[("q", query)])
            .map_err(|e| Error::parse(format!("search URL: {e}")))?;
        let html = self.http.get_text(url.as_str()).await?;
        let hits = parse_results(&html, limit);
        info!(query, hits = hits.len(), "web search complete");
        Ok(hits)
    }
}

#[async_trait]
impl Capability for WebSearch {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    fn functions(&self) -> Vec<ToolDef> {
        vec![ToolDef {
            name: "duckduckgo_search".into(),
            description: "Search the web with DuckDuckGo. Returns result titles, source URLs \
                          and snippets. Use for recent news, market commentary and context \
                          that financial data alone does not give."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query."
                    },
                    "max_results": {
                        "type": "integer",
                        "description": format!("Number of results to return (default {}).", self.max_results)
                    }
                },
                "required": ["query"]
            }),
        }]
    }

    async fn dispatch(&self, function: &str, input: &Value) -> (String, bool) {
        if function != "duckduckgo_search" {
            return (format!("Unknown tool: {function}"), true);
        }
        let query = match required_str(input, "query") {
            Ok(q) => q,
            Err(e) => return (e, true),
        };
        let limit = input["max_results"]
            .as_u64()
            .map(|n| (n as usize).clamp(1, MAX_ALLOWED_RESULTS))
            .unwrap_or(self.max_results);

        debug!(query, limit, "duckduckgo_search");
        match self.search(query, limit).await {
            Ok(hits) => (truncate(format_hits(query, &hits)), false),
            Err(e) => (format!("Search failed: {e}"), true),
        }
    }
}

/// Extract organic results from a DuckDuckGo HTML results page. Ads are skipped.
pub fn parse_results(html: &str, limit: usize) -> Vec<SearchHit> {
    let document = Html::parse_document(html);
    let (Ok(result_sel), Ok(title_sel), Ok(snippet_sel)) = (
        Selector::parse("div.result"),
        Selector::parse("a.result__a"),
        Selector::parse(".result__snippet"),
    ) else {
        return Vec::new();
    };

    let mut hits = Vec::new();
    for result in document.select(&result_sel) {
        if hits.len() >= limit {
            break;
        }
        if result.value().classes().any(|c| c == "result--ad") {
            continue;
        }
        let Some(link) = result.select(&title_sel).next() else {
            continue;
        };
        let title = element_text(link);
        let Some(url) = link.value().attr("href").and_then(resolve_link) else {
            continue;
        };
        if title.is_empty() {
            continue;
        }
        let snippet = result
            .select(&snippet_sel)
            .next()
            .map(element_text)
            .unwrap_or_default();
        hits.push(SearchHit {
            title,
            url,
            snippet,
        });
    }
    hits
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// DuckDuckGo wraps targets as `//duckduckgo.com/l/?uddg=<encoded>`; unwrap
/// those and pass direct links through.
fn resolve_link(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };
    let url = Url::parse(&absolute).ok()?;
    if url.path().starts_with("/l/")
        && let Some((_, target)) = url.query_pairs().find(|(k, _)| k == "uddg")
    {
        return Some(target.into_owned());
    }
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

fn format_hits(query: &str, hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return format!("No results for '{query}'");
    }
    let mut out = format!("Web results for '{query}' (source: DuckDuckGo):\n");
    for (i, hit) in hits.iter().enumerate() {
        out.push_str(&format!("{}. {}\n   Source: {}\n", i + 1, hit.title, hit.url));
        if !hit.snippet.is_empty() {
            out.push_str(&format!("   {}\n", hit.snippet));
        }
    }
    out
}
