//! The three agents of the market analysis team.

use super::Agent;
use crate::config::{Config, Credentials};
use crate::error::{Error, Result};
use crate::llm::{ChatClient, CompletionProvider, ModelSettings, Provider};
use crate::tools::{FinanceData, WebSearch};
use std::sync::Arc;
use tracing::debug;

pub const SEARCH_AGENT_NAME: &str = "Web Search Agent";
pub const FINANCE_AGENT_NAME: &str = "Finance AI Agent";
pub const COORDINATOR_NAME: &str = "Market Analysis Team";

/// Coordinator model when an OpenAI key is available and none is configured.
pub const DEFAULT_COORDINATOR_MODEL: &str = "gpt-4o";

pub const SEARCH_INSTRUCTIONS: &[&str] = &[
    "Always include sources",
    "Prioritize recent and reliable financial news sources",
    "Include relevant market context",
    "Adapt search terms based on asset type (crypto, stock, etc.)",
];

pub const FINANCE_INSTRUCTIONS: &[&str] = &[
    "Use tables to display financial data",
    "Include both technical and fundamental analysis when relevant",
    "Provide context for financial metrics",
    "Highlight significant changes or unusual patterns",
    "Include source and timestamp for all financial data",
    "Adapt analysis based on asset type (crypto, stock, etc.)",
    "Use the finance functions: get_stock_price, get_company_news, get_company_profile, get_price_targets",
];

pub const COORDINATOR_INSTRUCTIONS: &[&str] = &[
    "Always include sources",
    "Use tables to display financial data",
    "Combine market news with financial analysis",
    "Prioritize actionable insights",
    "Highlight any discrepancies between different data sources",
    "Include both short-term and long-term perspectives",
    "Adapt analysis based on asset type",
];

/// Build a chat client for `settings`, failing if its provider has no key.
pub fn chat_client(
    settings: ModelSettings,
    credentials: &Credentials,
) -> Result<Arc<dyn CompletionProvider>> {
    let api_key = credentials
        .api_key_for(&settings.provider)
        .ok_or_else(|| {
            Error::config(format!(
                "{} is required for model {}",
                settings.provider.api_key_env(),
                settings.model
            ))
        })?
        .to_string();
    debug!(provider = ?settings.provider, model = %settings.model, "building chat client");
    Ok(Arc::new(ChatClient::new(settings, api_key)?))
}

pub fn search_agent(credentials: &Credentials, config: &Config) -> Result<Agent> {
    let model = chat_client(ModelSettings::from(&config.llm), credentials)?;
    let search = WebSearch::new(config.search.max_results)?;
    Ok(Agent::builder(SEARCH_AGENT_NAME)
        .role("Search the web for market information and news")
        .instructions(SEARCH_INSTRUCTIONS.iter().copied())
        .capability(Arc::new(search))
        .show_tool_calls(true)
        .markdown(true)
        .max_turns(config.agent.max_turns)
        .build(model))
}

pub fn finance_agent(credentials: &Credentials, config: &Config) -> Result<Agent> {
    let model = chat_client(ModelSettings::from(&config.llm), credentials)?;
    let finance = FinanceData::new(config.finance.news_count)?;
    Ok(Agent::builder(FINANCE_AGENT_NAME)
        .role("Retrieve and analyze financial market data")
        .instructions(FINANCE_INSTRUCTIONS.iter().copied())
        .capability(Arc::new(finance))
        .show_tool_calls(true)
        .markdown(true)
        .max_turns(config.agent.max_turns)
        .build(model))
}

/// Model for the team leader. An explicit `[coordinator]` section wins;
/// otherwise OpenAI when its key is present, else the members' model.
pub fn coordinator_settings(credentials: &Credentials, config: &Config) -> ModelSettings {
    let member = ModelSettings::from(&config.llm);
    let provider = config.coordinator.provider.clone().unwrap_or_else(|| {
        if credentials.openai_api_key().is_some() {
            Provider::OpenAi
        } else {
            member.provider.clone()
        }
    });

    let model = match (&config.coordinator.model, &provider) {
        (Some(model), _) => model.clone(),
        (None, p) if *p == member.provider => member.model.clone(),
        (None, Provider::OpenAi) => DEFAULT_COORDINATOR_MODEL.into(),
        (None, _) => member.model.clone(),
    };
    let base_url = config
        .coordinator
        .base_url
        .clone()
        .or_else(|| (provider == member.provider).then(|| member.base_url.clone()).flatten());

    ModelSettings {
        provider,
        model,
        temperature: member.temperature,
        max_tokens: member.max_tokens,
        base_url,
    }
}

pub fn analysis_coordinator(
    search: Agent,
    finance: Agent,
    credentials: &Credentials,
    config: &Config,
) -> Result<Agent> {
    let model = chat_client(coordinator_settings(credentials, config), credentials)?;
    Ok(Agent::builder(COORDINATOR_NAME)
        .instructions(COORDINATOR_INSTRUCTIONS.iter().copied())
        .member(Arc::new(search))
        .member(Arc::new(finance))
        .show_tool_calls(true)
        .markdown(true)
        .max_turns(config.agent.max_turns)
        .build(model))
}
