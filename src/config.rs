use crate::error::{Error, Result};
use crate::llm::Provider;
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

pub const GROQ_API_KEY: &str = "GROQ_API_KEY";
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const PHI_API_KEY: &str = "PHI_API_KEY";

/// API keys read once at startup and handed to whatever needs them.
#[derive(Clone)]
pub struct Credentials {
    groq_api_key: String,
    openai_api_key: Option<String>,
    phi_api_key: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve keys through `lookup`. Only the Groq key is mandatory.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let present = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let groq_api_key = present(GROQ_API_KEY).ok_or_else(|| {
            Error::config(format!("{GROQ_API_KEY} not found in environment variables"))
        })?;

        Ok(Self {
            groq_api_key,
            openai_api_key: present(OPENAI_API_KEY),
            phi_api_key: present(PHI_API_KEY),
        })
    }

    pub fn groq_api_key(&self) -> &str {
        &self.groq_api_key
    }

    pub fn openai_api_key(&self) -> Option<&str> {
        self.openai_api_key.as_deref()
    }

    pub fn has_phi_key(&self) -> bool {
        self.phi_api_key.is_some()
    }

    pub fn api_key_for(&self, provider: &Provider) -> Option<&str> {
        match provider {
            Provider::Groq => Some(self.groq_api_key()),
            Provider::OpenAi => self.openai_api_key(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("groq_api_key", &"<redacted>")
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<redacted>"))
            .field("phi_api_key", &self.phi_api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub agent: AgentLoopConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub finance: FinanceConfig,
}

/// Model used by the search and finance agents.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: Provider,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            base_url: None,
        }
    }
}

/// Model override for the team coordinator. Unset fields are chosen from the
/// available credentials.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CoordinatorConfig {
    pub provider: Option<Provider>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentLoopConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FinanceConfig {
    #[serde(default = "default_news_count")]
    pub news_count: usize,
}

impl Default for FinanceConfig {
    fn default() -> Self {
        Self {
            news_count: default_news_count(),
        }
    }
}

// Defaults
fn default_model() -> String {
    Provider::Groq.default_model().into()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_max_turns() -> u32 {
    10
}
fn default_max_results() -> usize {
    5
}
fn default_news_count() -> usize {
    5
}

impl Config {
    /// Load settings from `path`. A missing file yields the built-in defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config {}: {e}", path.display())))?;
        toml::from_str(&content).map_err(|e| Error::config(format!("Failed to parse config: {e}")))
    }
}
