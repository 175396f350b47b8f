pub mod agent;
pub mod config;
pub mod error;
pub mod http;
pub mod llm;
pub mod output;
pub mod prompts;
pub mod stream;
pub mod system;
pub mod terminal;
pub mod tools;

/// CLI override for the member agents' provider/model.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmOverride {
    pub provider: llm::Provider,
    pub model: String,
}

impl LlmOverride {
    /// `None` when neither flag was given. A provider without a model gets
    /// that provider's default model.
    pub fn from_flags(provider: Option<llm::Provider>, model: Option<String>) -> Option<Self> {
        if provider.is_none() && model.is_none() {
            return None;
        }
        let provider = provider.unwrap_or_default();
        let model = model.unwrap_or_else(|| provider.default_model().into());
        Some(Self { provider, model })
    }

    pub fn apply(&self, llm: &mut config::LlmConfig) {
        if llm.provider != self.provider {
            llm.base_url = None;
        }
        llm.provider = self.provider.clone();
        llm.model = self.model.clone();
    }
}
