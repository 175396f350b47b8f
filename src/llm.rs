use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::stream::sse_data;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// LLM provider. Both speak the OpenAI chat-completions wire format.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Groq,
    #[serde(rename = "openai")]
    OpenAi,
}

impl Provider {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Groq => "https://api.groq.com/openai/v1",
            Self::OpenAi => "https://api.openai.com/v1",
        }
    }

    /// Model used when a provider is picked without naming one.
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Groq => "mixtral-8x7b-32768",
            Self::OpenAi => "gpt-4o",
        }
    }

    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::Groq => crate::config::GROQ_API_KEY,
            Self::OpenAi => crate::config::OPENAI_API_KEY,
        }
    }
}

/// Everything needed to address one hosted model.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub provider: Provider,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub base_url: Option<String>,
}

impl From<&LlmConfig> for ModelSettings {
    fn from(cfg: &LlmConfig) -> Self {
        Self {
            provider: cfg.provider.clone(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            base_url: cfg.base_url.clone(),
        }
    }
}

// -- Conversation types --

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments exactly as the model produced them.
    pub arguments: String,
}

/// A function the model may call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDef>,
}

/// One increment of a streamed assistant turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatDelta {
    Text(String),
    ToolCall(ToolCallDelta),
}

/// A fragment of a tool call. Fragments sharing an `index` belong together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

pub type DeltaStream = BoxStream<'static, Result<ChatDelta>>;

/// A hosted model that can stream a chat turn.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn model(&self) -> &str;

    async fn stream_chat(&self, request: &ChatRequest) -> Result<DeltaStream>;
}

/// Merges streamed tool-call fragments into complete calls.
#[derive(Debug, Default)]
pub struct ToolCallBuilder {
    calls: BTreeMap<usize, ToolCallDelta>,
}

impl ToolCallBuilder {
    pub fn push(&mut self, delta: ToolCallDelta) {
        let entry = self.calls.entry(delta.index).or_insert_with(|| ToolCallDelta {
            index: delta.index,
            ..Default::default()
        });
        if delta.id.is_some() {
            entry.id = delta.id;
        }
        if let Some(name) = delta.name {
            entry.name.get_or_insert_with(String::new).push_str(&name);
        }
        if let Some(args) = delta.arguments {
            entry
                .arguments
                .get_or_insert_with(String::new)
                .push_str(&args);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Complete calls in index order. Fragments that never received a
    /// function name are dropped.
    pub fn finish(self) -> Vec<ToolCall> {
        self.calls
            .into_values()
            .filter_map(|partial| {
                let name = partial.name.filter(|n| !n.is_empty())?;
                Some(ToolCall {
                    id: partial
                        .id
                        .unwrap_or_else(|| format!("call_{}", partial.index)),
                    kind: "function".into(),
                    function: FunctionCall {
                        name,
                        arguments: partial.arguments.unwrap_or_default(),
                    },
                })
            })
            .collect()
    }
}

// -- OpenAI-compatible wire format --

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSpec<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'a str>,
}

#[derive(Serialize)]
struct ToolSpec<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: FunctionSpec<'a>,
}

#[derive(Serialize)]
struct FunctionSpec<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<StreamError>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<RawToolCallDelta>>,
}

#[derive(Deserialize)]
struct RawToolCallDelta {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<RawFunctionDelta>,
}

#[derive(Deserialize)]
struct RawFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Deserialize)]
struct StreamError {
    message: String,
}

/// Decode one `data:` payload of a streamed chat completion.
pub fn parse_chunk(data: &str) -> Result<Vec<ChatDelta>> {
    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| Error::parse(format!("parse stream chunk: {e}\nraw: {data}")))?;

    if let Some(err) = chunk.error {
        return Err(Error::api("stream", err.message));
    }

    let mut deltas = Vec::new();
    for delta in chunk.choices.into_iter().filter_map(|c| c.delta) {
        if let Some(text) = delta.content
            && !text.is_empty()
        {
            deltas.push(ChatDelta::Text(text));
        }
        for call in delta.tool_calls.unwrap_or_default() {
            let (name, arguments) = match call.function {
                Some(f) => (f.name, f.arguments),
                None => (None, None),
            };
            deltas.push(ChatDelta::ToolCall(ToolCallDelta {
                index: call.index,
                id: call.id,
                name,
                arguments,
            }));
        }
    }
    Ok(deltas)
}

/// Streaming client for any OpenAI-compatible chat-completions endpoint.
pub struct ChatClient {
    settings: ModelSettings,
    api_key: String,
    base_url: String,
    http: HttpClient,
}

impl ChatClient {
    pub fn new(settings: ModelSettings, api_key: String) -> Result<Self> {
        let http = HttpClient::new(concat!("market-intel/", env!("CARGO_PKG_VERSION")))?;
        let base_url = settings
            .base_url
            .clone()
            .unwrap_or_else(|| settings.provider.default_base_url().into());
        Ok(Self {
            settings,
            api_key,
            base_url,
            http,
        })
    }
}

#[async_trait]
impl CompletionProvider for ChatClient {
    fn model(&self) -> &str {
        &self.settings.model
    }

    async fn stream_chat(&self, request: &ChatRequest) -> Result<DeltaStream> {
        debug!(
            provider = ?self.settings.provider,
            model = %self.settings.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "sending LLM request"
        );

        let tools: Vec<ToolSpec<'_>> = request
            .tools
            .iter()
            .map(|t| ToolSpec {
                kind: "function",
                function: FunctionSpec {
                    name: &t.name,
                    description: &t.description,
                    parameters: &t.parameters,
                },
            })
            .collect();
        let tool_choice = (!tools.is_empty()).then_some("auto");

        let body = serde_json::to_string(&ChatBody {
            model: &self.settings.model,
            messages: &request.messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            stream: true,
            tools,
            tool_choice,
        })
        .map_err(|e| Error::parse(format!("serialize request: {e}")))?;

        let url = format!("{}/chat/completions", self.base_url);
        let auth = format!("Bearer {}", self.api_key);
        let response = self
            .http
            .post_json_response(&url, &body, &[("Authorization", auth.as_str())])
            .await
            .map_err(|e| {
                warn!("LLM API error: {e}");
                e
            })?;

        let deltas = sse_data(response.bytes_stream()).flat_map(|item| {
            let batch: Vec<Result<ChatDelta>> = match item.and_then(|data| parse_chunk(&data)) {
                Ok(deltas) => deltas.into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            };
            stream::iter(batch)
        });

        Ok(deltas.boxed())
    }
}
