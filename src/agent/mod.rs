//! Agents: a hosted model, the capabilities it may call, and its instructions.
//!
//! `Agent::stream` runs the tool loop lazily. Each turn streams a chat
//! completion; text is yielded as it arrives, tool calls are collected, and
//! when the turn ends with tool calls they are executed and fed back before
//! the next turn. A turn without tool calls ends the response; tool calls
//! on the last allowed turn end it with `Error::TurnLimit`.

pub mod factory;
pub mod team;

use crate::error::{Error, Result};
use crate::llm::{
    ChatDelta, ChatMessage, ChatRequest, CompletionProvider, DeltaStream, ToolCall,
    ToolCallBuilder, ToolDef,
};
use crate::stream::{TextStream, collect_text};
use crate::tools::{Capability, truncate};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use team::Delegate;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_TURNS: u32 = 10;

/// Static description of an agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub role: Option<String>,
    pub instructions: Vec<String>,
    pub show_tool_calls: bool,
    pub markdown: bool,
}

pub struct Agent {
    config: AgentConfig,
    model: Arc<dyn CompletionProvider>,
    capabilities: Vec<Arc<dyn Capability>>,
    tools: Vec<ToolDef>,
    /// function name -> index into `capabilities`
    routes: HashMap<String, usize>,
    team: Vec<(String, Option<String>, String)>,
    max_turns: u32,
}

impl Agent {
    pub fn builder(name: impl Into<String>) -> AgentBuilder {
        AgentBuilder::new(name)
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn model_name(&self) -> &str {
        self.model.model()
    }

    /// Names of every function this agent can call.
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn system_prompt(&self) -> String {
        let mut out = format!("You are {}.", self.config.name);
        if let Some(role) = &self.config.role {
            out.push_str(&format!("\nYour role: {role}"));
        }

        if !self.team.is_empty() {
            out.push_str(
                "\n\nYou lead a team of agents. Transfer tasks to them with the matching tool, \
                 giving a complete task description and the expected output, then combine \
                 their answers into one response. Team members:",
            );
            for (name, role, function) in &self.team {
                match role {
                    Some(role) => out.push_str(&format!("\n- {name} ({function}): {role}")),
                    None => out.push_str(&format!("\n- {name} ({function})")),
                }
            }
        }

        let mut instructions: Vec<&str> = self.config.instructions.iter().map(String::as_str).collect();
        if self.config.markdown {
            instructions.push("Use markdown to format your answers.");
        }
        if !instructions.is_empty() {
            out.push_str("\n\n## Instructions");
            for line in instructions {
                out.push_str(&format!("\n- {line}"));
            }
        }
        out
    }

    /// Respond to `prompt` as a lazy stream of text chunks.
    pub fn stream(&self, prompt: &str) -> TextStream {
        info!(agent = %self.config.name, model = %self.model.model(), "agent run starting");
        let state = Run {
            agent: self.config.name.clone(),
            model: Arc::clone(&self.model),
            capabilities: self.capabilities.clone(),
            routes: self.routes.clone(),
            tools: self.tools.clone(),
            messages: vec![ChatMessage::system(self.system_prompt()), ChatMessage::user(prompt)],
            show_tool_calls: self.config.show_tool_calls,
            max_turns: self.max_turns,
            turns: 0,
            current: None,
            text: String::new(),
            calls: ToolCallBuilder::default(),
            queued: VecDeque::new(),
            announced: false,
            finished: false,
        };
        stream::unfold(state, Run::step).boxed()
    }

    /// Respond to `prompt` and return the whole text.
    pub async fn run(&self, prompt: &str) -> Result<String> {
        collect_text(self.stream(prompt)).await
    }
}

/// Mutable state of one streamed agent response.
struct Run {
    agent: String,
    model: Arc<dyn CompletionProvider>,
    capabilities: Vec<Arc<dyn Capability>>,
    routes: HashMap<String, usize>,
    tools: Vec<ToolDef>,
    messages: Vec<ChatMessage>,
    show_tool_calls: bool,
    max_turns: u32,
    turns: u32,
    current: Option<DeltaStream>,
    text: String,
    calls: ToolCallBuilder,
    queued: VecDeque<ToolCall>,
    announced: bool,
    finished: bool,
}

impl Run {
    async fn step(mut self) -> Option<(Result<String>, Self)> {
        loop {
            if self.finished {
                return None;
            }

            // Execute tool calls from the previous turn, one at a time.
            if let Some(call) = self.queued.front().cloned() {
                if self.show_tool_calls && !self.announced {
                    self.announced = true;
                    return Some((Ok(running_line(&call)), self));
                }
                self.queued.pop_front();
                self.announced = false;
                let capability = self
                    .routes
                    .get(&call.function.name)
                    .map(|&idx| Arc::clone(&self.capabilities[idx]));
                let result = execute(&self.agent, capability, &call).await;
                self.messages.push(ChatMessage::tool(call.id, result));
                continue;
            }

            let Some(current) = self.current.as_mut() else {
                self.turns += 1;
                let request = ChatRequest {
                    messages: self.messages.clone(),
                    tools: self.tools.clone(),
                };
                let started = self.model.stream_chat(&request).await;
                match started {
                    Ok(deltas) => self.current = Some(deltas),
                    Err(e) => {
                        self.finished = true;
                        return Some((Err(e), self));
                    }
                }
                continue;
            };

            let next = current.next().await;
            match next {
                Some(Ok(ChatDelta::Text(text))) => {
                    self.text.push_str(&text);
                    return Some((Ok(text), self));
                }
                Some(Ok(ChatDelta::ToolCall(delta))) => self.calls.push(delta),
                Some(Err(e)) => {
                    self.finished = true;
                    return Some((Err(e), self));
                }
                None => {
                    if let Err(e) = self.end_turn() {
                        self.finished = true;
                        return Some((Err(e), self));
                    }
                }
            }
        }
    }

    /// Close the current turn. Tool calls requested on the last allowed turn
    /// are not executed; the response ends with `Error::TurnLimit` instead.
    fn end_turn(&mut self) -> Result<()> {
        self.current = None;
        let calls = std::mem::take(&mut self.calls).finish();
        let text = std::mem::take(&mut self.text);
        debug!(agent = %self.agent, turn = self.turns, tool_calls = calls.len(), "agent turn");

        if calls.is_empty() {
            info!(agent = %self.agent, turns = self.turns, "agent run complete");
            self.finished = true;
            return Ok(());
        }
        if self.turns >= self.max_turns {
            warn!(
                agent = %self.agent,
                turns = self.turns,
                pending = calls.len(),
                "hit max turns limit with tool calls pending"
            );
            return Err(Error::TurnLimit {
                agent: self.agent.clone(),
                max_turns: self.max_turns,
            });
        }

        self.messages.push(ChatMessage::Assistant {
            content: (!text.is_empty()).then_some(text),
            tool_calls: calls.clone(),
        });
        self.queued.extend(calls);
        Ok(())
    }
}

/// Run one tool call. Failures go back to the model as text.
async fn execute(agent: &str, capability: Option<Arc<dyn Capability>>, call: &ToolCall) -> String {
    let name = &call.function.name;
    let input = parse_arguments(&call.function.arguments);

    let (result, is_error) = match capability {
        Some(capability) => {
            debug!(agent, tool = %name, "executing tool");
            capability.dispatch(name, &input).await
        }
        None => (format!("Unknown tool: {name}"), true),
    };
    if is_error {
        warn!(agent, tool = %name, error = %result, "tool call failed");
    }
    truncate(result)
}

/// Models sometimes send an empty string instead of `{}`.
fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!(error = %e, raw, "tool arguments are not valid JSON");
        Value::Object(Default::default())
    })
}

fn running_line(call: &ToolCall) -> String {
    let args = match parse_arguments(&call.function.arguments) {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => format!("{k}={s}"),
                other => format!("{k}={other}"),
            })
            .collect::<Vec<_>>()
            .join(", "),
        _ => String::new(),
    };
    format!("\n - Running: {}({args})\n\n", call.function.name)
}

pub struct AgentBuilder {
    config: AgentConfig,
    capabilities: Vec<Arc<dyn Capability>>,
    members: Vec<Arc<Agent>>,
    max_turns: u32,
}

impl AgentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            config: AgentConfig {
                name: name.into(),
                role: None,
                instructions: Vec::new(),
                show_tool_calls: false,
                markdown: false,
            },
            capabilities: Vec::new(),
            members: Vec::new(),
            max_turns: DEFAULT_MAX_TURNS,
        }
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.config.role = Some(role.into());
        self
    }

    pub fn instructions<I, S>(mut self, instructions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.instructions = instructions.into_iter().map(Into::into).collect();
        self
    }

    pub fn capability(mut self, capability: Arc<dyn Capability>) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Add a team member reachable through a `transfer_task_to_*` tool.
    pub fn member(mut self, agent: Arc<Agent>) -> Self {
        self.members.push(agent);
        self
    }

    pub fn show_tool_calls(mut self, show: bool) -> Self {
        self.config.show_tool_calls = show;
        self
    }

    pub fn markdown(mut self, markdown: bool) -> Self {
        self.config.markdown = markdown;
        self
    }

    pub fn max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    pub fn build(self, model: Arc<dyn CompletionProvider>) -> Agent {
        let mut capabilities = self.capabilities;
        let mut team = Vec::new();
        for member in self.members {
            let delegate = Delegate::new(member);
            team.push((
                delegate.member().name().to_string(),
                delegate.member().config().role.clone(),
                delegate.function_name().to_string(),
            ));
            capabilities.push(Arc::new(delegate));
        }

        let mut tools = Vec::new();
        let mut routes = HashMap::new();
        for (idx, capability) in capabilities.iter().enumerate() {
            for def in capability.functions() {
                if routes.insert(def.name.clone(), idx).is_some() {
                    warn!(tool = %def.name, "duplicate tool name, later capability wins");
                    tools.retain(|t: &ToolDef| t.name != def.name);
                }
                tools.push(def);
            }
        }

        Agent {
            config: self.config,
            model,
            capabilities,
            tools,
            routes,
            team,
            max_turns: self.max_turns,
        }
    }
}
