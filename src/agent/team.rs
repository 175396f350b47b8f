use super::Agent;
use crate::llm::ToolDef;
use crate::tools::{Capability, required_str};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

/// Exposes a team member to its leader as a `transfer_task_to_<member>` tool.
pub struct Delegate {
    member: Arc<Agent>,
    function_name: String,
}

impl Delegate {
    pub fn new(member: Arc<Agent>) -> Self {
        let function_name = format!("transfer_task_to_{}", slug(member.name()));
        Self {
            member,
            function_name,
        }
    }

    pub fn member(&self) -> &Agent {
        &self.member
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }
}

#[async_trait]
impl Capability for Delegate {
    fn name(&self) -> &str {
        self.member.name()
    }

    fn functions(&self) -> Vec<ToolDef> {
        let role = self
            .member
            .config()
            .role
            .clone()
            .unwrap_or_else(|| "general assistance".into());
        vec![ToolDef {
            name: self.function_name.clone(),
            description: format!(
                "Transfer a task to {}. Role: {role}. The agent answers with text you can \
                 combine into your response.",
                self.member.name()
            ),
            parameters: json!({
                "type": "object",
                "properties": {
                    "task_description": {
                        "type": "string",
                        "description": "A clear, self-contained description of the task."
                    },
                    "expected_output": {
                        "type": "string",
                        "description": "What the answer should contain and how it should be shaped."
                    }
                },
                "required": ["task_description"]
            }),
        }]
    }

    async fn dispatch(&self, function: &str, input: &Value) -> (String, bool) {
        if function != self.function_name {
            return (format!("Unknown tool: {function}"), true);
        }
        let task = match required_str(input, "task_description") {
            Ok(t) => t,
            Err(e) => return (e, true),
        };
        let prompt = match input["expected_output"].as_str().map(str::trim) {
            Some(expected) if !expected.is_empty() => {
                format!("{task}\n\nExpected output: {expected}")
            }
            _ => task.to_string(),
        };

        info!(member = %self.member.name(), "delegating task");
        match self.member.run(&prompt).await {
            Ok(text) if text.trim().is_empty() => {
                (format!("{} returned no content", self.member.name()), true)
            }
            Ok(text) => (text, false),
            Err(e) => (format!("{} failed: {e}", self.member.name()), true),
        }
    }
}

fn slug(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}
