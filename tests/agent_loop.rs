use async_trait::async_trait;
use futures::{StreamExt, stream};
use market_intel::agent::Agent;
use market_intel::error::{Error, FailureKind, Result};
use market_intel::llm::{ChatDelta, ChatMessage, ChatRequest, CompletionProvider, DeltaStream, ToolCallDelta, ToolDef};
use market_intel::system::MarketIntelligenceSystem;
use market_intel::tools::Capability;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Replays one scripted turn per request and records what it was sent.
#[derive(Default)]
struct ScriptedModel {
    turns: Mutex<VecDeque<Vec<ChatDelta>>>,
    requests: Mutex<Vec<ChatRequest>>,
    /// Replay this turn forever once the script runs out.
    repeat: Option<Vec<ChatDelta>>,
}

impl ScriptedModel {
    fn new(turns: Vec<Vec<ChatDelta>>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
            ..Default::default()
        })
    }

    fn looping(turn: Vec<ChatDelta>) -> Arc<Self> {
        Arc::new(Self {
            repeat: Some(turn),
            ..Default::default()
        })
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedModel {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn stream_chat(&self, request: &ChatRequest) -> Result<DeltaStream> {
        self.requests.lock().unwrap().push(request.clone());
        let turn = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.repeat.clone())
            .ok_or_else(|| Error::api_with_status("scripted", "no more turns", 500))?;
        Ok(stream::iter(turn.into_iter().map(Ok)).boxed())
    }
}

/// A quote lookup that records every symbol it was asked for.
#[derive(Default)]
struct FakeQuotes {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl Capability for FakeQuotes {
    fn name(&self) -> &str {
        "quotes"
    }

    fn functions(&self) -> Vec<ToolDef> {
        vec![ToolDef {
            name: "get_stock_price".into(),
            description: "Current price".into(),
            parameters: json!({"type": "object", "properties": {"symbol": {"type": "string"}}}),
        }]
    }

    async fn dispatch(&self, _function: &str, input: &Value) -> (String, bool) {
        let symbol = input["symbol"].as_str().unwrap_or("?").to_string();
        self.seen.lock().unwrap().push(symbol.clone());
        (format!("{symbol} 190.00 USD"), false)
    }
}

fn text(s: &str) -> ChatDelta {
    ChatDelta::Text(s.into())
}

fn call(index: usize, id: Option<&str>, name: Option<&str>, arguments: &str) -> ChatDelta {
    ChatDelta::ToolCall(ToolCallDelta {
        index,
        id: id.map(String::from),
        name: name.map(String::from),
        arguments: Some(arguments.into()),
    })
}

fn price_agent(model: Arc<ScriptedModel>, quotes: Arc<FakeQuotes>, show: bool) -> Agent {
    Agent::builder("Finance AI Agent")
        .role("Retrieve and analyze financial market data")
        .capability(quotes)
        .show_tool_calls(show)
        .build(model)
}

#[tokio::test]
async fn tool_result_is_fed_back_before_final_answer() {
    let model = ScriptedModel::new(vec![
        vec![
            text("Checking. "),
            call(0, Some("call_a"), Some("get_stock_price"), r#"{"sym"#),
            call(0, None, None, r#"bol":"AAPL"}"#),
        ],
        vec![text("AAPL trades at "), text("190.")],
    ]);
    let quotes = Arc::new(FakeQuotes::default());
    let agent = price_agent(model.clone(), quotes.clone(), true);

    let output = agent.run("Price of AAPL?").await.unwrap();
    assert_eq!(
        output,
        "Checking. \n - Running: get_stock_price(symbol=AAPL)\n\nAAPL trades at 190."
    );
    assert_eq!(*quotes.seen.lock().unwrap(), vec!["AAPL".to_string()]);

    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tools[0].name, "get_stock_price");
    assert!(matches!(&requests[0].messages[1], ChatMessage::User { content } if content == "Price of AAPL?"));

    let followup = &requests[1].messages;
    assert_eq!(followup.len(), 4);
    match &followup[2] {
        ChatMessage::Assistant {
            content,
            tool_calls,
        } => {
            assert_eq!(content.as_deref(), Some("Checking. "));
            assert_eq!(tool_calls[0].id, "call_a");
            assert_eq!(tool_calls[0].function.arguments, r#"{"symbol":"AAPL"}"#);
        }
        other => panic!("expected assistant message, got {other:?}"),
    }
    assert_eq!(followup[3], ChatMessage::tool("call_a", "AAPL 190.00 USD"));
}

#[tokio::test]
async fn hidden_tool_calls_emit_only_model_text() {
    let model = ScriptedModel::new(vec![
        vec![call(0, Some("c1"), Some("get_stock_price"), r#"{"symbol":"MSFT"}"#)],
        vec![text("MSFT looks steady.")],
    ]);
    let agent = price_agent(model, Arc::new(FakeQuotes::default()), false);
    assert_eq!(agent.run("MSFT?").await.unwrap(), "MSFT looks steady.");
}

#[tokio::test]
async fn text_streams_before_the_turn_ends() {
    let model = ScriptedModel::new(vec![vec![text("one "), text("two "), text("three")]]);
    let agent = price_agent(model, Arc::new(FakeQuotes::default()), true);
    let chunks: Vec<String> = agent
        .stream("count")
        .map(|c| c.unwrap())
        .collect()
        .await;
    assert_eq!(chunks, vec!["one ", "two ", "three"]);
}

#[tokio::test]
async fn parallel_calls_run_in_index_order() {
    let model = ScriptedModel::new(vec![
        vec![
            call(1, Some("c2"), Some("get_stock_price"), r#"{"symbol":"MSFT"}"#),
            call(0, Some("c1"), Some("get_stock_price"), r#"{"symbol":"AAPL"}"#),
        ],
        vec![text("done")],
    ]);
    let quotes = Arc::new(FakeQuotes::default());
    let agent = price_agent(model, quotes.clone(), false);
    agent.run("both").await.unwrap();
    assert_eq!(*quotes.seen.lock().unwrap(), vec!["AAPL", "MSFT"]);
}

#[tokio::test]
async fn unknown_tool_is_reported_to_the_model() {
    let model = ScriptedModel::new(vec![
        vec![call(0, Some("c1"), Some("get_weather"), "{}")],
        vec![text("I could not check the weather.")],
    ]);
    let agent = price_agent(model.clone(), Arc::new(FakeQuotes::default()), false);
    let output = agent.run("weather?").await.unwrap();
    assert_eq!(output, "I could not check the weather.");
    let requests = model.requests();
    assert_eq!(
        requests[1].messages.last(),
        Some(&ChatMessage::tool("c1", "Unknown tool: get_weather"))
    );
}

#[tokio::test]
async fn max_turns_skips_tools_requested_on_the_last_turn() {
    let model = ScriptedModel::looping(vec![call(0, Some("c"), Some("get_stock_price"), r#"{"symbol":"BTC-USD"}"#)]);
    let quotes = Arc::new(FakeQuotes::default());
    let agent = Agent::builder("Looper")
        .capability(quotes.clone())
        .max_turns(3)
        .build(model.clone());

    let err = agent.run("loop").await.unwrap_err();
    assert!(
        matches!(&err, Error::TurnLimit { agent, max_turns: 3 } if agent == "Looper"),
        "{err}"
    );
    assert_eq!(model.requests().len(), 3);
    assert_eq!(quotes.seen.lock().unwrap().len(), 2, "third turn's call must not run");
}

#[tokio::test]
async fn turn_limit_on_leader_is_reported_and_member_never_runs() {
    let member_model = ScriptedModel::new(vec![vec![text("unused")]]);
    let member = Agent::builder("Web Search Agent").build(member_model.clone());
    let leader_model = ScriptedModel::looping(vec![call(
        0,
        Some("t1"),
        Some("transfer_task_to_web_search_agent"),
        r#"{"task_description":"Find chip news"}"#,
    )]);
    let leader = Agent::builder("Market Analysis Team")
        .member(Arc::new(member))
        .max_turns(1)
        .build(leader_model.clone());
    let system = MarketIntelligenceSystem::new(leader);

    let mut out = Vec::new();
    let err = system.custom_analysis("q", &mut out).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::TurnLimit);
    assert_eq!(leader_model.requests().len(), 1);
    assert!(member_model.requests().is_empty());
    let written = String::from_utf8(out).unwrap();
    assert!(
        written.contains("Error processing custom query: Market Analysis Team reached its limit of 1 turns"),
        "{written}"
    );
}

#[tokio::test]
async fn provider_failure_ends_the_stream_with_error() {
    let model = ScriptedModel::new(vec![]);
    let agent = price_agent(model, Arc::new(FakeQuotes::default()), true);
    let err = agent.run("anything").await.unwrap_err();
    assert!(err.to_string().contains("no more turns"));
}

#[tokio::test]
async fn leader_delegates_to_member_and_uses_its_answer() {
    let member_model = ScriptedModel::new(vec![vec![text("Reuters: chip stocks rallied.")]]);
    let member = Agent::builder("Web Search Agent")
        .role("Search the web for market information and news")
        .build(member_model.clone());

    let leader_model = ScriptedModel::new(vec![
        vec![call(
            0,
            Some("t1"),
            Some("transfer_task_to_web_search_agent"),
            r#"{"task_description":"Find chip news","expected_output":"One line"}"#,
        )],
        vec![text("Summary: chips up.")],
    ]);
    let leader = Agent::builder("Market Analysis Team")
        .member(Arc::new(member))
        .show_tool_calls(true)
        .build(leader_model.clone());

    assert!(leader.system_prompt().contains("- Web Search Agent (transfer_task_to_web_search_agent): Search the web"));

    let output = leader.run("What moved chips?").await.unwrap();
    assert!(output.contains("Running: transfer_task_to_web_search_agent("));
    assert!(output.ends_with("Summary: chips up."));

    let member_requests = member_model.requests();
    assert_eq!(member_requests.len(), 1);
    assert_eq!(
        member_requests[0].messages[1],
        ChatMessage::user("Find chip news\n\nExpected output: One line")
    );
    assert_eq!(
        leader_model.requests()[1].messages.last(),
        Some(&ChatMessage::tool("t1", "Reuters: chip stocks rallied."))
    );
}

#[tokio::test]
async fn delegation_without_task_is_a_tool_error() {
    let member_model = ScriptedModel::new(vec![]);
    let member = Agent::builder("Finance AI Agent").build(member_model.clone());
    let leader_model = ScriptedModel::new(vec![
        vec![call(0, Some("t1"), Some("transfer_task_to_finance_ai_agent"), "{}")],
        vec![text("ok")],
    ]);
    let leader = Agent::builder("Lead")
        .member(Arc::new(member))
        .build(leader_model.clone());

    assert_eq!(leader.run("go").await.unwrap(), "ok");
    assert!(member_model.requests().is_empty());
    assert_eq!(
        leader_model.requests()[1].messages.last(),
        Some(&ChatMessage::tool("t1", "Missing 'task_description' parameter"))
    );
}
