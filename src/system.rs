//! The market intelligence system: a coordinator agent plus the three
//! request operations the terminal menu exposes.

use crate::agent::{Agent, factory};
use crate::config::{Config, Credentials};
use crate::error::{Error, RequestError, Result};
use crate::output::{Completion, write_stream};
use crate::prompts::{asset_prompt, overview_prompt, resolve_asset_type};
use crate::stream::TextStream;
use std::io::Write;
use std::sync::Arc;
use tracing::{error, info, warn};

pub const ANALYZE_ASSET: &str = "Error analyzing asset";
pub const MARKET_OVERVIEW: &str = "Error getting market overview";
pub const CUSTOM_QUERY: &str = "Error processing custom query";

/// Whatever answers a prompt with a stream of text.
pub trait Coordinator: Send + Sync {
    fn respond(&self, prompt: &str) -> Result<TextStream>;
}

impl<C: Coordinator + ?Sized> Coordinator for Arc<C> {
    fn respond(&self, prompt: &str) -> Result<TextStream> {
        (**self).respond(prompt)
    }
}

impl Coordinator for Agent {
    fn respond(&self, prompt: &str) -> Result<TextStream> {
        Ok(self.stream(prompt))
    }
}

pub struct MarketIntelligenceSystem {
    coordinator: Box<dyn Coordinator>,
}

impl MarketIntelligenceSystem {
    /// Build the search agent, the finance agent and the team coordinator.
    pub fn initialize(credentials: &Credentials, config: &Config) -> Result<Self> {
        let built = factory::search_agent(credentials, config).and_then(|search| {
            let finance = factory::finance_agent(credentials, config)?;
            factory::analysis_coordinator(search, finance, credentials, config)
        });
        match built {
            Ok(coordinator) => {
                info!(
                    coordinator = %coordinator.name(),
                    model = %coordinator.model_name(),
                    "agents initialized"
                );
                Ok(Self::new(coordinator))
            }
            Err(e) => {
                error!("Error initializing agents: {e}");
                Err(e)
            }
        }
    }

    pub fn new(coordinator: impl Coordinator + 'static) -> Self {
        Self {
            coordinator: Box::new(coordinator),
        }
    }

    /// Analyze one stock or crypto asset. Without `asset_type` the type is
    /// guessed from the symbol.
    pub async fn analyze_asset<W: Write>(
        &self,
        symbol: &str,
        asset_type: Option<&str>,
        out: &mut W,
    ) -> std::result::Result<Completion, RequestError> {
        let asset_type = resolve_asset_type(symbol, asset_type);
        info!(symbol, asset_type = %asset_type, "analyzing asset");
        self.request(ANALYZE_ASSET, &asset_prompt(symbol, asset_type), out)
            .await
    }

    pub async fn market_overview<W: Write>(
        &self,
        focus_areas: Option<&[String]>,
        out: &mut W,
    ) -> std::result::Result<Completion, RequestError> {
        info!(focus = ?focus_areas, "market overview");
        self.request(MARKET_OVERVIEW, &overview_prompt(focus_areas), out)
            .await
    }

    pub async fn custom_analysis<W: Write>(
        &self,
        query: &str,
        out: &mut W,
    ) -> std::result::Result<Completion, RequestError> {
        info!("custom query");
        self.request(CUSTOM_QUERY, query, out).await
    }

    async fn request<W: Write>(
        &self,
        operation: &'static str,
        prompt: &str,
        out: &mut W,
    ) -> std::result::Result<Completion, RequestError> {
        let result = match self.coordinator.respond(prompt) {
            Ok(stream) => write_stream(stream, out).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(completion) if completion.is_empty() => {
                warn!(operation, "coordinator returned an empty response");
                Ok(completion)
            }
            Ok(completion) => {
                info!(chunks = completion.chunks, chars = completion.text.len(), "response complete");
                Ok(completion)
            }
            Err(source) => Err(report(operation, source, out)),
        }
    }
}

fn report<W: Write>(operation: &'static str, source: Error, out: &mut W) -> RequestError {
    let err = RequestError::new(operation, source);
    error!(kind = %err.kind, "{err}");
    // The sink may be what failed; the log line above still records it.
    let _ = writeln!(out, "\n{err}").and_then(|()| out.flush());
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use futures::{StreamExt, stream};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        prompts: Mutex<Vec<String>>,
    }

    impl Coordinator for Recorder {
        fn respond(&self, prompt: &str) -> Result<TextStream> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(stream::iter(vec![Ok("ok".to_string())]).boxed())
        }
    }

    struct Refuses;

    impl Coordinator for Refuses {
        fn respond(&self, _prompt: &str) -> Result<TextStream> {
            Err(Error::api_with_status("groq", "invalid api key", 401))
        }
    }

    struct DropsMidway;

    impl Coordinator for DropsMidway {
        fn respond(&self, _prompt: &str) -> Result<TextStream> {
            Ok(stream::iter(vec![
                Ok("Partial ".to_string()),
                Err(Error::http("connection reset")),
            ])
            .boxed())
        }
    }

    #[tokio::test]
    async fn asset_prompt_uses_detected_type() {
        let recorder = Arc::new(Recorder::default());
        let system = MarketIntelligenceSystem::new(recorder.clone());
        let mut out = Vec::new();

        system.analyze_asset("BTC-USD", None, &mut out).await.unwrap();
        system.analyze_asset("AAPL", Some("crypto"), &mut out).await.unwrap();

        let prompts = recorder.prompts.lock().unwrap();
        assert!(prompts[0].starts_with("Analyze BTC-USD (crypto):"));
        assert!(prompts[1].starts_with("Analyze AAPL (crypto):"));
        assert_eq!(String::from_utf8(out).unwrap(), "ok\nok\n");
    }

    #[tokio::test]
    async fn custom_query_is_forwarded_verbatim() {
        let recorder = Arc::new(Recorder::default());
        let system = MarketIntelligenceSystem::new(recorder.clone());
        let query = "  Compare NVDA and AMD margins  ";
        system.custom_analysis(query, &mut Vec::new()).await.unwrap();
        assert_eq!(recorder.prompts.lock().unwrap()[0], query);
    }

    #[tokio::test]
    async fn refused_request_is_reported_not_raised() {
        let system = MarketIntelligenceSystem::new(Refuses);
        let mut out = Vec::new();
        let err = system.market_overview(None, &mut out).await.unwrap_err();
        assert_eq!(err.operation, MARKET_OVERVIEW);
        assert_eq!(err.kind, FailureKind::Authentication);
        let written = String::from_utf8(out).unwrap();
        assert!(written.contains("Error getting market overview: API error (groq): invalid api key"));
    }

    #[tokio::test]
    async fn failure_mid_stream_keeps_partial_output() {
        let system = MarketIntelligenceSystem::new(DropsMidway);
        let mut out = Vec::new();
        let err = system.custom_analysis("q", &mut out).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Network);
        let written = String::from_utf8(out).unwrap();
        assert!(written.starts_with("Partial "));
        assert!(written.contains("Error processing custom query: HTTP error: connection reset"));
    }
}
