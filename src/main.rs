use anyhow::Result;
use clap::Parser;
use market_intel::config::{Config, Credentials};
use market_intel::llm::Provider;
use market_intel::system::MarketIntelligenceSystem;
use market_intel::{LlmOverride, terminal};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "market-intel",
    version,
    about = "Interactive market intelligence: a team of LLM agents for asset analysis, market overviews and custom queries"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "market-intel.toml")]
    config: PathBuf,

    /// LLM provider override for the member agents: groq, openai
    #[arg(long, value_parser = parse_provider)]
    provider: Option<Provider>,

    /// LLM model override for the member agents
    #[arg(long)]
    model: Option<String>,
}

fn parse_provider(raw: &str) -> std::result::Result<Provider, String> {
    match raw.to_ascii_lowercase().as_str() {
        "groq" => Ok(Provider::Groq),
        "openai" => Ok(Provider::OpenAi),
        other => Err(format!("unknown provider '{other}' (expected groq or openai)")),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("market_intel=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    dotenvy::from_path("../.env").ok();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            terminal::report_fatal(&e, &mut std::io::stdout()).ok();
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(&cli.config)?;
    if let Some(llm_override) = LlmOverride::from_flags(cli.provider, cli.model) {
        llm_override.apply(&mut config.llm);
    }

    let credentials = Credentials::from_env()?;
    info!(
        openai_key = credentials.openai_api_key().is_some(),
        phi_key = credentials.has_phi_key(),
        "credentials loaded"
    );

    let system = MarketIntelligenceSystem::initialize(&credentials, &config)?;

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    terminal::run(&system, stdin.lock(), &mut stdout).await?;
    Ok(())
}
