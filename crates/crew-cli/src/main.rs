//! trade-crew CLI
//!
//! Takes a free-text goal and a scenario selector, runs the crew, and
//! prints the final answer to stdout. Failures print `kind: reason` to
//! stderr and exit non-zero; progress goes to the log, never to stdout.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crew_core::{
    cancel_pair, CrewError, GenerationOptions, LlmProvider, OrchestratorConfig, Result, Role,
    RunEvent, Session, ToolBridge,
};
use crew_runtime::{OllamaProvider, OpenAiProvider, ScraperConfig, StdioBridge};
use stock_crew::{build_single, build_squad, CannedBridge, Scenario};

const DEFAULT_GOAL: &str = "Give me a good stock recommendation from the NSE";

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProviderArg {
    /// Local Ollama inference
    Ollama,
    /// OpenAI chat completions API
    Openai,
}

#[derive(Parser, Debug)]
#[command(name = "crew", version, about = "Supervised multi-agent stock recommendation crew")]
struct Cli {
    /// Free-text goal for the crew
    goal: Option<String>,

    /// Which wiring to run: single assistant or supervised squad
    #[arg(long, default_value = "squad")]
    scenario: Scenario,

    /// Model backend
    #[arg(long, value_enum, default_value_t = ProviderArg::Ollama)]
    provider: ProviderArg,

    /// Model identifier (defaults per provider)
    #[arg(long)]
    model: Option<String>,

    /// Use canned tool data instead of the live scraper server
    #[arg(long)]
    offline: bool,

    /// Wall-clock budget for the whole run, in seconds
    #[arg(long)]
    budget_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(answer) => {
            println!("{answer}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "run failed");
            eprintln!("{}: {}", e.kind(), e.user_message());
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<String> {
    let (provider, default_model): (Arc<dyn LlmProvider>, &str) = match cli.provider {
        ProviderArg::Ollama => (Arc::new(OllamaProvider::from_env()), "llama3.2"),
        ProviderArg::Openai => (Arc::new(OpenAiProvider::from_env()?), "gpt-4.1"),
    };

    match provider.health_check().await {
        Ok(true) => tracing::info!(provider = provider.name(), "model backend ready"),
        Ok(false) | Err(_) => {
            tracing::warn!(
                provider = provider.name(),
                "model backend not reachable, the run will likely fail"
            );
        }
    }

    let generation = GenerationOptions {
        model: cli
            .model
            .clone()
            .unwrap_or_else(|| default_model.to_string()),
        ..Default::default()
    };

    let bridge: Arc<dyn ToolBridge> = if cli.offline {
        tracing::info!("offline mode: using canned tool data");
        Arc::new(CannedBridge::new())
    } else {
        // Credentials are validated here, before any agent runs
        let config = ScraperConfig::from_env()?;
        Arc::new(StdioBridge::spawn(&config).await?)
    };

    match bridge.list_tools().await {
        Ok(tools) => {
            tracing::info!(bridge = bridge.name(), count = tools.len(), "tools available");
            for tool in &tools {
                tracing::debug!(tool = %tool.name, "registered");
            }
        }
        Err(e) => tracing::warn!(error = %e, "could not list tools"),
    }

    let (cancel_source, cancel_token) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            cancel_source.cancel();
        }
    });

    let goal = cli.goal.clone().unwrap_or_else(|| DEFAULT_GOAL.into());
    tracing::info!(%goal, scenario = ?cli.scenario, "starting run");

    match cli.scenario {
        Scenario::Single => {
            let agent = build_single(provider, bridge, generation);
            let session = Session::new(&goal);
            let messages = agent.run(&session, &cancel_token).await?;

            messages
                .iter()
                .rev()
                .find(|m| m.role == Role::Assistant)
                .map(|m| m.content.clone())
                .ok_or_else(|| CrewError::Other("agent produced no answer".into()))
        }
        Scenario::Squad => {
            let config = OrchestratorConfig {
                deadline: cli.budget_secs.map(Duration::from_secs),
                ..Default::default()
            };

            let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
            tokio::spawn(async move {
                while let Some(event) = events_rx.recv().await {
                    match event {
                        RunEvent::RouteDecided { agent, reason } => {
                            tracing::info!(%agent, %reason, "routing");
                        }
                        RunEvent::AgentStarted { agent } => {
                            tracing::info!(%agent, "agent started");
                        }
                        RunEvent::AgentFinished { agent, messages } => {
                            tracing::info!(%agent, messages, "agent finished");
                        }
                        RunEvent::RouteDone { reason } => {
                            tracing::info!(%reason, "goal complete");
                        }
                    }
                }
            });

            let orchestrator =
                build_squad(provider, bridge, generation, config).with_events(events_tx);
            let outcome = orchestrator.run(&goal, &cancel_token).await?;

            tracing::info!(
                rounds = outcome.rounds,
                messages = outcome.session.len(),
                "session finished"
            );
            Ok(outcome.final_answer)
        }
    }
}
