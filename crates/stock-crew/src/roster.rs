//! Crew Roster and Scenarios
//!
//! Builds the agent definitions and wires them into runnable scenarios:
//! the supervised four-agent squad, or a single general-purpose assistant.

use std::sync::Arc;

use crew_core::{
    AgentDefinition, GenerationOptions, LlmProvider, Orchestrator, OrchestratorConfig,
    Supervisor, SupervisorConfig, ToolBridge, WorkerAgent, WorkerConfig,
};

use crate::{
    ASSISTANT_PROMPT, MARKET_DATA_PROMPT, NEWS_ANALYST_PROMPT, PRICE_RECOMMENDER_PROMPT,
    STOCK_FINDER_PROMPT, SUPERVISOR_PROMPT,
};

/// Which wiring the entry point should run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scenario {
    /// One general assistant with the full tool set
    Single,
    /// Supervised four-agent squad
    Squad,
}

impl std::str::FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(Self::Single),
            "squad" => Ok(Self::Squad),
            other => Err(format!("unknown scenario '{other}' (expected single or squad)")),
        }
    }
}

/// The four worker agent definitions, in intended pipeline order
pub fn roster() -> Vec<AgentDefinition> {
    vec![
        AgentDefinition::new(
            "stock_finder",
            "picks two promising NSE stocks for short-term trading",
            STOCK_FINDER_PROMPT,
        ),
        AgentDefinition::new(
            "market_data",
            "fetches current price, volume and technical indicators per ticker",
            MARKET_DATA_PROMPT,
        ),
        AgentDefinition::new(
            "news_analyst",
            "summarizes recent news and sentiment per stock",
            NEWS_ANALYST_PROMPT,
        ),
        AgentDefinition::new(
            "price_recommender",
            "turns market data and news into buy/sell/hold calls with targets",
            PRICE_RECOMMENDER_PROMPT,
        ),
    ]
}

/// Wire the supervised squad over a shared provider and tool bridge
pub fn build_squad(
    provider: Arc<dyn LlmProvider>,
    bridge: Arc<dyn ToolBridge>,
    generation: GenerationOptions,
    config: OrchestratorConfig,
) -> Orchestrator {
    let definitions = roster();

    let worker_config = WorkerConfig {
        generation: generation.clone(),
        ..Default::default()
    };
    let workers = definitions
        .iter()
        .map(|d| {
            WorkerAgent::new(
                d.clone(),
                provider.clone(),
                bridge.clone(),
                worker_config.clone(),
            )
        })
        .collect();

    let supervisor = Supervisor::new(
        provider,
        definitions,
        SupervisorConfig::new(SUPERVISOR_PROMPT, generation),
    );

    tracing::info!(agents = 4, "squad wired");
    Orchestrator::new(supervisor, workers, config)
}

/// Wire a single general-purpose assistant with the full tool set
pub fn build_single(
    provider: Arc<dyn LlmProvider>,
    bridge: Arc<dyn ToolBridge>,
    generation: GenerationOptions,
) -> WorkerAgent {
    let definition = AgentDefinition::new(
        "assistant",
        "general assistant with the full tool set",
        ASSISTANT_PROMPT,
    );
    let config = WorkerConfig {
        generation,
        ..Default::default()
    };
    WorkerAgent::new(definition, provider, bridge, config)
}
