//! Supervisor Routing
//!
//! The supervisor owns the routing policy: given the session so far, it
//! names exactly one worker agent to act next, or signals completion. The
//! policy text is advisory input to the decision model; the structural
//! rules (known agent names, one agent per decision) are enforced here in
//! code, because the model's output is untrusted.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CrewError, Result};
use crate::message::Message;
use crate::provider::{GenerationOptions, LlmProvider};
use crate::session::Session;
use crate::worker::AgentDefinition;

/// Routing decision produced fresh at each step from the current session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutingDecision {
    /// Hand the session to the named worker agent
    Assign { agent: String, reason: String },

    /// The goal is satisfied; extract the final answer
    Done { reason: String },
}

/// Supervisor configuration
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Routing policy instructions (advisory, rendered into the prompt)
    pub instructions: String,

    /// Generation options; forced deterministic so the decision is a pure
    /// function of the session snapshot
    pub generation: GenerationOptions,
}

impl SupervisorConfig {
    pub fn new(instructions: impl Into<String>, generation: GenerationOptions) -> Self {
        Self {
            instructions: instructions.into(),
            generation: generation.deterministic(),
        }
    }
}

const DECISION_FORMAT: &str = r#"Decide the next step. Respond with exactly one JSON block:

```route
{"next": "<agent_name>", "reason": "<one sentence>"}
```

or, when the goal is fully satisfied:

```route
{"done": true, "reason": "<one sentence>"}
```

Name exactly one agent per decision. Agents run strictly one at a time."#;

/// Routing policy over a fixed agent roster
pub struct Supervisor {
    provider: Arc<dyn LlmProvider>,
    roster: Vec<AgentDefinition>,
    config: SupervisorConfig,
}

/// Wire shape of the model's decision block
#[derive(Debug, Deserialize)]
struct DecisionWire {
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    reason: String,
}

impl Supervisor {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        roster: Vec<AgentDefinition>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            provider,
            roster,
            config,
        }
    }

    pub fn roster(&self) -> &[AgentDefinition] {
        &self.roster
    }

    /// Build the routing prompt: policy + roster + decision format
    fn build_prompt(&self) -> String {
        let mut prompt = self.config.instructions.clone();
        prompt.push_str("\n\n## Agents\n\n");
        for agent in &self.roster {
            prompt.push_str(&format!("- `{}`: {}\n", agent.name, agent.summary));
        }
        prompt.push('\n');
        prompt.push_str(DECISION_FORMAT);
        prompt
    }

    /// Produce a routing decision for the current session snapshot
    pub async fn route(&self, session: &Session) -> Result<RoutingDecision> {
        let mut view: Vec<Message> = Vec::with_capacity(session.len() + 1);
        view.push(Message::system(self.build_prompt()));
        view.extend(session.messages().iter().cloned());

        let completion = self
            .provider
            .complete(&view, &self.config.generation)
            .await?;

        let decision = Self::parse_decision(&completion.content)?;

        if let RoutingDecision::Assign { agent, .. } = &decision {
            if !self.roster.iter().any(|a| &a.name == agent) {
                return Err(CrewError::Parse(format!(
                    "supervisor named unknown agent '{}'",
                    agent
                )));
            }
        }

        tracing::debug!(?decision, "routing decision");
        Ok(decision)
    }

    /// Parse the fenced ```route block (with raw-JSON fallback)
    fn parse_decision(content: &str) -> Result<RoutingDecision> {
        let json_str = Self::extract_block(content)
            .or_else(|| Self::extract_inline(content))
            .ok_or_else(|| CrewError::Parse("no routing decision in supervisor reply".into()))?;

        let wire: DecisionWire = serde_json::from_str(json_str)
            .map_err(|e| CrewError::Parse(format!("bad routing decision: {}", e)))?;

        match (wire.done, wire.next) {
            (true, _) => Ok(RoutingDecision::Done { reason: wire.reason }),
            (false, Some(agent)) => Ok(RoutingDecision::Assign {
                agent,
                reason: wire.reason,
            }),
            (false, None) => Err(CrewError::Parse(
                "routing decision names no agent and is not done".into(),
            )),
        }
    }

    fn extract_block(content: &str) -> Option<&str> {
        let start = content.find("```route")?;
        let after = &content[start + "```route".len()..];
        let end = after.find("```")?;
        Some(after[..end].trim())
    }

    fn extract_inline(content: &str) -> Option<&str> {
        if !content.contains(r#""next""#) && !content.contains(r#""done""#) {
            return None;
        }
        let start = content.find('{')?;
        let end = content.rfind('}')?;
        (end > start).then(|| &content[start..=end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ScriptRule, ScriptedProvider};

    fn roster() -> Vec<AgentDefinition> {
        vec![
            AgentDefinition::new("stock_finder", "picks stocks", "full instructions"),
            AgentDefinition::new("market_data", "fetches market data", "full instructions"),
        ]
    }

    fn supervisor(provider: ScriptedProvider) -> Supervisor {
        Supervisor::new(
            Arc::new(provider),
            roster(),
            SupervisorConfig::new("Route tasks to agents.", GenerationOptions::default()),
        )
    }

    #[tokio::test]
    async fn test_route_assigns_known_agent() {
        let sup = supervisor(ScriptedProvider::new(
            vec![],
            "```route\n{\"next\": \"stock_finder\", \"reason\": \"nothing picked yet\"}\n```",
        ));
        let session = Session::new("recommend stocks");

        let decision = sup.route(&session).await.unwrap();
        assert_eq!(
            decision,
            RoutingDecision::Assign {
                agent: "stock_finder".into(),
                reason: "nothing picked yet".into()
            }
        );
    }

    #[tokio::test]
    async fn test_route_rejects_unknown_agent() {
        let sup = supervisor(ScriptedProvider::new(
            vec![],
            "```route\n{\"next\": \"astrologer\", \"reason\": \"vibes\"}\n```",
        ));
        let session = Session::new("recommend stocks");

        let err = sup.route(&session).await.unwrap_err();
        assert!(matches!(err, CrewError::Parse(msg) if msg.contains("astrologer")));
    }

    #[tokio::test]
    async fn test_route_done() {
        let sup = supervisor(ScriptedProvider::new(
            vec![],
            "```route\n{\"done\": true, \"reason\": \"all sub-tasks complete\"}\n```",
        ));
        let session = Session::new("recommend stocks");

        let decision = sup.route(&session).await.unwrap();
        assert!(matches!(decision, RoutingDecision::Done { .. }));
    }

    #[tokio::test]
    async fn test_route_is_idempotent_on_identical_snapshot() {
        let sup = supervisor(ScriptedProvider::new(
            vec![
                ScriptRule::new(
                    &["market data gathered"],
                    "```route\n{\"done\": true, \"reason\": \"complete\"}\n```",
                ),
                ScriptRule::new(
                    &["recommend stocks"],
                    "```route\n{\"next\": \"stock_finder\", \"reason\": \"start\"}\n```",
                ),
            ],
            "```route\n{\"done\": true, \"reason\": \"fallback\"}\n```",
        ));
        let session = Session::new("recommend stocks");

        let first = sup.route(&session).await.unwrap();
        let second = sup.route(&session).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unparseable_reply_is_parse_error() {
        let sup = supervisor(ScriptedProvider::new(vec![], "let me think about that..."));
        let session = Session::new("recommend stocks");

        let err = sup.route(&session).await.unwrap_err();
        assert!(matches!(err, CrewError::Parse(_)));
    }

    #[test]
    fn test_inline_decision_fallback() {
        let decision =
            Supervisor::parse_decision(r#"Next up: {"next": "market_data", "reason": "need prices"}"#)
                .unwrap();
        assert!(matches!(decision, RoutingDecision::Assign { agent, .. } if agent == "market_data"));
    }
}
