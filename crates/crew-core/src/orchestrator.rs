//! Orchestration Loop
//!
//! Top-level state machine driving one session:
//! `ROUTING -> AGENT_RUNNING -> ROUTING -> ... -> DONE | FAILED`.
//!
//! The loop is single-threaded with respect to agent invocation: it awaits
//! the supervisor, then awaits exactly one worker, then routes again. That
//! sequential structure, not the routing prompt, is what guarantees agents
//! never run concurrently within a session. A hard round budget and an
//! optional wall-clock deadline guard against routing cycles.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::cancel::CancelToken;
use crate::error::{CrewError, Result};
use crate::session::Session;
use crate::supervisor::{RoutingDecision, Supervisor};
use crate::worker::WorkerAgent;

/// Orchestrator configuration
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Hard budget on routing rounds for one session
    pub max_rounds: usize,

    /// How many times in a row the supervisor may re-select the same agent
    /// before the run is declared stalled
    pub max_repeat_assignments: usize,

    /// Optional wall-clock budget across the whole loop
    pub deadline: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_rounds: 12,
            max_repeat_assignments: 2,
            deadline: None,
        }
    }
}

/// Progress event emitted while a session runs
#[derive(Clone, Debug)]
pub enum RunEvent {
    /// Supervisor selected the next agent
    RouteDecided { agent: String, reason: String },

    /// Supervisor judged the goal complete
    RouteDone { reason: String },

    /// Worker began its loop
    AgentStarted { agent: String },

    /// Worker finished, producing `messages` new messages
    AgentFinished { agent: String, messages: usize },
}

/// Result of a completed session
#[derive(Debug)]
pub struct RunOutcome {
    /// The last assistant message at the time the supervisor signalled done
    pub final_answer: String,

    /// The full session transcript (audit trail)
    pub session: Session,

    /// Routing rounds consumed
    pub rounds: usize,
}

/// Drives one session at a time through supervisor and workers
pub struct Orchestrator {
    supervisor: Supervisor,
    workers: HashMap<String, WorkerAgent>,
    config: OrchestratorConfig,
    events: Option<mpsc::UnboundedSender<RunEvent>>,
}

impl Orchestrator {
    pub fn new(
        supervisor: Supervisor,
        workers: Vec<WorkerAgent>,
        config: OrchestratorConfig,
    ) -> Self {
        let workers = workers
            .into_iter()
            .map(|w| (w.name().to_string(), w))
            .collect();
        Self {
            supervisor,
            workers,
            config,
            events: None,
        }
    }

    /// Attach a progress event channel
    pub fn with_events(mut self, events: mpsc::UnboundedSender<RunEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Run a goal to completion.
    ///
    /// The session is created here, owned by this call, and returned inside
    /// the outcome; nothing is persisted.
    pub async fn run(&self, goal: &str, cancel: &CancelToken) -> Result<RunOutcome> {
        let started = Instant::now();
        let mut session = Session::new(goal);
        let mut last_agent: Option<String> = None;
        let mut repeats = 0usize;

        tracing::info!(session = %session.id(), goal, "session started");

        for round in 1..=self.config.max_rounds {
            if cancel.is_cancelled() {
                return Err(CrewError::Cancelled);
            }
            if let Some(deadline) = self.config.deadline {
                if started.elapsed() >= deadline {
                    return Err(CrewError::RoutingStall(format!(
                        "wall-clock budget ({:?}) exhausted after {} rounds",
                        deadline,
                        round - 1
                    )));
                }
            }

            // ROUTING
            let decision = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(CrewError::Cancelled),
                result = self.supervisor.route(&session) => result?,
            };

            match decision {
                RoutingDecision::Done { reason } => {
                    self.emit(RunEvent::RouteDone {
                        reason: reason.clone(),
                    });
                    tracing::info!(session = %session.id(), rounds = round, %reason, "session done");

                    // DONE: the final answer is the last assistant message
                    let final_answer = session
                        .final_answer()
                        .map(|m| m.content.clone())
                        .ok_or_else(|| {
                            CrewError::Other(
                                "supervisor signalled done before any agent answered".into(),
                            )
                        })?;

                    return Ok(RunOutcome {
                        final_answer,
                        session,
                        rounds: round,
                    });
                }

                RoutingDecision::Assign { agent, reason } => {
                    if last_agent.as_deref() == Some(agent.as_str()) {
                        repeats += 1;
                        if repeats >= self.config.max_repeat_assignments {
                            return Err(CrewError::RoutingStall(format!(
                                "supervisor re-selected '{}' {} times in a row",
                                agent,
                                repeats + 1
                            )));
                        }
                    } else {
                        repeats = 0;
                    }
                    last_agent = Some(agent.clone());

                    let worker = self.workers.get(&agent).ok_or_else(|| {
                        CrewError::Parse(format!("no worker registered for agent '{}'", agent))
                    })?;

                    self.emit(RunEvent::RouteDecided {
                        agent: agent.clone(),
                        reason,
                    });
                    self.emit(RunEvent::AgentStarted {
                        agent: agent.clone(),
                    });
                    tracing::info!(session = %session.id(), %agent, round, "agent running");

                    // AGENT_RUNNING: exactly one worker, awaited to completion
                    let new_messages = worker.run(&session, cancel).await?;

                    self.emit(RunEvent::AgentFinished {
                        agent: agent.clone(),
                        messages: new_messages.len(),
                    });

                    session.extend(new_messages);
                }
            }
        }

        Err(CrewError::RoutingStall(format!(
            "round budget ({}) exhausted without completion",
            self.config.max_rounds
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{ToolBridge, ToolCall, ToolOutput, ToolSchema};
    use crate::message::Message;
    use crate::provider::{
        Completion, GenerationOptions, LlmProvider, ScriptRule, ScriptedProvider,
    };
    use crate::supervisor::SupervisorConfig;
    use crate::worker::{AgentDefinition, WorkerConfig};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct NoTools;

    #[async_trait]
    impl ToolBridge for NoTools {
        fn name(&self) -> &str {
            "none"
        }
        async fn list_tools(&self) -> Result<Vec<ToolSchema>> {
            Ok(vec![])
        }
        async fn call(&self, call: &ToolCall) -> Result<ToolOutput> {
            Ok(ToolOutput::failure(&call.name, "no tools here"))
        }
        async fn health_check(&self) -> bool {
            true
        }
    }

    /// Counts in-flight completions to catch overlapping agent activity
    struct GaugeProvider {
        inner: ScriptedProvider,
        active: AtomicUsize,
        max_seen: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LlmProvider for GaugeProvider {
        fn name(&self) -> &str {
            "gauge"
        }
        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }
        async fn complete(
            &self,
            messages: &[Message],
            options: &GenerationOptions,
        ) -> Result<Completion> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            let result = self.inner.complete(messages, options).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    const POLICY: &str = "ROUTE-POLICY: delegate one agent at a time, do no work yourself.";

    fn two_agent_rules() -> Vec<ScriptRule> {
        vec![
            // Supervisor decisions (its view carries the policy marker)
            ScriptRule::new(
                &["ROUTE-POLICY", "ALPHA-DONE", "BETA-DONE"],
                "```route\n{\"done\": true, \"reason\": \"both finished\"}\n```",
            ),
            ScriptRule::new(
                &["ROUTE-POLICY", "ALPHA-DONE"],
                "```route\n{\"next\": \"beta\", \"reason\": \"alpha finished\"}\n```",
            ),
            ScriptRule::new(
                &["ROUTE-POLICY"],
                "```route\n{\"next\": \"alpha\", \"reason\": \"start\"}\n```",
            ),
            // Worker replies (their views carry their own instructions)
            ScriptRule::new(&["You are agent alpha."], "ALPHA-DONE"),
            ScriptRule::new(&["You are agent beta."], "BETA-DONE"),
        ]
    }

    fn build(
        provider: Arc<dyn LlmProvider>,
        config: OrchestratorConfig,
    ) -> Orchestrator {
        let bridge: Arc<dyn ToolBridge> = Arc::new(NoTools);
        let defs = vec![
            AgentDefinition::new("alpha", "does the first half", "You are agent alpha."),
            AgentDefinition::new("beta", "does the second half", "You are agent beta."),
        ];
        let workers = defs
            .iter()
            .map(|d| {
                WorkerAgent::new(
                    d.clone(),
                    provider.clone(),
                    bridge.clone(),
                    WorkerConfig::default(),
                )
            })
            .collect();
        let supervisor = Supervisor::new(
            provider,
            defs,
            SupervisorConfig::new(POLICY, GenerationOptions::default()),
        );
        Orchestrator::new(supervisor, workers, config)
    }

    #[tokio::test]
    async fn test_runs_agents_in_sequence_to_done() {
        let provider = Arc::new(ScriptedProvider::new(two_agent_rules(), "unparseable"));
        let orchestrator = build(provider, OrchestratorConfig::default());

        let outcome = orchestrator
            .run("do both halves", &CancelToken::never())
            .await
            .unwrap();

        assert_eq!(outcome.final_answer, "BETA-DONE");
        assert_eq!(outcome.rounds, 3);
        // goal + two worker answers
        assert_eq!(outcome.session.len(), 3);
        let origins: Vec<_> = outcome
            .session
            .messages()
            .iter()
            .filter_map(|m| m.origin_agent.as_deref())
            .collect();
        assert_eq!(origins, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn test_agents_never_overlap() {
        let max_seen = Arc::new(AtomicUsize::new(0));
        let provider = Arc::new(GaugeProvider {
            inner: ScriptedProvider::new(two_agent_rules(), "unparseable"),
            active: AtomicUsize::new(0),
            max_seen: max_seen.clone(),
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let orchestrator = build(provider, OrchestratorConfig::default()).with_events(tx);

        orchestrator
            .run("do both halves", &CancelToken::never())
            .await
            .unwrap();

        // No two model calls (supervisor or worker) were ever in flight at once
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);

        // Every started agent finished before the next one started
        let mut active: Option<String> = None;
        while let Ok(event) = rx.try_recv() {
            match event {
                RunEvent::AgentStarted { agent } => {
                    assert!(active.is_none(), "agent '{agent}' started while another ran");
                    active = Some(agent);
                }
                RunEvent::AgentFinished { agent, .. } => {
                    assert_eq!(active.as_deref(), Some(agent.as_str()));
                    active = None;
                }
                _ => {}
            }
        }
        assert!(active.is_none());
    }

    #[tokio::test]
    async fn test_repeat_assignments_stall() {
        // Supervisor keeps picking alpha no matter what
        let rules = vec![
            ScriptRule::new(
                &["ROUTE-POLICY"],
                "```route\n{\"next\": \"alpha\", \"reason\": \"again\"}\n```",
            ),
            ScriptRule::new(&["You are agent alpha."], "ALPHA-DONE"),
        ];
        let provider = Arc::new(ScriptedProvider::new(rules, "unparseable"));
        let orchestrator = build(provider, OrchestratorConfig::default());

        let err = orchestrator
            .run("loop forever", &CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, CrewError::RoutingStall(msg) if msg.contains("alpha")));
    }

    #[tokio::test]
    async fn test_round_budget_exhaustion() {
        let rules = vec![
            ScriptRule::new(
                &["ROUTE-POLICY"],
                "```route\n{\"next\": \"alpha\", \"reason\": \"again\"}\n```",
            ),
            ScriptRule::new(&["You are agent alpha."], "ALPHA-DONE"),
        ];
        let provider = Arc::new(ScriptedProvider::new(rules, "unparseable"));
        let config = OrchestratorConfig {
            max_rounds: 2,
            max_repeat_assignments: 100,
            deadline: None,
        };
        let orchestrator = build(provider, config);

        let err = orchestrator
            .run("loop forever", &CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, CrewError::RoutingStall(msg) if msg.contains("round budget")));
    }

    #[tokio::test]
    async fn test_deadline_budget() {
        let provider = Arc::new(ScriptedProvider::new(two_agent_rules(), "unparseable"));
        let config = OrchestratorConfig {
            deadline: Some(Duration::ZERO),
            ..Default::default()
        };
        let orchestrator = build(provider, config);

        let err = orchestrator
            .run("anything", &CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, CrewError::RoutingStall(msg) if msg.contains("wall-clock")));
    }

    #[tokio::test]
    async fn test_done_without_answer_is_an_error() {
        let rules = vec![ScriptRule::new(
            &["ROUTE-POLICY"],
            "```route\n{\"done\": true, \"reason\": \"premature\"}\n```",
        )];
        let provider = Arc::new(ScriptedProvider::new(rules, "unparseable"));
        let orchestrator = build(provider, OrchestratorConfig::default());

        let err = orchestrator
            .run("anything", &CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, CrewError::Other(_)));
    }

    #[tokio::test]
    async fn test_cancelled_run() {
        let (source, token) = crate::cancel::cancel_pair();
        source.cancel();

        let provider = Arc::new(ScriptedProvider::new(two_agent_rules(), "unparseable"));
        let orchestrator = build(provider, OrchestratorConfig::default());

        let err = orchestrator.run("anything", &token).await.unwrap_err();
        assert!(matches!(err, CrewError::Cancelled));
    }
}
