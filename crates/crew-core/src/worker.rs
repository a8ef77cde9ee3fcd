//! Worker Agent Loop
//!
//! A worker is a bounded reason/act loop focused on one task category.
//! Given the session so far and its assigned tool subset, it repeatedly asks
//! the model for a next action, invokes tools through the bridge when asked,
//! and returns its new messages once the model produces a final answer.
//!
//! Workers never mutate the session: they return the messages they produced
//! and the orchestrator appends them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::bridge::{call_with_retry, filter_tools, prompt_section, RetryPolicy, ToolBridge, ToolCall, ToolOutput};
use crate::cancel::CancelToken;
use crate::error::{CrewError, Result};
use crate::message::Message;
use crate::provider::{GenerationOptions, LlmProvider};
use crate::session::Session;

/// Static definition of one worker agent.
///
/// Created at configuration time and never mutated during a run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Unique agent name (used by the supervisor to address it)
    pub name: String,

    /// One-line role summary, shown to the supervisor
    pub summary: String,

    /// Full system instructions for the agent's own loop
    pub instructions: String,

    /// Assigned tool subset; `None` grants the full bridge tool set
    #[serde(default)]
    pub tools: Option<Vec<String>>,
}

impl AgentDefinition {
    pub fn new(
        name: impl Into<String>,
        summary: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            summary: summary.into(),
            instructions: instructions.into(),
            tools: None,
        }
    }

    /// Restrict the agent to a named tool subset
    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = Some(tools);
        self
    }
}

/// Worker configuration
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Maximum loop steps before giving up
    pub max_steps: usize,

    /// Generation options
    pub generation: GenerationOptions,

    /// Retry policy for retryable tool faults
    pub retry: RetryPolicy,

    /// Whether to append tool descriptions to the system prompt
    pub inject_tool_descriptions: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            generation: GenerationOptions::default(),
            retry: RetryPolicy::default(),
            inject_tool_descriptions: true,
        }
    }
}

/// A worker agent bound to a provider and a tool bridge
pub struct WorkerAgent {
    definition: AgentDefinition,
    provider: Arc<dyn LlmProvider>,
    bridge: Arc<dyn ToolBridge>,
    config: WorkerConfig,
}

impl WorkerAgent {
    pub fn new(
        definition: AgentDefinition,
        provider: Arc<dyn LlmProvider>,
        bridge: Arc<dyn ToolBridge>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            definition,
            provider,
            bridge,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &AgentDefinition {
        &self.definition
    }

    /// Build the full system prompt including the assigned tool descriptions
    async fn build_system_prompt(&self) -> Result<String> {
        let mut prompt = self.definition.instructions.clone();

        if self.config.inject_tool_descriptions {
            let tools = filter_tools(
                self.bridge.list_tools().await?,
                self.definition.tools.as_deref(),
            );
            if !tools.is_empty() {
                prompt.push_str("\n\n");
                prompt.push_str(&prompt_section(&tools));
            }
        }

        Ok(prompt)
    }

    /// Run the loop against a session snapshot.
    ///
    /// Returns the messages this worker produced, in order. The step budget
    /// bounds tool-call cycles; exceeding it is [`CrewError::AgentExhausted`],
    /// surfaced to the caller rather than silently truncated.
    pub async fn run(&self, session: &Session, cancel: &CancelToken) -> Result<Vec<Message>> {
        let mut view: Vec<Message> = Vec::with_capacity(session.len() + 1);
        view.push(Message::system(self.build_system_prompt().await?));
        view.extend(session.messages().iter().cloned());

        let mut produced: Vec<Message> = Vec::new();
        let mut steps = 0usize;

        loop {
            steps += 1;
            if steps > self.config.max_steps {
                return Err(CrewError::AgentExhausted {
                    agent: self.definition.name.clone(),
                    steps: self.config.max_steps,
                });
            }

            let completion = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(CrewError::Cancelled),
                result = self.provider.complete(&view, &self.config.generation) => result?,
            };

            let content = completion.content.clone();
            let assistant = Message::assistant(&content)
                .from_agent(&self.definition.name)
                .with_model(&completion.model);
            view.push(assistant.clone());
            produced.push(assistant);

            let Some(call) = self.parse_tool_call(&content) else {
                // No tool call: this is the final answer
                return Ok(produced);
            };

            if let Some(allowed) = &self.definition.tools {
                if !allowed.iter().any(|n| n == &call.name) {
                    return Err(CrewError::ToolNotFound(call.name));
                }
            }

            tracing::debug!(agent = %self.definition.name, tool = %call.name, "executing tool");

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(CrewError::Cancelled),
                result = call_with_retry(self.bridge.as_ref(), &call, &self.config.retry) => result,
            };

            let output = result?;
            let tool_message = Message::tool(Self::format_tool_output(&output), output.id.clone())
                .from_agent(&self.definition.name);
            view.push(tool_message.clone());
            produced.push(tool_message);
        }
    }

    /// Parse a tool call from the model response
    fn parse_tool_call(&self, content: &str) -> Option<ToolCall> {
        // Look for ```tool ... ``` blocks
        let tool_start = "```tool";
        let tool_end = "```";

        if let Some(start_idx) = content.find(tool_start) {
            let after_marker = &content[start_idx + tool_start.len()..];
            if let Some(end_idx) = after_marker.find(tool_end) {
                let json_str = after_marker[..end_idx].trim();

                if let Ok(mut call) = serde_json::from_str::<ToolCall>(json_str) {
                    if call.id.is_none() {
                        call.id = Some(uuid::Uuid::new_v4().to_string());
                    }
                    return Some(call);
                }
            }
        }

        // Fallback: try to find raw JSON with "tool" key
        self.parse_inline_tool_call(content)
    }

    /// Try to parse an inline JSON tool call
    fn parse_inline_tool_call(&self, content: &str) -> Option<ToolCall> {
        if !content.contains(r#""tool""#) {
            return None;
        }

        let start = content.find('{')?;
        let end = content.rfind('}')?;

        if end <= start {
            return None;
        }

        let json_str = &content[start..=end];
        serde_json::from_str::<ToolCall>(json_str).ok()
    }

    /// Format a tool output for the conversation
    fn format_tool_output(output: &ToolOutput) -> String {
        if output.success {
            format!("[Tool '{}' returned]\n{}", output.name, output.output)
        } else {
            format!("[Tool '{}' failed]\n{}", output.name, output.output)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::ToolSchema;
    use crate::provider::{ScriptRule, ScriptedProvider};
    use async_trait::async_trait;

    /// Bridge whose tools always report failure (never a transport error)
    struct BrokenToolBridge;

    #[async_trait]
    impl ToolBridge for BrokenToolBridge {
        fn name(&self) -> &str {
            "broken"
        }

        async fn list_tools(&self) -> Result<Vec<ToolSchema>> {
            Ok(vec![ToolSchema {
                name: "search_engine".into(),
                description: "Web search".into(),
                input_schema: serde_json::json!({"type": "object"}),
            }])
        }

        async fn call(&self, call: &ToolCall) -> Result<ToolOutput> {
            Ok(ToolOutput::failure(&call.name, "upstream always broken"))
        }

        async fn health_check(&self) -> bool {
            false
        }
    }

    fn tool_calling_provider() -> Arc<ScriptedProvider> {
        // Always asks for the same tool, never produces a final answer
        Arc::new(ScriptedProvider::new(
            vec![],
            "```tool\n{\"tool\": \"search_engine\", \"arguments\": {\"query\": \"NSE movers\"}}\n```",
        ))
    }

    fn worker(provider: Arc<dyn LlmProvider>, bridge: Arc<dyn ToolBridge>, max_steps: usize) -> WorkerAgent {
        let definition = AgentDefinition::new("finder", "finds stocks", "You find stocks.");
        let config = WorkerConfig {
            max_steps,
            ..Default::default()
        };
        WorkerAgent::new(definition, provider, bridge, config)
    }

    #[tokio::test]
    async fn test_exhausts_step_budget_instead_of_looping() {
        let agent = worker(tool_calling_provider(), Arc::new(BrokenToolBridge), 4);
        let session = Session::new("find stocks");

        let err = agent.run(&session, &CancelToken::never()).await.unwrap_err();
        match err {
            CrewError::AgentExhausted { agent, steps } => {
                assert_eq!(agent, "finder");
                assert_eq!(steps, 4);
            }
            other => panic!("expected AgentExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_final_answer_without_tools() {
        let provider = Arc::new(ScriptedProvider::new(vec![], "RELIANCE and INFY look strong."));
        let agent = worker(provider, Arc::new(BrokenToolBridge), 5);
        let session = Session::new("find stocks");

        let messages = agent.run(&session, &CancelToken::never()).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].origin_agent.as_deref(), Some("finder"));
        assert!(messages[0].content.contains("RELIANCE"));
    }

    #[tokio::test]
    async fn test_tool_call_then_answer() {
        // First reply calls the tool; once the failed-tool context is in
        // view, reply with a final answer.
        let provider = Arc::new(ScriptedProvider::new(
            vec![ScriptRule::new(
                &["[Tool 'search_engine' failed]"],
                "No data available, stopping here.",
            )],
            "```tool\n{\"tool\": \"search_engine\", \"arguments\": {\"query\": \"NSE\"}}\n```",
        ));
        let agent = worker(provider, Arc::new(BrokenToolBridge), 5);
        let session = Session::new("find stocks");

        let messages = agent.run(&session, &CancelToken::never()).await.unwrap();
        // tool-call assistant msg, tool result msg, final assistant msg
        assert_eq!(messages.len(), 3);
        assert!(messages[1].content.contains("failed"));
        assert_eq!(messages[2].content, "No data available, stopping here.");
    }

    #[tokio::test]
    async fn test_tool_outside_subset_is_rejected() {
        let provider = tool_calling_provider();
        let definition = AgentDefinition::new("finder", "finds stocks", "You find stocks.")
            .with_tools(vec!["scrape_as_markdown".into()]);
        let agent = WorkerAgent::new(
            definition,
            provider,
            Arc::new(BrokenToolBridge),
            WorkerConfig::default(),
        );
        let session = Session::new("find stocks");

        let err = agent.run(&session, &CancelToken::never()).await.unwrap_err();
        assert!(matches!(err, CrewError::ToolNotFound(name) if name == "search_engine"));
    }

    #[tokio::test]
    async fn test_cancelled_before_completion() {
        let (source, token) = crate::cancel::cancel_pair();
        source.cancel();

        let agent = worker(tool_calling_provider(), Arc::new(BrokenToolBridge), 5);
        let session = Session::new("find stocks");

        let err = agent.run(&session, &token).await.unwrap_err();
        assert!(matches!(err, CrewError::Cancelled));
    }

    #[test]
    fn test_parse_inline_tool_call() {
        let provider: Arc<dyn LlmProvider> = Arc::new(ScriptedProvider::new(vec![], ""));
        let agent = worker(provider, Arc::new(BrokenToolBridge), 5);

        let call = agent
            .parse_tool_call(r#"I will search now: {"tool": "search_engine", "arguments": {"query": "x"}}"#)
            .unwrap();
        assert_eq!(call.name, "search_engine");
    }
}
