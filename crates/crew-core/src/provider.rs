//! LLM Provider Strategy Pattern
//!
//! Defines a common interface for all model backends (Ollama, OpenAI, etc.)
//! so that workers and the supervisor can run against any of them without
//! code changes. A request carries the full ordered message history; the
//! response is a single completion.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::Message;

/// Configuration for LLM generation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model identifier (e.g., "llama3.2", "gpt-4.1")
    pub model: String,

    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Top-p nucleus sampling
    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_top_p() -> f32 {
    0.9
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "llama3.2".into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
        }
    }
}

impl GenerationOptions {
    /// Options for routing decisions: same model, deterministic sampling
    pub fn deterministic(mut self) -> Self {
        self.temperature = 0.0;
        self
    }
}

/// Response from an LLM completion
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Completion {
    /// The generated text
    pub content: String,

    /// Model that generated this response
    pub model: String,

    /// Token usage statistics (if available)
    pub usage: Option<TokenUsage>,

    /// Finish reason
    pub finish_reason: Option<FinishReason>,
}

/// Token usage statistics
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Reason for completion finishing
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Error,
}

/// Strategy trait for LLM providers
///
/// Implement this trait to add support for new model backends. Workers and
/// the supervisor work exclusively through this interface.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., "Ollama", "OpenAI")
    fn name(&self) -> &str;

    /// Check if the provider is available and configured correctly
    async fn health_check(&self) -> Result<bool>;

    /// Generate a completion from messages
    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion>;
}

/// One reply rule of a [`ScriptedProvider`]
#[derive(Clone, Debug)]
pub struct ScriptRule {
    /// Substrings that must all appear somewhere in the rendered view
    pub needles: Vec<String>,

    /// Canned reply when every needle matches
    pub reply: String,
}

impl ScriptRule {
    pub fn new(needles: &[&str], reply: impl Into<String>) -> Self {
        Self {
            needles: needles.iter().map(|n| (*n).to_string()).collect(),
            reply: reply.into(),
        }
    }
}

/// Deterministic scripted provider (for development/testing)
///
/// Replies are a pure function of the message view: the first rule whose
/// needles all appear in the concatenated conversation wins. Calling it
/// twice on the same view yields the same completion, which is what the
/// routing-idempotence property needs.
pub struct ScriptedProvider {
    rules: Vec<ScriptRule>,
    fallback: String,
}

impl ScriptedProvider {
    pub fn new(rules: Vec<ScriptRule>, fallback: impl Into<String>) -> Self {
        Self {
            rules,
            fallback: fallback.into(),
        }
    }

    fn render(messages: &[Message]) -> String {
        let mut view = String::new();
        for m in messages {
            view.push_str(&m.content);
            view.push('\n');
        }
        view
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        let view = Self::render(messages);
        let content = self
            .rules
            .iter()
            .find(|rule| rule.needles.iter().all(|n| view.contains(n.as_str())))
            .map(|rule| rule.reply.clone())
            .unwrap_or_else(|| self.fallback.clone());

        Ok(Completion {
            content,
            model: options.model.clone(),
            usage: None,
            finish_reason: Some(FinishReason::Stop),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_options_defaults() {
        let opts = GenerationOptions::default();
        assert_eq!(opts.temperature, 0.7);
        assert_eq!(opts.max_tokens, 2048);
        assert_eq!(opts.model, "llama3.2");
    }

    #[test]
    fn test_deterministic_options_zero_temperature() {
        let opts = GenerationOptions::default().deterministic();
        assert_eq!(opts.temperature, 0.0);
    }

    #[tokio::test]
    async fn test_scripted_provider_first_match_wins() {
        let provider = ScriptedProvider::new(
            vec![
                ScriptRule::new(&["alpha", "beta"], "both"),
                ScriptRule::new(&["alpha"], "just alpha"),
            ],
            "fallback",
        );
        let opts = GenerationOptions::default();

        let msgs = vec![Message::user("alpha and beta here")];
        let reply = provider.complete(&msgs, &opts).await.unwrap();
        assert_eq!(reply.content, "both");

        let msgs = vec![Message::user("only alpha")];
        let reply = provider.complete(&msgs, &opts).await.unwrap();
        assert_eq!(reply.content, "just alpha");

        let msgs = vec![Message::user("nothing relevant")];
        let reply = provider.complete(&msgs, &opts).await.unwrap();
        assert_eq!(reply.content, "fallback");
    }
}
