//! Tool Bridge
//!
//! Abstraction over an external tool provider. The provider exposes callable
//! tools over a request/response transport; the bridge hides the transport
//! and surfaces failures as typed errors so the worker loop can decide to
//! retry, report, or abandon.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CrewError, Result};

/// Tool call request from the LLM
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool identifier
    #[serde(alias = "tool")]
    pub name: String,

    /// Arguments as key-value pairs
    #[serde(default)]
    pub arguments: HashMap<String, serde_json::Value>,

    /// Optional call ID for tracking
    #[serde(default)]
    pub id: Option<String>,
}

/// Result from a tool invocation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Tool that was called
    pub name: String,

    /// Call ID (if provided in request)
    pub id: Option<String>,

    /// Whether execution succeeded
    pub success: bool,

    /// Output (success payload or error text)
    pub output: String,

    /// Structured data (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolOutput {
    pub fn success(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            success: true,
            output: output.into(),
            data: None,
        }
    }

    pub fn failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            success: false,
            output: error.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Descriptor of a tool offered by the provider
///
/// Supplied by the bridge at startup and read-only for agents. The input
/// schema is whatever JSON Schema the provider advertises.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to the LLM)
    #[serde(default)]
    pub description: String,

    /// JSON Schema for input parameters
    #[serde(default = "empty_schema")]
    pub input_schema: serde_json::Value,
}

fn empty_schema() -> serde_json::Value {
    serde_json::json!({"type": "object"})
}

/// Bridge to an external tool provider
///
/// Implement this per transport: MCP stdio server, canned test data, etc.
/// Implementations must be safe to share across sessions; any connection
/// pooling or rate limiting inside is the implementation's job.
#[async_trait]
pub trait ToolBridge: Send + Sync {
    /// Bridge/provider name
    fn name(&self) -> &str;

    /// List the tools the provider offers
    async fn list_tools(&self) -> Result<Vec<ToolSchema>>;

    /// Invoke a tool synchronously
    async fn call(&self, call: &ToolCall) -> Result<ToolOutput>;

    /// Check if the provider is reachable
    async fn health_check(&self) -> bool;
}

/// Bounded retry with exponential backoff for retryable tool faults
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,

    /// Delay before the first retry; doubles each attempt
    pub base_delay: Duration,

    /// Ceiling on a single backoff sleep
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before retry attempt `n` (0-based retry index)
    fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Invoke a tool through the bridge, retrying retryable faults.
///
/// Non-retryable errors (unknown tool, malformed response, hard failures)
/// propagate immediately; retryable ones (unreachable, timeout, rate limit)
/// are re-attempted up to the policy bound with exponential backoff.
pub async fn call_with_retry(
    bridge: &dyn ToolBridge,
    call: &ToolCall,
    policy: &RetryPolicy,
) -> Result<ToolOutput> {
    let mut attempt = 0u32;
    loop {
        match bridge.call(call).await {
            Ok(output) => return Ok(output),
            Err(e) if e.is_retryable() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    tool = %call.name,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying tool call"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Generate a system prompt section describing the given tools
pub fn prompt_section(tools: &[ToolSchema]) -> String {
    let mut prompt = String::from("## Available Tools\n\n");
    prompt.push_str("You can use the following tools by responding with a JSON block:\n\n");
    prompt.push_str("```tool\n{\"tool\": \"tool_name\", \"arguments\": {\"arg\": \"value\"}}\n```\n\n");

    for schema in tools {
        prompt.push_str(&format!("### {}\n", schema.name));
        if !schema.description.is_empty() {
            prompt.push_str(&format!("{}\n", schema.description));
        }

        let required: Vec<&str> = schema
            .input_schema
            .get("required")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();

        if let Some(props) = schema
            .input_schema
            .get("properties")
            .and_then(|v| v.as_object())
        {
            if !props.is_empty() {
                prompt.push_str("**Parameters:**\n");
                for (pname, pschema) in props {
                    let ptype = pschema.get("type").and_then(|v| v.as_str()).unwrap_or("any");
                    let pdesc = pschema
                        .get("description")
                        .and_then(|v| v.as_str())
                        .unwrap_or("");
                    let req = if required.contains(&pname.as_str()) {
                        " (required)"
                    } else {
                        ""
                    };
                    prompt.push_str(&format!("- `{}` ({}){}: {}\n", pname, ptype, req, pdesc));
                }
            }
        }
        prompt.push('\n');
    }

    prompt
}

/// Keep only the schemas named in `allowed`, preserving provider order.
/// `None` means the full tool set.
pub fn filter_tools(tools: Vec<ToolSchema>, allowed: Option<&[String]>) -> Vec<ToolSchema> {
    match allowed {
        None => tools,
        Some(names) => tools
            .into_iter()
            .filter(|t| names.iter().any(|n| n == &t.name))
            .collect(),
    }
}
