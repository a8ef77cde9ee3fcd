//! Error Types

use thiserror::Error;

/// Result type alias for crew operations
pub type Result<T> = std::result::Result<T, CrewError>;

/// Crew error types
#[derive(Error, Debug)]
pub enum CrewError {
    /// Missing or malformed configuration (fatal, pre-flight)
    #[error("Configuration error: {0}")]
    Config(String),

    /// LLM provider error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Tool not offered by the bridge (or outside the agent's subset)
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool provider process/transport unreachable
    #[error("Tool provider unreachable: {0}")]
    ToolUnreachable(String),

    /// Tool call exceeded its deadline
    #[error("Tool '{tool}' timed out after {elapsed_ms}ms")]
    ToolTimeout { tool: String, elapsed_ms: u64 },

    /// Tool provider returned a response the bridge could not decode
    #[error("Malformed tool response: {0}")]
    ToolMalformed(String),

    /// Tool ran but reported failure
    #[error("Tool execution failed: {0}")]
    ToolFailed(String),

    /// Rate limited by provider or local limiter
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Worker hit its step budget without producing a final answer
    #[error("Agent '{agent}' exhausted its step budget ({steps} steps)")]
    AgentExhausted { agent: String, steps: usize },

    /// Supervisor repeated a decision without session progress
    #[error("Routing stalled: {0}")]
    RoutingStall(String),

    /// Parse error (tool call or routing decision parsing)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Run was cancelled
    #[error("Run cancelled")]
    Cancelled,

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl CrewError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CrewError::ProviderUnavailable(_)
                | CrewError::ToolUnreachable(_)
                | CrewError::ToolTimeout { .. }
                | CrewError::RateLimited(_)
                | CrewError::Io(_)
        )
    }

    /// Short failure-kind label, printed by the CLI on exit
    pub fn kind(&self) -> &'static str {
        match self {
            CrewError::Config(_) => "config error",
            CrewError::Provider(_) | CrewError::ProviderUnavailable(_) | CrewError::Auth(_) => {
                "provider error"
            }
            CrewError::ToolNotFound(_)
            | CrewError::ToolUnreachable(_)
            | CrewError::ToolTimeout { .. }
            | CrewError::ToolMalformed(_)
            | CrewError::ToolFailed(_)
            | CrewError::RateLimited(_) => "tool error",
            CrewError::AgentExhausted { .. } => "agent exhausted",
            CrewError::RoutingStall(_) => "routing stall",
            CrewError::Parse(_) => "parse error",
            CrewError::Cancelled => "cancelled",
            CrewError::Io(_) | CrewError::Json(_) => "io error",
            CrewError::Other(_) => "error",
        }
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            CrewError::Config(msg) => format!("Configuration problem: {}", msg),
            CrewError::Provider(msg) => format!("The model service encountered an error: {}", msg),
            CrewError::ProviderUnavailable(_) => {
                "The model service is currently unavailable. Please try again.".into()
            }
            CrewError::Auth(_) => "Authentication failed. Please check your credentials.".into(),
            CrewError::ToolNotFound(name) => format!("The tool '{}' is not available.", name),
            CrewError::ToolUnreachable(_) => "The tool provider could not be reached.".into(),
            CrewError::ToolTimeout { tool, .. } => format!("The tool '{}' took too long.", tool),
            CrewError::ToolMalformed(msg) => format!("Bad tool response: {}", msg),
            CrewError::ToolFailed(msg) => format!("Tool error: {}", msg),
            CrewError::RateLimited(_) => {
                "Too many requests. Please wait a moment and retry.".into()
            }
            CrewError::AgentExhausted { agent, .. } => {
                format!("Agent '{}' could not finish within its budget.", agent)
            }
            CrewError::RoutingStall(msg) => format!("The run stopped making progress: {}", msg),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for CrewError {
    fn from(err: anyhow::Error) -> Self {
        CrewError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(CrewError::RateLimited("429".into()).is_retryable());
        assert!(CrewError::ToolUnreachable("gone".into()).is_retryable());
        assert!(!CrewError::Config("missing token".into()).is_retryable());
        assert!(!CrewError::AgentExhausted { agent: "finder".into(), steps: 10 }.is_retryable());
    }

    #[test]
    fn test_user_message_carries_the_reason() {
        let err = CrewError::RoutingStall("round budget (12) exhausted".into());
        assert!(err.user_message().contains("round budget"));

        let err = CrewError::AgentExhausted { agent: "finder".into(), steps: 10 };
        assert!(err.user_message().contains("finder"));
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(CrewError::Config("x".into()).kind(), "config error");
        assert_eq!(
            CrewError::ToolTimeout { tool: "scrape".into(), elapsed_ms: 30_000 }.kind(),
            "tool error"
        );
        assert_eq!(CrewError::RoutingStall("loop".into()).kind(), "routing stall");
    }
}
