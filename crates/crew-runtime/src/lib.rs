//! # crew-runtime
//!
//! Runtime integrations for the trade-crew system.
//!
//! ## Providers
//!
//! - **Ollama** (default): Local LLM inference via Ollama
//! - **OpenAI**: Chat completions REST API
//!
//! ## Tool bridge
//!
//! - **MCP stdio**: spawns an external tool server process and speaks
//!   newline-delimited JSON-RPC over its stdio
//!
//! ## Usage
//!
//! ```rust,ignore
//! use crew_runtime::{OllamaProvider, ScraperConfig, StdioBridge};
//!
//! let provider = Arc::new(OllamaProvider::from_env());
//! let bridge = Arc::new(StdioBridge::spawn(&ScraperConfig::from_env()?).await?);
//! ```

pub mod config;
pub mod mcp;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "openai")]
pub mod openai;

pub use config::{RateLimit, RateLimiter, ScraperConfig};
pub use mcp::StdioBridge;

#[cfg(feature = "ollama")]
pub use ollama::OllamaProvider;

#[cfg(feature = "openai")]
pub use openai::OpenAiProvider;

// Re-export core types for convenience
pub use crew_core::{
    CrewError, LlmProvider, Message, Orchestrator, Result, Role, Session, ToolBridge,
};
