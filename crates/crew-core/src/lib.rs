//! # crew-core
//!
//! Supervisor/worker orchestration core with provider-agnostic LLM
//! abstraction and an external tool bridge.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Orchestrator                            │
//! │  ┌────────────┐   routes    ┌──────────────┐                 │
//! │  │ Supervisor │────────────▶│ WorkerAgent  │ (one at a time) │
//! │  └────────────┘             └──────┬───────┘                 │
//! │        │        ┌─────────────┐    │     ┌─────────────┐     │
//! │        └───────▶│   Session   │◀───┴────▶│ ToolBridge  │     │
//! │   append-only   └─────────────┘          └─────────────┘     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait enables swapping between Ollama, OpenAI, or any
//! other backend; the `ToolBridge` trait hides the external tool provider's
//! transport. The orchestrator owns the session and invokes exactly one
//! worker per routing round.

pub mod bridge;
pub mod cancel;
pub mod error;
pub mod message;
pub mod orchestrator;
pub mod provider;
pub mod session;
pub mod supervisor;
pub mod worker;

pub use bridge::{RetryPolicy, ToolBridge, ToolCall, ToolOutput, ToolSchema};
pub use cancel::{cancel_pair, CancelSource, CancelToken};
pub use error::{CrewError, Result};
pub use message::{Message, Role};
pub use orchestrator::{Orchestrator, OrchestratorConfig, RunEvent, RunOutcome};
pub use provider::{Completion, GenerationOptions, LlmProvider};
pub use session::{Session, SessionId};
pub use supervisor::{RoutingDecision, Supervisor, SupervisorConfig};
pub use worker::{AgentDefinition, WorkerAgent, WorkerConfig};
