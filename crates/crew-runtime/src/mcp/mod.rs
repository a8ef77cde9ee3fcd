//! Model Context Protocol (MCP) integration
//!
//! Connects the crew to an external tool server over a process-spawned,
//! message-framed request/response protocol. The transport details stay in
//! here; agents only ever see the [`crew_core::ToolBridge`] trait.

mod bridge;
mod protocol;

pub use bridge::StdioBridge;
pub use protocol::{RemoteTool, RpcError, RpcRequest, RpcResponse, ToolCallResult};
