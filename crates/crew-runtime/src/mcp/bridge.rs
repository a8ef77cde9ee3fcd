//! MCP Stdio Bridge
//!
//! Spawns the tool server as a child process and implements
//! [`ToolBridge`] over newline-delimited JSON-RPC on its stdio. A
//! background task reads stdout and correlates responses by request id;
//! every `tools/call` first takes a slot from the shared rate limiter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crew_core::{CrewError, Result, ToolBridge, ToolCall, ToolOutput, ToolSchema};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};

use crate::config::{RateLimiter, ScraperConfig};
use crate::mcp::protocol::{
    RemoteToolList, RpcError, RpcNotification, RpcRequest, RpcResponse, ToolCallResult,
};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<RpcResponse>>>>;

/// Bridge to an MCP tool server over child-process stdio
pub struct StdioBridge {
    name: String,
    stdin: Mutex<ChildStdin>,
    pending: PendingMap,
    child: Mutex<Child>,
    next_id: AtomicU64,
    limiter: Option<RateLimiter>,
    request_timeout: Duration,
    closed: AtomicBool,
}

impl StdioBridge {
    /// Spawn the configured server process and perform the MCP handshake
    pub async fn spawn(config: &ScraperConfig) -> Result<Self> {
        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .envs(config.env_map())
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            CrewError::ToolUnreachable(format!(
                "failed to spawn tool server `{}`: {}",
                config.command, e
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CrewError::ToolUnreachable("tool server stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CrewError::ToolUnreachable("tool server stdout not captured".into()))?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let reader_pending = Arc::clone(&pending);

        // Background reader: newline-delimited JSON from stdout, correlated
        // to waiters by response id. Unparseable lines are logged and
        // skipped (servers are free to print diagnostics).
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<RpcResponse>(&line) {
                    Ok(response) => {
                        if let Some(id) = response.id {
                            let mut guard = reader_pending.lock().await;
                            if let Some(sender) = guard.remove(&id) {
                                let _ = sender.send(response);
                            }
                        }
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "skipping non-response line from tool server");
                    }
                }
            }
            tracing::warn!("tool server stdout closed");
        });

        let bridge = Self {
            name: "mcp-scraper".into(),
            stdin: Mutex::new(stdin),
            pending,
            child: Mutex::new(child),
            next_id: AtomicU64::new(1),
            limiter: config.rate_limit.map(RateLimiter::new),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            closed: AtomicBool::new(false),
        };

        // Handshake: initialize, then signal readiness
        bridge
            .request("initialize", |id| {
                RpcRequest::initialize(id, env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
            })
            .await?;
        bridge.notify(RpcNotification::initialized()).await?;

        tracing::info!(command = %config.command, "tool server started");
        Ok(bridge)
    }

    /// Override the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    async fn write_line(&self, payload: String) -> Result<()> {
        let mut line = payload;
        line.push('\n');
        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| CrewError::ToolUnreachable(format!("write to tool server failed: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| CrewError::ToolUnreachable(format!("flush to tool server failed: {e}")))?;
        Ok(())
    }

    async fn notify(&self, notification: RpcNotification) -> Result<()> {
        self.write_line(serde_json::to_string(&notification)?).await
    }

    /// Send one request and wait for its correlated response
    async fn request(
        &self,
        label: &str,
        build: impl FnOnce(u64) -> RpcRequest,
    ) -> Result<serde_json::Value> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(CrewError::ToolUnreachable("bridge closed".into()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = build(id);

        let (tx, rx) = oneshot::channel();
        {
            let mut guard = self.pending.lock().await;
            guard.insert(id, tx);
        }

        if let Err(e) = self.write_line(serde_json::to_string(&request)?).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        let response = match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                return Err(CrewError::ToolUnreachable(
                    "tool server reply channel closed".into(),
                ));
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(CrewError::ToolTimeout {
                    tool: label.to_string(),
                    elapsed_ms: self.request_timeout.as_millis() as u64,
                });
            }
        };

        if let Some(error) = response.error {
            return Err(map_rpc_error(&error));
        }

        response
            .result
            .ok_or_else(|| CrewError::ToolMalformed(format!("'{label}' reply has no result")))
    }

    /// Stop the server process and reject further requests
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        let mut child = self.child.lock().await;
        if let Err(e) = child.kill().await {
            tracing::debug!(error = %e, "tool server already gone");
        }
    }
}

fn map_rpc_error(error: &RpcError) -> CrewError {
    let lowered = error.message.to_lowercase();
    if lowered.contains("rate limit") || lowered.contains("too many requests") {
        CrewError::RateLimited(error.message.clone())
    } else {
        CrewError::ToolFailed(format!("{} (code {})", error.message, error.code))
    }
}

#[async_trait]
impl ToolBridge for StdioBridge {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<ToolSchema>> {
        let result = self.request("tools/list", RpcRequest::list_tools).await?;
        let list: RemoteToolList = serde_json::from_value(result)
            .map_err(|e| CrewError::ToolMalformed(format!("bad tools/list reply: {e}")))?;
        Ok(list.tools.into_iter().map(Into::into).collect())
    }

    async fn call(&self, call: &ToolCall) -> Result<ToolOutput> {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }

        let arguments = serde_json::to_value(&call.arguments)?;
        let result = self
            .request(&call.name, |id| {
                RpcRequest::call_tool(id, &call.name, arguments)
            })
            .await?;

        let parsed: ToolCallResult = serde_json::from_value(result)
            .map_err(|e| CrewError::ToolMalformed(format!("bad tools/call reply: {e}")))?;

        let output = if parsed.is_error {
            // Tool-level failure: hand the text back to the agent as context
            ToolOutput::failure(&call.name, parsed.text())
        } else {
            ToolOutput::success(&call.name, parsed.text())
        };

        Ok(match &call.id {
            Some(id) => output.with_id(id.clone()),
            None => output,
        })
    }

    async fn health_check(&self) -> bool {
        if self.closed.load(Ordering::Relaxed) {
            return false;
        }
        let mut child = self.child.lock().await;
        matches!(child.try_wait(), Ok(None))
    }
}
