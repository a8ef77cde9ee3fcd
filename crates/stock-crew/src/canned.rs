//! Canned Tool Bridge
//!
//! Offline stand-in for the live scraping tool server (for development and
//! testing). Returns fixed payloads featuring two NSE tickers so the crew
//! can run end-to-end without network access or credentials.

use async_trait::async_trait;
use crew_core::{Result, ToolBridge, ToolCall, ToolOutput, ToolSchema};
use tokio::sync::Mutex;

const SEARCH_PAYLOAD: &str = "\
Top results for NSE movers:
1. Reliance Industries (RELIANCE) gains on strong refining margins and retail expansion.
2. Infosys (INFY) in focus after large-deal wins and upbeat guidance commentary.
3. Broader market flat; IT and energy outperform.";

const SCRAPE_PAYLOAD: &str = "\
# NSE snapshot

| Ticker   | Price (INR) | Prev close | Volume | 7d    | 30d   | RSI |
|----------|-------------|------------|--------|-------|-------|-----|
| RELIANCE | 2951.20     | 2907.45    | 5.1M   | +2.1% | +6.4% | 63  |
| INFY     | 1582.75     | 1594.10    | 6.8M   | -0.9% | +3.2% | 48  |";

/// Tool bridge returning canned scrape/search data
pub struct CannedBridge {
    calls: Mutex<Vec<String>>,
}

impl Default for CannedBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl CannedBridge {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Names of the tools called so far, in order
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl ToolBridge for CannedBridge {
    fn name(&self) -> &str {
        "canned"
    }

    async fn list_tools(&self) -> Result<Vec<ToolSchema>> {
        Ok(vec![
            ToolSchema {
                name: "search_engine".into(),
                description: "Search the web and return result snippets".into(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "search query"}
                    },
                    "required": ["query"]
                }),
            },
            ToolSchema {
                name: "scrape_as_markdown".into(),
                description: "Fetch a web page and return its content as markdown".into(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "url": {"type": "string", "description": "page URL"}
                    },
                    "required": ["url"]
                }),
            },
        ])
    }

    async fn call(&self, call: &ToolCall) -> Result<ToolOutput> {
        self.calls.lock().await.push(call.name.clone());
        tracing::debug!(tool = %call.name, "canned tool call");

        let output = match call.name.as_str() {
            "search_engine" => ToolOutput::success(&call.name, SEARCH_PAYLOAD),
            "scrape_as_markdown" => ToolOutput::success(&call.name, SCRAPE_PAYLOAD),
            other => ToolOutput::failure(other, format!("no canned data for tool '{other}'")),
        };

        Ok(match &call.id {
            Some(id) => output.with_id(id.clone()),
            None => output,
        })
    }

    async fn health_check(&self) -> bool {
        true
    }
}
