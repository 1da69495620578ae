//! Web search tool backed by the Tavily search API.
//!
//! The API key is resolved at startup (environment or config); without one
//! the tool stays registered but reports a clear execution error, so the
//! model can tell the user search is unavailable instead of the agent
//! refusing to boot.

use async_trait::async_trait;
use serde::Deserialize;
use tenax_core::error::ToolError;
use tenax_core::tool::{Tool, ToolResult};
use tracing::debug;

const DEFAULT_API_URL: &str = "https://api.tavily.com/search";

pub struct WebSearchTool {
    api_url: String,
    api_key: Option<String>,
    max_results: u32,
    client: reqwest::Client,
}

impl WebSearchTool {
    pub fn new(api_key: Option<String>, max_results: u32) -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            api_key,
            max_results,
            client: reqwest::Client::new(),
        }
    }

    /// Use a custom API URL (for testing or proxies).
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<SearchResult>, ToolError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ToolError::ExecutionFailed {
                tool_name: "web_search".into(),
                reason: "No search API key configured".into(),
            }
        })?;

        let body = serde_json::json!({
            "api_key": api_key,
            "query": query,
            "max_results": max_results,
        });

        debug!(query, max_results, "Sending web search request");

        let response = self
            .client
            .post(&self.api_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "web_search".into(),
                reason: format!("Request failed: {e}"),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::ExecutionFailed {
                tool_name: "web_search".into(),
                reason: format!("Search API returned status {status}: {body}"),
            });
        }

        let parsed: TavilyResponse =
            response
                .json()
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    tool_name: "web_search".into(),
                    reason: format!("Failed to parse search response: {e}"),
                })?;

        Ok(parsed
            .results
            .into_iter()
            .map(|r| SearchResult {
                title: r.title,
                url: r.url,
                snippet: r.content,
            })
            .collect())
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for information. Returns a list of relevant results with titles, URLs, and snippets."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Number of results to return",
                    "default": self.max_results
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        let max_results = arguments["max_results"]
            .as_u64()
            .map(|n| n as u32)
            .unwrap_or(self.max_results)
            .clamp(1, 10);

        let results = self.search(query, max_results).await?;
        let output = serde_json::to_string_pretty(&results)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output,
        })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
struct SearchResult {
    title: String,
    url: String,
    snippet: String,
}

// --- Tavily API types ---

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}
