//! Built-in tool implementations for tenax.
//!
//! All tools implement the `tenax_core::Tool` trait. The agent ships a
//! single capability: web search.

pub mod web_search;

pub use web_search::WebSearchTool;

use tenax_core::tool::ToolRegistry;

/// Build the default tool registry for the agent.
pub fn default_registry(search_api_key: Option<String>, max_results: u32) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(WebSearchTool::new(search_api_key, max_results)));
    registry
}
