//! # tenax Core
//!
//! Domain types, traits, and error definitions for the tenax agent runtime.
//! This crate defines the domain model that all other crates implement
//! against.
//!
//! The runtime is small: one conversational agent with a web-search tool,
//! backed by a primary and a fallback model client. The traits here are the
//! seams that keep those pieces swappable and testable:
//! - [`Provider`]: anything that can turn a conversation into a response
//! - [`Tool`]: anything the agent can call during a turn

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use message::{Conversation, ConversationId, Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
