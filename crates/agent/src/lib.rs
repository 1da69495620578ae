//! The tenax agent: a single chatbot⇄tools loop over the resilient
//! invocation layer, plus the platform invocation handler.

pub mod handler;
pub mod loop_runner;

pub use handler::{DEFAULT_PROMPT, InvocationRequest, InvocationResponse, handle_invocation};
pub use loop_runner::AgentLoop;
