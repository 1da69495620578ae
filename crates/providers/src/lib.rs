//! Model client implementations for tenax.
//!
//! All clients implement the `tenax_core::Provider` trait. The
//! `ResilientProvider` wraps a primary and a fallback client with
//! classified-error retry and failover; the agent loop only ever talks
//! to the wrapper.

pub mod bedrock;
pub mod classify;
pub mod resilient;

pub use bedrock::BedrockProvider;
pub use resilient::{Invocation, ResilientProvider, RetryPolicy};
