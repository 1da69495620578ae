//! Platform invocation handler.
//!
//! The hosting platform delivers a payload with an optional `prompt` and
//! expects `{ "result": ... }` back, with failures rendered as text rather
//! than surfaced as transport errors.

use crate::loop_runner::AgentLoop;
use serde::{Deserialize, Serialize};
use tenax_core::message::{Conversation, Message};
use tracing::{error, info, warn};

/// Substituted when the payload carries no usable prompt.
pub const DEFAULT_PROMPT: &str = "No prompt found in input";

/// The inbound invocation payload.
#[derive(Debug, Clone, Deserialize)]
pub struct InvocationRequest {
    #[serde(default)]
    pub prompt: Option<String>,
}

/// The outbound invocation result.
#[derive(Debug, Clone, Serialize)]
pub struct InvocationResponse {
    pub result: String,
}

/// Run one invocation: prompt in, final message text out.
///
/// Any error from the turn loop becomes an error-text result; the caller
/// always gets a well-formed response.
pub async fn handle_invocation(
    agent: &AgentLoop,
    request: InvocationRequest,
) -> InvocationResponse {
    let prompt = match request.prompt {
        Some(p) if !p.trim().is_empty() => p,
        _ => {
            warn!("No prompt found in payload, using default message");
            DEFAULT_PROMPT.to_string()
        }
    };

    info!(prompt_len = prompt.len(), "Agent invocation started");

    let mut conversation = Conversation::new();
    conversation.push(Message::user(&prompt));

    match agent.process(&mut conversation).await {
        Ok(result) => {
            info!("Agent invocation completed successfully");
            InvocationResponse { result }
        }
        Err(e) => {
            error!(error = %e, "Agent invocation failed");
            InvocationResponse {
                result: format!("Error processing request: {e}"),
            }
        }
    }
}
