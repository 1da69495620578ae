//! The agent reasoning loop implementation.
//!
//! One turn: send the conversation to the resilient invoker, append the
//! assistant's reply, execute any requested tool calls, and loop until a
//! reply carries no tool calls. The loop knows nothing about retry or
//! fallback; that lives entirely inside the invoker.

use std::sync::Arc;
use tenax_core::message::{Conversation, Message, Role};
use tenax_core::provider::ProviderRequest;
use tenax_core::tool::{ToolCall, ToolRegistry};
use tenax_providers::ResilientProvider;
use tracing::{debug, info, warn};

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Use the web_search tool when a question needs current information.";

/// The core agent loop that orchestrates LLM calls and tool execution.
pub struct AgentLoop {
    /// The resilient model invoker
    invoker: Arc<ResilientProvider>,

    /// The model to request
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Default max tokens per response
    max_tokens: Option<u32>,

    /// Tool registry
    tools: Arc<ToolRegistry>,

    /// System prompt prepended to every conversation
    system_prompt: String,

    /// Maximum tool call iterations per turn
    max_iterations: u32,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(
        invoker: Arc<ResilientProvider>,
        model: impl Into<String>,
        temperature: f32,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            invoker,
            model: model.into(),
            temperature,
            max_tokens: None,
            tools,
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_iterations: 25,
        }
    }

    /// Set the maximum number of tool call iterations.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Set the default max tokens per LLM response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Override the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Process a conversation and generate a response.
    ///
    /// This is the main entry point for the agent loop. It:
    /// 1. Ensures the system prompt leads the conversation
    /// 2. Calls the resilient invoker
    /// 3. If tool calls are returned, executes them and loops
    /// 4. Returns the final text response
    pub async fn process(
        &self,
        conversation: &mut Conversation,
    ) -> Result<String, tenax_core::Error> {
        info!(
            conversation_id = %conversation.id,
            messages = conversation.messages.len(),
            "Processing conversation"
        );

        if conversation.messages.is_empty() || conversation.messages[0].role != Role::System {
            conversation
                .messages
                .insert(0, Message::system(&self.system_prompt));
        }

        let tool_definitions = self.tools.definitions();
        let mut iteration = 0;

        loop {
            iteration += 1;

            if iteration > self.max_iterations {
                warn!(
                    conversation_id = %conversation.id,
                    iterations = iteration,
                    "Max tool iterations reached, forcing text response"
                );
                break;
            }

            debug!(
                conversation_id = %conversation.id,
                iteration = iteration,
                "Agent loop iteration"
            );

            let request = ProviderRequest {
                model: self.model.clone(),
                messages: conversation.messages.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: tool_definitions.clone(),
                stop: vec![],
            };

            let invocation = self.invoker.invoke(request).await?;
            if invocation.used_fallback {
                info!(
                    conversation_id = %conversation.id,
                    "Response generated using fallback model"
                );
            }
            let response = invocation.response;

            if !response.message.has_tool_calls() {
                // No tool calls, so this is the final text response
                let response_text = response.message.content.clone();
                conversation.push(response.message);
                return Ok(response_text);
            }

            debug!(
                tool_count = response.message.tool_calls.len(),
                "Executing tool calls"
            );

            let tool_calls = response.message.tool_calls.clone();
            conversation.push(response.message);

            for tc in &tool_calls {
                let call = ToolCall {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    arguments: serde_json::from_str(&tc.arguments).unwrap_or_default(),
                };

                match self.tools.execute(&call).await {
                    Ok(tool_result) => {
                        conversation.push(Message::tool_result(&tc.id, &tool_result.output));
                    }
                    Err(e) => {
                        warn!(tool = %tc.name, error = %e, "Tool execution failed");
                        // Report the error to the LLM so it can recover
                        conversation.push(Message::tool_result(&tc.id, format!("Error: {e}")));
                    }
                }
            }

            // Loop back so the LLM sees the tool results and decides what to do next
        }

        Ok(
            "I've reached the maximum number of tool call iterations. Please provide further guidance."
                .into(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tenax_core::error::{ProviderError, ToolError};
    use tenax_core::message::MessageToolCall;
    use tenax_core::provider::{Provider, ProviderResponse};
    use tenax_core::tool::{Tool, ToolResult};
    use tenax_providers::RetryPolicy;

    /// A mock provider that replays a scripted sequence of responses.
    struct ScriptedProvider {
        script: Mutex<Vec<Message>>,
    }

    impl ScriptedProvider {
        fn new(mut responses: Vec<Message>) -> Self {
            responses.reverse();
            Self {
                script: Mutex::new(responses),
            }
        }
    }

    #[async_trait::async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            let message = self.script.lock().unwrap().pop().unwrap_or_else(|| {
                Message::assistant("script exhausted")
            });
            Ok(ProviderResponse {
                message,
                usage: None,
                model: "mock-model".into(),
            })
        }
    }

    /// A mock provider that always fails with a non-retryable error.
    struct BrokenProvider;

    #[async_trait::async_trait]
    impl Provider for BrokenProvider {
        fn name(&self) -> &str {
            "broken"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::Network("connection refused".into()))
        }
    }

    struct SearchStub;

    #[async_trait::async_trait]
    impl Tool for SearchStub {
        fn name(&self) -> &str {
            "web_search"
        }
        fn description(&self) -> &str {
            "stub search"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            let query = arguments["query"].as_str().unwrap_or("");
            Ok(ToolResult {
                call_id: String::new(),
                success: true,
                output: format!("results for {query}"),
            })
        }
    }

    fn tool_call_message(name: &str, args: &str) -> Message {
        let mut msg = Message::assistant("");
        msg.tool_calls = vec![MessageToolCall {
            id: "call_1".into(),
            name: name.into(),
            arguments: args.into(),
        }];
        msg
    }

    fn invoker_over(provider: Arc<dyn Provider>) -> Arc<ResilientProvider> {
        let fallback = provider.clone();
        Arc::new(ResilientProvider::new(
            provider,
            move || fallback.clone(),
            RetryPolicy::default(),
        ))
    }

    #[tokio::test]
    async fn simple_text_response() {
        let provider = Arc::new(ScriptedProvider::new(vec![Message::assistant(
            "Hello! How can I help?",
        )]));
        let agent = AgentLoop::new(
            invoker_over(provider),
            "mock-model",
            0.7,
            Arc::new(ToolRegistry::new()),
        );

        let mut conv = Conversation::new();
        conv.push(Message::user("Hello!"));

        let response = agent.process(&mut conv).await.unwrap();
        assert_eq!(response, "Hello! How can I help?");
        // System + User + Assistant = 3 messages
        assert_eq!(conv.messages.len(), 3);
        assert_eq!(conv.messages[0].role, Role::System);
    }

    #[tokio::test]
    async fn tool_call_roundtrip() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_message("web_search", r#"{"query":"rust releases"}"#),
            Message::assistant("Rust 1.88 is out."),
        ]));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(SearchStub));

        let agent = AgentLoop::new(
            invoker_over(provider),
            "mock-model",
            0.7,
            Arc::new(registry),
        );

        let mut conv = Conversation::new();
        conv.push(Message::user("What's new in Rust?"));

        let response = agent.process(&mut conv).await.unwrap();
        assert_eq!(response, "Rust 1.88 is out.");

        // System, user, assistant(tool call), tool result, assistant
        assert_eq!(conv.messages.len(), 5);
        assert_eq!(conv.messages[2].role, Role::Assistant);
        assert!(conv.messages[2].has_tool_calls());
        assert_eq!(conv.messages[3].role, Role::Tool);
        assert_eq!(conv.messages[3].content, "results for rust releases");
        assert_eq!(conv.messages[3].tool_call_id.as_deref(), Some("call_1"));
    }

    #[tokio::test]
    async fn tool_error_is_reported_to_the_model() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_message("nonexistent", "{}"),
            Message::assistant("That tool is unavailable."),
        ]));
        let agent = AgentLoop::new(
            invoker_over(provider),
            "mock-model",
            0.7,
            Arc::new(ToolRegistry::new()),
        );

        let mut conv = Conversation::new();
        conv.push(Message::user("Do the thing"));

        let response = agent.process(&mut conv).await.unwrap();
        assert_eq!(response, "That tool is unavailable.");
        assert!(conv.messages[3].content.starts_with("Error:"));
    }

    #[tokio::test]
    async fn max_iterations_bounds_the_loop() {
        // Always asks for another tool call
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_message("web_search", r#"{"query":"a"}"#),
            tool_call_message("web_search", r#"{"query":"b"}"#),
            tool_call_message("web_search", r#"{"query":"c"}"#),
        ]));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(SearchStub));

        let agent = AgentLoop::new(
            invoker_over(provider),
            "mock-model",
            0.7,
            Arc::new(registry),
        )
        .with_max_iterations(2);

        let mut conv = Conversation::new();
        conv.push(Message::user("loop forever"));

        let response = agent.process(&mut conv).await.unwrap();
        assert!(response.contains("maximum number of tool call iterations"));
    }

    #[tokio::test]
    async fn fallback_response_still_completes_the_turn() {
        let primary = Arc::new(BrokenProvider);
        let fallback = Arc::new(ScriptedProvider::new(vec![Message::assistant(
            "answered by fallback",
        )]));
        let invoker = Arc::new(ResilientProvider::new(
            primary,
            move || fallback.clone() as Arc<dyn Provider>,
            RetryPolicy::default(),
        ));
        let agent = AgentLoop::new(invoker, "mock-model", 0.7, Arc::new(ToolRegistry::new()));

        let mut conv = Conversation::new();
        conv.push(Message::user("Hello"));

        let response = agent.process(&mut conv).await.unwrap();
        assert_eq!(response, "answered by fallback");
    }

    #[tokio::test]
    async fn both_models_failing_propagates() {
        let invoker = invoker_over(Arc::new(BrokenProvider));
        let agent = AgentLoop::new(invoker, "mock-model", 0.7, Arc::new(ToolRegistry::new()));

        let mut conv = Conversation::new();
        conv.push(Message::user("Hello"));

        let err = agent.process(&mut conv).await.unwrap_err();
        assert!(err.to_string().contains("Both primary and fallback"));
    }
}
