//! Bedrock runtime provider implementation.
//!
//! Uses the Bedrock Converse API over HTTPS with API-key (bearer)
//! authentication.
//!
//! Features:
//! - System prompt as top-level `system` field
//! - Native tool use with `toolUse` / `toolResult` content blocks
//! - Service error codes surfaced from the `x-amzn-errortype` header as
//!   `ProviderError::Service` so the retry/fallback layer can classify them

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tenax_core::error::ProviderError;
use tenax_core::message::{Message, MessageToolCall, Role};
use tenax_core::provider::*;
use tracing::{debug, warn};

const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Bedrock Converse API provider.
pub struct BedrockProvider {
    name: String,
    base_url: String,
    api_key: String,
    /// When set, overrides the model requested by the caller. Lets a
    /// primary and a fallback client share one request-building loop
    /// while talking to different models.
    model: Option<String>,
    client: reqwest::Client,
}

impl BedrockProvider {
    /// Create a new Bedrock provider for the given region.
    pub fn new(region: impl AsRef<str>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .unwrap_or_default();

        Self {
            name: "bedrock".into(),
            base_url: format!("https://bedrock-runtime.{}.amazonaws.com", region.as_ref()),
            api_key: api_key.into(),
            model: None,
            client,
        }
    }

    /// Pin this client to a specific model, ignoring the requested one.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Extract system messages from the message list.
    /// Converse puts the system prompt as a top-level field, not in messages.
    fn extract_system(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut non_system: Vec<&Message> = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => system_parts.push(&msg.content),
                _ => non_system.push(msg),
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        (system, non_system)
    }

    /// Convert messages to Converse API format with content blocks.
    fn to_api_messages(messages: &[&Message]) -> Vec<ConverseMessage> {
        let mut result = Vec::new();

        for msg in messages {
            match msg.role {
                Role::User => {
                    result.push(ConverseMessage {
                        role: "user".into(),
                        content: vec![ContentBlock::Text(msg.content.clone())],
                    });
                }
                Role::Assistant => {
                    let mut blocks: Vec<ContentBlock> = Vec::new();
                    if !msg.content.is_empty() {
                        blocks.push(ContentBlock::Text(msg.content.clone()));
                    }
                    for tc in &msg.tool_calls {
                        let input: serde_json::Value =
                            serde_json::from_str(&tc.arguments).unwrap_or_default();
                        blocks.push(ContentBlock::ToolUse(ToolUseBlock {
                            tool_use_id: tc.id.clone(),
                            name: tc.name.clone(),
                            input,
                        }));
                    }
                    result.push(ConverseMessage {
                        role: "assistant".into(),
                        content: blocks,
                    });
                }
                Role::Tool => {
                    // Tool results go back as user-role toolResult blocks
                    let tool_use_id = msg.tool_call_id.clone().unwrap_or_default();
                    result.push(ConverseMessage {
                        role: "user".into(),
                        content: vec![ContentBlock::ToolResult(ToolResultBlock {
                            tool_use_id,
                            content: vec![ContentBlock::Text(msg.content.clone())],
                        })],
                    });
                }
                Role::System => {} // handled separately
            }
        }

        result
    }

    /// Convert tool definitions to Converse `toolSpec` format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<serde_json::Value> {
        tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "toolSpec": {
                        "name": t.name,
                        "description": t.description,
                        "inputSchema": { "json": t.parameters }
                    }
                })
            })
            .collect()
    }

    /// Convert a Converse API response to our ProviderResponse.
    fn response_to_provider_response(
        resp: ConverseResponse,
        model: String,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let mut text_content = String::new();
        let mut tool_calls = Vec::new();

        for block in resp.output.message.content {
            match block {
                ContentBlock::Text(text) => {
                    if !text_content.is_empty() {
                        text_content.push('\n');
                    }
                    text_content.push_str(&text);
                }
                ContentBlock::ToolUse(tu) => {
                    tool_calls.push(MessageToolCall {
                        id: tu.tool_use_id,
                        name: tu.name,
                        arguments: serde_json::to_string(&tu.input).unwrap_or_default(),
                    });
                }
                ContentBlock::ToolResult(_) => {
                    // The model never returns toolResult blocks
                }
            }
        }

        let mut message = Message::assistant(text_content);
        message.tool_calls = tool_calls;

        let usage = Some(Usage {
            prompt_tokens: resp.usage.input_tokens,
            completion_tokens: resp.usage.output_tokens,
            total_tokens: resp.usage.total_tokens,
        });

        Ok(ProviderResponse {
            message,
            usage,
            model,
        })
    }
}

/// Extract the service error code from an `x-amzn-errortype` header value.
///
/// The header carries `Code` or `Code:namespace#detail`; only the leading
/// code string matters for classification.
fn parse_error_code(header: &str) -> &str {
    header.split(':').next().unwrap_or(header).trim()
}

/// Model IDs contain `.` and `:`; only `:` needs escaping in the URL path.
fn encode_model_id(model: &str) -> String {
    model.replace(':', "%3A")
}

#[async_trait]
impl Provider for BedrockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let model = self
            .model
            .clone()
            .unwrap_or_else(|| request.model.clone());
        let url = format!("{}/model/{}/converse", self.base_url, encode_model_id(&model));
        let (system, messages) = Self::extract_system(&request.messages);
        let api_messages = Self::to_api_messages(&messages);

        let max_tokens = request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);

        let mut inference_config = serde_json::json!({
            "maxTokens": max_tokens,
            "temperature": request.temperature,
        });
        if !request.stop.is_empty() {
            inference_config["stopSequences"] = serde_json::json!(request.stop);
        }

        let mut body = serde_json::json!({
            "messages": api_messages,
            "inferenceConfig": inference_config,
        });

        if let Some(ref sys) = system {
            body["system"] = serde_json::json!([{ "text": sys }]);
        }

        if !request.tools.is_empty() {
            body["toolConfig"] = serde_json::json!({
                "tools": Self::to_api_tools(&request.tools)
            });
        }

        debug!(provider = "bedrock", model = %model, "Sending converse request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if !response.status().is_success() {
            // The service reports its error code in this header; surface it
            // as a structured Service error so the classifier can see it.
            let code = response
                .headers()
                .get("x-amzn-errortype")
                .and_then(|v| v.to_str().ok())
                .map(parse_error_code)
                .map(str::to_string);

            let error_body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&error_body)
                .ok()
                .and_then(|v| v["message"].as_str().map(str::to_string))
                .unwrap_or(error_body);

            warn!(status, code = code.as_deref().unwrap_or("-"), "Bedrock API error");

            if let Some(code) = code {
                return Err(ProviderError::Service { code, message });
            }
            if status == 401 || status == 403 {
                return Err(ProviderError::AuthenticationFailed(
                    "Invalid Bedrock API key".into(),
                ));
            }
            return Err(ProviderError::Api {
                status_code: status,
                message,
            });
        }

        let api_resp: ConverseResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Self::response_to_provider_response(api_resp, model)
    }
}

// --- Converse API types ---

#[derive(Debug, Serialize, Deserialize)]
struct ConverseMessage {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize, Deserialize)]
enum ContentBlock {
    #[serde(rename = "text")]
    Text(String),
    #[serde(rename = "toolUse")]
    ToolUse(ToolUseBlock),
    #[serde(rename = "toolResult")]
    ToolResult(ToolResultBlock),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolUseBlock {
    tool_use_id: String,
    name: String,
    input: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolResultBlock {
    tool_use_id: String,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ConverseResponse {
    output: ConverseOutput,
    usage: ConverseUsage,
    #[serde(default, rename = "stopReason")]
    #[allow(dead_code)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConverseOutput {
    message: ConverseMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConverseUsage {
    input_tokens: u32,
    output_tokens: u32,
    total_tokens: u32,
}
