//! Command implementations and shared wiring.

pub mod invoke;
pub mod serve;

use std::sync::Arc;
use tenax_agent::AgentLoop;
use tenax_config::AppConfig;
use tenax_core::provider::Provider;
use tenax_providers::{BedrockProvider, ResilientProvider, RetryPolicy};
use tracing::info;

/// Wire config → model clients → resilient invoker → tools → agent.
pub fn build_agent(config: &AppConfig) -> Result<AgentLoop, Box<dyn std::error::Error>> {
    let api_key = config.api_key.clone().ok_or(
        "No Bedrock API key configured. Set BEDROCK_API_KEY or add api_key to the config file.",
    )?;

    info!(model = %config.model_id, "Initializing primary model client");
    let primary = Arc::new(
        BedrockProvider::new(&config.region, api_key.clone()).with_model(&config.model_id),
    );

    // The fallback client is only constructed if the primary ever fails.
    let region = config.region.clone();
    let fallback_model = config.fallback_model_id.clone();
    let make_fallback = move || -> Arc<dyn Provider> {
        info!(model = %fallback_model, "Initializing fallback model client");
        Arc::new(BedrockProvider::new(&region, api_key.clone()).with_model(&fallback_model))
    };

    let policy = RetryPolicy::new(
        config.retry.max_attempts,
        config.retry.min_wait(),
        config.retry.max_wait(),
    );
    let invoker = Arc::new(ResilientProvider::new(primary, make_fallback, policy));

    let tools = Arc::new(tenax_tools::default_registry(
        config.search.resolve_api_key(),
        config.search.max_results,
    ));

    Ok(
        AgentLoop::new(invoker, &config.model_id, config.default_temperature, tools)
            .with_max_tokens(config.default_max_tokens),
    )
}
