//! `tenax invoke`: run a single prompt and print the result.

use tenax_agent::{InvocationRequest, handle_invocation};
use tenax_config::AppConfig;

pub async fn run(prompt: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let agent = super::build_agent(&config)?;

    let response = handle_invocation(&agent, InvocationRequest { prompt }).await;
    println!("{}", response.result);

    Ok(())
}
