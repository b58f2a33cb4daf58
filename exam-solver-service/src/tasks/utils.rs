use rig::prelude::*;
use rig::{agent::Agent, providers::openrouter};

/// Create an LLM agent using OpenRouter
pub fn get_llm_agent(
    api_key: &str,
    model: &str,
    preamble: &str,
) -> anyhow::Result<Agent<openrouter::CompletionModel>> {
    if api_key.trim().is_empty() {
        return Err(anyhow::anyhow!("OPENROUTER_API_KEY not set"));
    }
    let client = openrouter::Client::new(api_key);
    Ok(client.agent(model).preamble(preamble).build())
}
