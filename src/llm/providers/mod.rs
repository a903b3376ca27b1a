//! LLM provider implementations.
//!
//! `build(config, api_key)` is the factory: called once at startup.
//! Adding a new backend = new module + new match arm.

pub mod dummy;
pub mod openai_compatible;

use crate::config::UpstreamConfig;
use crate::llm::{LlmProvider, ProviderError};

/// Construct an `LlmProvider` from `[upstream]` config and the credential.
pub fn build(config: &UpstreamConfig, api_key: &str) -> Result<LlmProvider, ProviderError> {
    match config.provider.as_str() {
        "dummy" => Ok(LlmProvider::Dummy(dummy::DummyProvider::echo())),
        "openai" | "openai-compatible" => {
            let p = openai_compatible::OpenAiCompatibleProvider::new(
                config.api_base_url.clone(),
                config.timeout_seconds,
                api_key,
            )?;
            Ok(LlmProvider::OpenAiCompatible(p))
        }
        other => Err(ProviderError::UnknownProvider(other.to_string())),
    }
}
