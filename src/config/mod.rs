//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` (or the file passed with `-f`), follows
//! `[meta] base` chains, then applies `OPENAI_API_KEY`, `OPENAI_MODEL`,
//! `API_GW_ENDPOINT`, `RELAY_BIND`, `RELAY_LOG_LEVEL` and `PROMPT_*`.
//!
//! # Module layout
//!
//! - **types**: resolved structs consumed by the rest of the crate.
//! - **raw**: TOML deserialization shapes with serde defaults; private.
//! - **load**: `load`, `load_from`, and the [`EnvOverrides`] snapshot.

mod load;
mod raw;
mod types;

pub use load::{EnvOverrides, PROMPT_ENV_PREFIX, load, load_from};
pub use types::*;

#[cfg(test)]
impl Config {
    /// Self-contained `Config` for tests: dummy provider, local endpoints.
    pub fn test_default() -> Self {
        Self {
            server: ServerConfig {
                bind: raw::default_bind(),
                log_level: "info".into(),
            },
            upstream: UpstreamConfig {
                provider: "dummy".into(),
                api_base_url: "http://127.0.0.1:0/v1".into(),
                model: String::new(),
                default_model: raw::default_model(),
                timeout_seconds: 1,
            },
            push: PushConfig {
                endpoint: "http://127.0.0.1:0".into(),
                timeout_seconds: 1,
            },
            prompts: std::collections::HashMap::from([(
                "SYS".to_string(),
                "You are a test assistant.".to_string(),
            )]),
            api_key: "test-key".into(),
        }
    }
}
