//! The relay: one inbound request in, one or more pushes out.
//!
//! [`Dispatcher::dispatch`] validates the response mode, resolves the prompt
//! template, assembles the upstream messages and hands off to the mode's
//! [`Strategy`]. Everything it needs is immutable after startup, so one
//! dispatcher serves every concurrent request.

pub mod confusables;
pub mod extract;
pub mod sink;
pub mod strategy;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::llm::{ChatTurn, CompletionClient, ProviderError, assemble, providers};

pub use sink::{ConnectionTarget, DeliverySink, HttpPushSink, PushError};
pub use strategy::{CallContext, ResponseMode, SENTINEL, Strategy};

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RelayError {
    /// The named prompt template is unset or empty.
    #[error("prompt template '{0}' is not configured")]
    ConfigMissing(String),

    #[error("Incorrect response type: {0}")]
    InvalidMode(String),

    /// The upstream call could not be made or was refused.
    #[error("upstream request failed: {0}")]
    Upstream(#[source] ProviderError),

    /// The stream broke after it was opened.
    #[error("upstream stream failed: {0}")]
    Stream(#[source] ProviderError),

    #[error("can't parse upstream response: {source_text}")]
    ExtractionFailed { source_text: String },

    #[error("delivery failed: {0}")]
    ConnectionGone(#[source] PushError),
}

impl RelayError {
    /// Short stable label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::ConfigMissing(_) => "config_missing",
            RelayError::InvalidMode(_) => "invalid_mode",
            RelayError::Upstream(_) => "upstream",
            RelayError::Stream(_) => "stream",
            RelayError::ExtractionFailed { .. } => "extraction_failed",
            RelayError::ConnectionGone(_) => "connection_gone",
        }
    }
}

// ── Request / report ──────────────────────────────────────────────────────────

/// Decoded request body. Missing or `null` fields default to empty, which
/// then fails mode or prompt validation rather than parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InboundRequest {
    #[serde(default, deserialize_with = "null_as_default")]
    pub prompt_template: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub messages: Vec<ChatTurn>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub response_type: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Outcome of a successful dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Pushes made, sentinel included.
    pub pushes: usize,
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: CompletionClient,
    prompts: Arc<HashMap<String, String>>,
}

impl Dispatcher {
    pub fn new(client: CompletionClient, prompts: HashMap<String, String>) -> Self {
        Self { client, prompts: Arc::new(prompts) }
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let provider = providers::build(&config.upstream, &config.api_key)
            .map_err(|e| AppError::Config(e.to_string()))?;
        let client = CompletionClient::new(
            provider,
            config.upstream.model.clone(),
            config.upstream.default_model.clone(),
        );
        Ok(Self::new(client, config.prompts.clone()))
    }

    pub fn client(&self) -> &CompletionClient {
        &self.client
    }

    /// Template text for `key`; `None` when unset or empty.
    pub fn prompt(&self, key: &str) -> Option<&str> {
        self.prompts
            .get(key)
            .map(String::as_str)
            .filter(|p| !p.is_empty())
    }

    /// Run one request end to end.
    ///
    /// An invalid mode or a missing prompt fails before any upstream call.
    pub async fn dispatch(
        &self,
        request: &InboundRequest,
        sink: &dyn DeliverySink,
        target: &ConnectionTarget,
    ) -> Result<DeliveryReport, RelayError> {
        let mode: ResponseMode = request.response_type.parse()?;

        let template = self.prompt(&request.prompt_template).unwrap_or_default();
        let messages = assemble(template, &request.messages)
            .map_err(|_| RelayError::ConfigMissing(request.prompt_template.clone()))?;

        info!(
            connection_id = %target.connection_id,
            %mode,
            template = %request.prompt_template,
            turns = request.messages.len(),
            "dispatching request"
        );

        let ctx = CallContext { client: &self.client, messages: &messages, sink, target };
        let result = mode.strategy().run(&ctx).await;

        match &result {
            Ok(report) => {
                info!(connection_id = %target.connection_id, pushes = report.pushes, "request complete")
            }
            Err(e) => {
                warn!(connection_id = %target.connection_id, kind = e.kind(), error = %e, "request failed")
            }
        }
        result
    }
}
