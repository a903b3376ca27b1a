//! Completion client and its provider backends.
//!
//! `LlmProvider` is an enum over concrete provider implementations. Each
//! backend offers three operations: a single non-streaming completion, a
//! streaming completion returned as a [`FragmentStream`], and a listing of
//! the models it currently advertises.
//!
//! [`CompletionClient`] is what the relay uses: it pairs a provider with the
//! configured model names and performs best-effort model resolution.

pub mod models;
pub mod prompt;
pub mod providers;

use std::pin::Pin;

use futures_util::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use prompt::{PromptError, assemble};

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("provider stream failed: {0}")]
    Stream(String),
}

// ── Messages ──────────────────────────────────────────────────────────────────

/// Role of a caller-supplied conversation turn. `system` is deliberately
/// absent: the system message is always injected server-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One turn of the conversation as received from the client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
}

/// Role of a message in the upstream request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl From<TurnRole> for ChatRole {
    fn from(role: TurnRole) -> Self {
        match role {
            TurnRole::User => ChatRole::User,
            TurnRole::Assistant => ChatRole::Assistant,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Upstream message sequence: exactly one leading system message followed
/// by the caller's turns in their original order.
///
/// Only [`prompt::assemble`] constructs it, so the invariant holds for every
/// value in circulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledMessages(Vec<ChatMessage>);

impl AssembledMessages {
    pub fn as_slice(&self) -> &[ChatMessage] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The injected system prompt.
    pub fn system_prompt(&self) -> &str {
        self.0.first().map(|m| m.content.as_str()).unwrap_or_default()
    }

    /// Content of the most recent user turn, if any.
    pub fn last_user_content(&self) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
    }
}

// ── Streaming ─────────────────────────────────────────────────────────────────

/// Lazy, single-pass, finite sequence of text fragments in arrival order.
///
/// The stream owns the underlying upstream connection; dropping it (after
/// the last item, on error, or early) releases that connection.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

// ── Provider enum ─────────────────────────────────────────────────────────────

/// All available provider backends.
///
/// Enum dispatch keeps the call sites free of trait objects. Adding a
/// backend = new module + new variant + new match arms.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    Dummy(providers::dummy::DummyProvider),
    OpenAiCompatible(providers::openai_compatible::OpenAiCompatibleProvider),
}

impl LlmProvider {
    /// One non-streaming round-trip; returns the full answer text.
    pub async fn complete(
        &self,
        model: &str,
        messages: &AssembledMessages,
    ) -> Result<String, ProviderError> {
        match self {
            LlmProvider::Dummy(p) => p.complete(model, messages).await,
            LlmProvider::OpenAiCompatible(p) => p.complete(model, messages).await,
        }
    }

    /// Open a streaming completion.
    pub async fn stream(
        &self,
        model: &str,
        messages: &AssembledMessages,
    ) -> Result<FragmentStream, ProviderError> {
        match self {
            LlmProvider::Dummy(p) => p.stream(model, messages).await,
            LlmProvider::OpenAiCompatible(p) => p.stream(model, messages).await,
        }
    }

    /// Model identifiers the service currently advertises.
    pub async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        match self {
            LlmProvider::Dummy(p) => p.list_models().await,
            LlmProvider::OpenAiCompatible(p) => p.list_models().await,
        }
    }
}

// ── CompletionClient ──────────────────────────────────────────────────────────

/// A provider plus the configured model names. Immutable and cheap to clone.
#[derive(Debug, Clone)]
pub struct CompletionClient {
    provider: LlmProvider,
    requested_model: String,
    default_model: String,
}

impl CompletionClient {
    pub fn new(
        provider: LlmProvider,
        requested_model: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            requested_model: requested_model.into(),
            default_model: default_model.into(),
        }
    }

    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }

    /// Resolve the model for one call. Never fails; see [`models::resolve`].
    pub async fn resolve_model(&self) -> String {
        models::resolve(&self.provider, &self.requested_model, &self.default_model).await
    }

    pub async fn complete_sync(
        &self,
        model: &str,
        messages: &AssembledMessages,
    ) -> Result<String, ProviderError> {
        self.provider.complete(model, messages).await
    }

    pub async fn complete_stream(
        &self,
        model: &str,
        messages: &AssembledMessages,
    ) -> Result<FragmentStream, ProviderError> {
        self.provider.stream(model, messages).await
    }
}
