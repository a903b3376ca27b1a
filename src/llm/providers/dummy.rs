//! Dummy LLM provider.
//!
//! By default it echoes the last user turn back prefixed with `[echo]`, so
//! the full relay round-trip can run without an API key. Tests script its
//! answer, fragments and advertised models, and read back call counts.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::stream;

use crate::llm::{AssembledMessages, FragmentStream, ProviderError};

#[derive(Debug, Default)]
struct Calls {
    completions: AtomicUsize,
    streams: AtomicUsize,
    model_lists: AtomicUsize,
    last_model: Mutex<Option<String>>,
    last_messages: Mutex<Option<AssembledMessages>>,
}

#[derive(Debug, Clone)]
pub struct DummyProvider {
    answer: Option<String>,
    fragments: Option<Vec<String>>,
    stream_failure: Option<String>,
    models: Option<Vec<String>>,
    calls: Arc<Calls>,
}

impl Default for DummyProvider {
    fn default() -> Self {
        Self::echo()
    }
}

impl DummyProvider {
    /// Echo provider advertising no models (every request falls back to the
    /// default model).
    pub fn echo() -> Self {
        Self {
            answer: None,
            fragments: None,
            stream_failure: None,
            models: Some(Vec::new()),
            calls: Arc::new(Calls::default()),
        }
    }

    /// Fixed answer for non-streaming completions.
    pub fn with_answer(mut self, answer: impl Into<String>) -> Self {
        self.answer = Some(answer.into());
        self
    }

    /// Fixed fragment sequence for streaming completions.
    pub fn with_fragments<I, S>(mut self, fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fragments = Some(fragments.into_iter().map(Into::into).collect());
        self
    }

    /// Fail the stream with `message` after the scripted fragments.
    pub fn with_stream_failure(mut self, message: impl Into<String>) -> Self {
        self.stream_failure = Some(message.into());
        self
    }

    pub fn with_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = Some(models.into_iter().map(Into::into).collect());
        self
    }

    /// Make model listing fail.
    pub fn with_models_unavailable(mut self) -> Self {
        self.models = None;
        self
    }

    /// Completion and stream calls combined; model listings excluded.
    pub fn upstream_calls(&self) -> usize {
        self.completion_calls() + self.stream_calls()
    }

    pub fn completion_calls(&self) -> usize {
        self.calls.completions.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> usize {
        self.calls.streams.load(Ordering::SeqCst)
    }

    pub fn model_list_calls(&self) -> usize {
        self.calls.model_lists.load(Ordering::SeqCst)
    }

    /// Model passed to the most recent completion or stream call.
    pub fn last_model(&self) -> Option<String> {
        self.calls.last_model.lock().ok().and_then(|m| (*m).clone())
    }

    /// Messages passed to the most recent completion or stream call.
    pub fn last_messages(&self) -> Option<AssembledMessages> {
        self.calls.last_messages.lock().ok().and_then(|m| (*m).clone())
    }

    fn record(&self, model: &str, messages: &AssembledMessages) {
        if let Ok(mut m) = self.calls.last_model.lock() {
            *m = Some(model.to_string());
        }
        if let Ok(mut m) = self.calls.last_messages.lock() {
            *m = Some(messages.clone());
        }
    }

    fn echo_text(messages: &AssembledMessages) -> String {
        format!("[echo] {}", messages.last_user_content().unwrap_or_default())
    }

    pub async fn complete(
        &self,
        model: &str,
        messages: &AssembledMessages,
    ) -> Result<String, ProviderError> {
        self.calls.completions.fetch_add(1, Ordering::SeqCst);
        self.record(model, messages);
        Ok(self.answer.clone().unwrap_or_else(|| Self::echo_text(messages)))
    }

    pub async fn stream(
        &self,
        model: &str,
        messages: &AssembledMessages,
    ) -> Result<FragmentStream, ProviderError> {
        self.calls.streams.fetch_add(1, Ordering::SeqCst);
        self.record(model, messages);

        let fragments = self.fragments.clone().unwrap_or_else(|| {
            Self::echo_text(messages)
                .split_inclusive(' ')
                .map(str::to_string)
                .collect()
        });
        let mut items: Vec<Result<String, ProviderError>> =
            fragments.into_iter().map(Ok).collect();
        if let Some(message) = &self.stream_failure {
            items.push(Err(ProviderError::Stream(message.clone())));
        }
        Ok(Box::pin(stream::iter(items)))
    }

    pub async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        self.calls.model_lists.fetch_add(1, Ordering::SeqCst);
        self.models
            .clone()
            .ok_or_else(|| ProviderError::Request("model listing unavailable".into()))
    }
}
