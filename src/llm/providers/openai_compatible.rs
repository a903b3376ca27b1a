//! OpenAI-compatible chat completion provider.
//!
//! Talks to `{api_base_url}/chat/completions` (plain and SSE streaming) and
//! `{api_base_url}/models`. All OpenAI wire types are private to this module;
//! callers only see answer text, fragment streams and model ids.

use std::time::Duration;

use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::llm::{AssembledMessages, ChatMessage, FragmentStream, ProviderError};

const DONE_MARKER: &str = "[DONE]";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ── Public provider ───────────────────────────────────────────────────────────

/// Adapter for any HTTP endpoint implementing the OpenAI chat API.
///
/// Constructed once at startup, then cheaply cloned because
/// `reqwest::Client` is an `Arc` internally.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    api_base_url: String,
    timeout: Duration,
    api_key: String,
}

impl OpenAiCompatibleProvider {
    /// `api_base_url` is the API root (e.g. `https://api.openai.com/v1`).
    /// `timeout_seconds` bounds non-streaming requests; streams are only
    /// bounded by the connect timeout, since a long answer may take minutes.
    pub fn new(
        api_base_url: impl Into<String>,
        timeout_seconds: u64,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(timeout_seconds),
            api_key: api_key.into(),
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.api_base_url)
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.api_base_url)
    }

    async fn send_chat(
        &self,
        payload: &ChatCompletionRequest<'_>,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, ProviderError> {
        debug!(
            model = %payload.model,
            messages = payload.messages.len(),
            stream = payload.stream,
            "sending chat completion request"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full chat completion payload");
        }

        let mut req = self.client.post(self.chat_url()).bearer_auth(&self.api_key).json(payload);
        if let Some(t) = timeout {
            req = req.timeout(t);
        }

        let response = req.send().await.map_err(|e| {
            error!(url = %self.chat_url(), error = %e, "chat completion request failed (transport)");
            ProviderError::Request(e.to_string())
        })?;

        check_status(response).await
    }

    /// One non-streaming round-trip. Returns the first choice's content
    /// exactly as sent by the service.
    pub async fn complete(
        &self,
        model: &str,
        messages: &AssembledMessages,
    ) -> Result<String, ProviderError> {
        let payload = ChatCompletionRequest {
            model,
            messages: messages.as_slice(),
            stream: false,
        };
        let response = self.send_chat(&payload, Some(self.timeout)).await?;

        let parsed = response.json::<ChatCompletionResponse>().await.map_err(|e| {
            error!(error = %e, "failed to deserialize chat completion response");
            ProviderError::Request(format!("failed to parse response body: {e}"))
        })?;

        debug!(choices = parsed.choices.len(), "received chat completion response");

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| ProviderError::Request("no choices in response".into()))
    }

    /// Open a streaming completion. The returned stream yields each
    /// `delta.content` in arrival order and ends at `data: [DONE]`.
    pub async fn stream(
        &self,
        model: &str,
        messages: &AssembledMessages,
    ) -> Result<FragmentStream, ProviderError> {
        let payload = ChatCompletionRequest {
            model,
            messages: messages.as_slice(),
            stream: true,
        };
        let response = self.send_chat(&payload, None).await?;
        let mut events = Box::pin(response.bytes_stream().eventsource());

        let fragments = async_stream::try_stream! {
            while let Some(event) = next_event(&mut events).await? {
                trace!(data = %event.data, "chat completion SSE event");
                if event.data.trim() == DONE_MARKER {
                    break;
                }
                if let Some(fragment) = parse_chunk(&event.data)? {
                    yield fragment;
                }
            }
        };

        Ok(Box::pin(fragments))
    }

    pub async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let response = self
            .client
            .get(self.models_url())
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        let response = check_status(response).await?;

        let parsed = response
            .json::<ModelList>()
            .await
            .map_err(|e| ProviderError::Request(format!("failed to parse model list: {e}")))?;

        Ok(parsed.data.into_iter().map(|m| m.id).collect())
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

// Error envelope used by OpenAI and compatible APIs.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Next SSE event. `Ok(None)` once the body ends, with or without a
/// `[DONE]` marker.
async fn next_event<S, E>(events: &mut S) -> Result<Option<Event>, ProviderError>
where
    S: Stream<Item = Result<Event, EventStreamError<E>>> + Unpin,
    E: std::fmt::Display,
{
    match events.next().await {
        Some(Ok(event)) => Ok(Some(event)),
        Some(Err(e)) => {
            error!(error = %e, "SSE stream error");
            Err(ProviderError::Stream(format!("SSE stream error: {e}")))
        }
        None => {
            debug!("SSE body ended");
            Ok(None)
        }
    }
}

/// Decode one SSE data payload. `Ok(None)` for chunks without choices
/// (keepalive / usage-only); an `error` object is a stream failure.
fn parse_chunk(data: &str) -> Result<Option<String>, ProviderError> {
    let value: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| ProviderError::Stream(format!("SSE parsing error: {e}, data: {data}")))?;

    if let Some(err) = value.get("error") {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .or_else(|| err.as_str())
            .unwrap_or("an error occurred during streaming");
        return Err(ProviderError::Stream(format!("SSE API error: {message}")));
    }

    let chunk: ChatCompletionChunk = serde_json::from_value(value)
        .map_err(|e| ProviderError::Stream(format!("SSE data schema error: {e}, data: {data}")))?;

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .map(|c| c.delta.content.unwrap_or_default()))
}

/// Pass a successful response through, or turn it into a structured error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());

    let message = if let Ok(env) = serde_json::from_str::<ErrorEnvelope>(&body) {
        let code = env
            .error
            .code
            .map(|v| match v {
                serde_json::Value::String(s) => format!(" [code={s}]"),
                other => format!(" [code={other}]"),
            })
            .unwrap_or_default();
        format!("HTTP {status}{code}: {}", env.error.message)
    } else {
        format!("HTTP {status}: {body}")
    };

    error!(%status, %message, "upstream returned HTTP error");
    Err(ProviderError::Request(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatTurn, TurnRole, assemble};
    use axum::{
        Json, Router,
        http::{StatusCode, header},
        response::IntoResponse,
        routing::{get, post},
    };
    use serde_json::json;

    async fn spawn_mock(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    fn messages() -> AssembledMessages {
        let turns = vec![ChatTurn { role: TurnRole::User, content: "Hi".into() }];
        assemble("SYS", &turns).unwrap()
    }

    fn sse(body: &'static str) -> impl IntoResponse {
        ([(header::CONTENT_TYPE, "text/event-stream")], body)
    }

    #[test]
    fn constructs_provider_and_trims_base() {
        let p = OpenAiCompatibleProvider::new("http://127.0.0.1:8081/v1/", 5, "k").unwrap();
        assert_eq!(p.chat_url(), "http://127.0.0.1:8081/v1/chat/completions");
        assert_eq!(p.models_url(), "http://127.0.0.1:8081/v1/models");
    }

    #[test]
    fn request_serializes_roles_and_omits_false_stream() {
        let msgs = messages();
        let payload = ChatCompletionRequest { model: "gpt-4o", messages: msgs.as_slice(), stream: false };
        let v = serde_json::to_value(&payload).unwrap();
        assert_eq!(v["messages"][0]["role"], "system");
        assert_eq!(v["messages"][1]["role"], "user");
        assert!(v.get("stream").is_none());
    }

    #[test]
    fn parse_chunk_variants() {
        let chunk = r#"{"object":"chat.completion.chunk","choices":[{"delta":{"content":"He"}}]}"#;
        assert_eq!(parse_chunk(chunk).unwrap().as_deref(), Some("He"));

        let role_only = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_chunk(role_only).unwrap().as_deref(), Some(""));

        let keepalive = r#"{"choices":[]}"#;
        assert_eq!(parse_chunk(keepalive).unwrap(), None);

        let err = r#"{"error":{"message":"overloaded"}}"#;
        assert!(matches!(parse_chunk(err), Err(ProviderError::Stream(m)) if m.contains("overloaded")));

        assert!(parse_chunk("not json").is_err());
    }

    #[tokio::test]
    async fn complete_returns_untrimmed_content() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                Json(json!({"choices":[{"message":{"role":"assistant","content":"  The result is [[123]]. "}}]}))
            }),
        );
        let base = spawn_mock(router).await;
        let p = OpenAiCompatibleProvider::new(base, 5, "k").unwrap();
        let answer = p.complete("gpt-4o", &messages()).await.unwrap();
        assert_eq!(answer, "  The result is [[123]]. ");
    }

    #[tokio::test]
    async fn complete_maps_error_envelope() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"error":{"message":"Incorrect API key","code":"invalid_api_key"}})),
                )
            }),
        );
        let base = spawn_mock(router).await;
        let p = OpenAiCompatibleProvider::new(base, 5, "bad").unwrap();
        let err = p.complete("gpt-4o", &messages()).await.unwrap_err().to_string();
        assert!(err.contains("401"));
        assert!(err.contains("invalid_api_key"));
        assert!(err.contains("Incorrect API key"));
    }

    #[tokio::test]
    async fn stream_yields_fragments_in_order() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                sse(concat!(
                    "data: {\"choices\":[{\"delta\":{\"content\":\"He\"}}]}\n\n",
                    "data: {\"choices\":[{\"delta\":{\"content\":\"llo\"}}]}\n\n",
                    "data: [DONE]\n\n",
                ))
            }),
        );
        let base = spawn_mock(router).await;
        let p = OpenAiCompatibleProvider::new(base, 5, "k").unwrap();
        let stream = p.stream("gpt-4o", &messages()).await.unwrap();
        let got: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(got, ["He", "llo"]);
    }

    #[tokio::test]
    async fn stream_ends_cleanly_without_done() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { sse("data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n") }),
        );
        let base = spawn_mock(router).await;
        let p = OpenAiCompatibleProvider::new(base, 5, "k").unwrap();
        let got: Vec<String> = p
            .stream("gpt-4o", &messages())
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(got, ["partial"]);
    }

    #[tokio::test]
    async fn list_models_reads_ids() {
        let router = Router::new().route(
            "/v1/models",
            get(|| async {
                Json(json!({"object":"list","data":[{"id":"gpt-4o","object":"model"},{"id":"gpt-3.5-turbo","object":"model"}]}))
            }),
        );
        let base = spawn_mock(router).await;
        let p = OpenAiCompatibleProvider::new(base, 5, "k").unwrap();
        assert_eq!(p.list_models().await.unwrap(), ["gpt-4o", "gpt-3.5-turbo"]);
    }

    #[tokio::test]
    async fn unreachable_host_is_request_error() {
        let p = OpenAiCompatibleProvider::new("http://127.0.0.1:9/v1", 1, "k").unwrap();
        assert!(matches!(p.complete("m", &messages()).await, Err(ProviderError::Request(_))));
    }
}
