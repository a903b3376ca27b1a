//! Route-key handling for WebSocket gateway events.
//!
//! A managed WebSocket gateway delivers every connection event as a
//! [`ProxyEvent`]: `$connect` and `$disconnect` are lifecycle notifications,
//! anything else carries a client message in `body`. The answer is a
//! [`ProxyResponse`] whose status reflects request handling only; the
//! actual reply travels over the push channel.
//!
//! | outcome                  | status | body                                |
//! |--------------------------|--------|-------------------------------------|
//! | connect / disconnect     | 200    | empty                               |
//! | body is not valid JSON   | 400    | `Error parsing request JSON: …`     |
//! | unknown `response_type`  | 500    | `Incorrect response type: …`        |
//! | any other relay failure  | 500    | `Error handling request: …`         |
//! | delivered                | 200    | empty                               |

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::relay::{ConnectionTarget, DeliverySink, Dispatcher, InboundRequest, RelayError};

pub const CONNECT_ROUTE: &str = "$connect";
pub const DISCONNECT_ROUTE: &str = "$disconnect";
/// Route key for ordinary messages.
pub const DEFAULT_ROUTE: &str = "$default";

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_SERVER_ERROR: u16 = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RequestContext {
    #[serde(default)]
    pub route_key: String,
    #[serde(default)]
    pub connection_id: String,
}

/// One gateway event. `body` is the raw message text, itself JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProxyEvent {
    #[serde(default)]
    pub request_context: RequestContext,
    #[serde(default)]
    pub body: String,
}

impl ProxyEvent {
    /// A `$default` message event for `connection_id`.
    pub fn message(connection_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            request_context: RequestContext {
                route_key: DEFAULT_ROUTE.to_string(),
                connection_id: connection_id.into(),
            },
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyResponse {
    pub status_code: u16,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub body: String,
}

impl ProxyResponse {
    pub fn ok() -> Self {
        Self { status_code: STATUS_OK, body: String::new() }
    }

    pub fn error(status_code: u16, message: impl Into<String>) -> Self {
        Self { status_code, body: message.into() }
    }

    pub fn is_ok(&self) -> bool {
        self.status_code == STATUS_OK
    }
}

/// Decode the JSON text carried in an event body.
pub fn parse_request_body(body: &str) -> Result<InboundRequest, serde_json::Error> {
    serde_json::from_str(body)
}

/// Handle one gateway event end to end.
pub async fn handle_event(
    dispatcher: &Dispatcher,
    event: &ProxyEvent,
    sink: &dyn DeliverySink,
    push_endpoint: &Arc<str>,
) -> ProxyResponse {
    let ctx = &event.request_context;
    match ctx.route_key.as_str() {
        CONNECT_ROUTE | DISCONNECT_ROUTE => {
            debug!(route_key = %ctx.route_key, connection_id = %ctx.connection_id, "connection lifecycle event");
            ProxyResponse::ok()
        }
        _ => handle_request(dispatcher, event, sink, push_endpoint).await,
    }
}

async fn handle_request(
    dispatcher: &Dispatcher,
    event: &ProxyEvent,
    sink: &dyn DeliverySink,
    push_endpoint: &Arc<str>,
) -> ProxyResponse {
    let request = match parse_request_body(&event.body) {
        Ok(r) => r,
        Err(e) => {
            return ProxyResponse::error(
                STATUS_BAD_REQUEST,
                format!("Error parsing request JSON: {e}"),
            );
        }
    };

    let target = ConnectionTarget::new(
        event.request_context.connection_id.as_str(),
        Arc::clone(push_endpoint),
    );

    match dispatcher.dispatch(&request, sink, &target).await {
        Ok(_) => ProxyResponse::ok(),
        Err(e @ RelayError::InvalidMode(_)) => {
            ProxyResponse::error(STATUS_SERVER_ERROR, e.to_string())
        }
        Err(e) => ProxyResponse::error(
            STATUS_SERVER_ERROR,
            format!("Error handling request: {e}"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::dummy::DummyProvider;
    use crate::llm::{CompletionClient, LlmProvider};
    use crate::relay::PushError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        pushes: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl DeliverySink for RecordingSink {
        async fn push(&self, target: &ConnectionTarget, data: &[u8]) -> Result<(), PushError> {
            self.pushes.lock().unwrap().push((
                target.connection_id.clone(),
                String::from_utf8_lossy(data).into_owned(),
            ));
            Ok(())
        }
    }

    fn dispatcher(provider: DummyProvider) -> Dispatcher {
        Dispatcher::new(
            CompletionClient::new(LlmProvider::Dummy(provider), "", "gpt-3.5-turbo"),
            HashMap::from([("SYS".to_string(), "system".to_string())]),
        )
    }

    fn endpoint() -> Arc<str> {
        Arc::from("http://gw")
    }

    fn lifecycle(route: &str) -> ProxyEvent {
        ProxyEvent {
            request_context: RequestContext { route_key: route.into(), connection_id: "c1".into() },
            body: String::new(),
        }
    }

    #[tokio::test]
    async fn connect_and_disconnect_are_ok_without_upstream() {
        let p = DummyProvider::echo();
        let d = dispatcher(p.clone());
        let sink = RecordingSink::default();
        for route in [CONNECT_ROUTE, DISCONNECT_ROUTE] {
            let resp = handle_event(&d, &lifecycle(route), &sink, &endpoint()).await;
            assert_eq!(resp, ProxyResponse::ok());
        }
        assert_eq!(p.upstream_calls(), 0);
        assert!(sink.pushes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_body_is_400() {
        let d = dispatcher(DummyProvider::echo());
        let sink = RecordingSink::default();
        let resp = handle_event(&d, &ProxyEvent::message("c1", "{not json"), &sink, &endpoint()).await;
        assert_eq!(resp.status_code, STATUS_BAD_REQUEST);
        assert!(resp.body.starts_with("Error parsing request JSON: "));
    }

    #[tokio::test]
    async fn null_messages_are_not_a_parse_error() {
        let d = dispatcher(DummyProvider::echo().with_answer("fine"));
        let sink = RecordingSink::default();
        let body = r#"{"prompt_template":"SYS","messages":null,"response_type":"full"}"#;
        let resp = handle_event(&d, &ProxyEvent::message("c1", body), &sink, &endpoint()).await;
        assert_eq!(resp, ProxyResponse::ok());
        assert_eq!(*sink.pushes.lock().unwrap(), vec![("c1".to_string(), "fine".to_string())]);
    }

    #[tokio::test]
    async fn unknown_mode_is_500_with_mode_name() {
        let d = dispatcher(DummyProvider::echo());
        let sink = RecordingSink::default();
        let body = r#"{"prompt_template":"SYS","messages":[],"response_type":"yaml"}"#;
        let resp = handle_event(&d, &ProxyEvent::message("c1", body), &sink, &endpoint()).await;
        assert_eq!(resp, ProxyResponse::error(STATUS_SERVER_ERROR, "Incorrect response type: yaml"));
    }

    #[tokio::test]
    async fn relay_failure_is_500() {
        let d = dispatcher(DummyProvider::echo().with_answer("no brackets"));
        let sink = RecordingSink::default();
        let body = r#"{"prompt_template":"SYS","messages":[{"role":"user","content":"n?"}],"response_type":"int"}"#;
        let resp = handle_event(&d, &ProxyEvent::message("c1", body), &sink, &endpoint()).await;
        assert_eq!(resp.status_code, STATUS_SERVER_ERROR);
        assert!(resp.body.starts_with("Error handling request: "));
        assert!(resp.body.contains("no brackets"));
    }

    #[tokio::test]
    async fn delivered_request_pushes_to_event_connection() {
        let d = dispatcher(DummyProvider::echo().with_answer("[[42]]"));
        let sink = RecordingSink::default();
        let body = r#"{"prompt_template":"SYS","messages":[{"role":"user","content":"n?"}],"response_type":"int"}"#;
        let resp = handle_event(&d, &ProxyEvent::message("conn-9", body), &sink, &endpoint()).await;
        assert!(resp.is_ok());
        assert_eq!(*sink.pushes.lock().unwrap(), vec![("conn-9".to_string(), "42".to_string())]);
    }

    #[test]
    fn ok_response_omits_body() {
        let json = serde_json::to_value(ProxyResponse::ok()).unwrap();
        assert_eq!(json, serde_json::json!({ "status_code": 200 }));
    }

    #[test]
    fn event_decodes_with_defaults() {
        let e: ProxyEvent = serde_json::from_str(r#"{"body":"{}"}"#).unwrap();
        assert!(e.request_context.route_key.is_empty());
        assert_eq!(e.body, "{}");
    }
}
