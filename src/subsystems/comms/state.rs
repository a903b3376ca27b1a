//! Shared state for the Comms subsystem: capability boundary for channels.
//!
//! Channels receive an `Arc<CommsState>` and are restricted to the typed
//! methods below. The dispatcher and sinks are private; channels cannot
//! reach the upstream client directly.
//!
//! # Connection registry
//!
//! Every live WebSocket owns an outbound queue registered under its
//! connection id. [`RegistrySink`] delivers pushes into those queues, so the
//! direct socket path and the `/api/connections/{id}` push endpoint share
//! one delivery mechanism.
//!
//! # Intra-subsystem events
//!
//! [`CommsState::report_event`] lets a running channel signal the comms
//! subsystem manager (connection opened/closed, channel shutdown). The
//! manager owns the receiver end.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::gateway::{self, ProxyEvent, ProxyResponse};
use crate::relay::{ConnectionTarget, DeliverySink, Dispatcher, PushError};

/// Outbound frames buffered per socket before pushes start waiting.
const OUTBOUND_QUEUE: usize = 64;

/// Push endpoint recorded on targets that live in this process.
const LOCAL_ENDPOINT: &str = "local";

/// Close code for a request the relay could not parse (invalid payload data).
const CLOSE_BAD_REQUEST: u16 = 1007;

/// Close code for any other call-level failure (internal error).
const CLOSE_SERVER_ERROR: u16 = 1011;

/// Close frame reasons are capped at 123 bytes on the wire.
const MAX_CLOSE_REASON: usize = 123;

// ── Events ────────────────────────────────────────────────────────────────────

/// Events a channel sends back to the comms subsystem manager.
#[derive(Debug)]
pub enum CommsEvent {
    /// Channel has stopped.
    ChannelShutdown { channel_id: String },
    /// A socket registered (`$connect`).
    ConnectionOpened { connection_id: String },
    /// A socket closed and was unregistered (`$disconnect`).
    ConnectionClosed { connection_id: String },
}

// ── Outbound frames ───────────────────────────────────────────────────────────

/// One frame queued for a socket.
///
/// Payloads travel as `Text` or `Binary`; a call-level failure is a `Close`
/// so clients never mistake it for another payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Binary(Vec<u8>),
    Close { code: u16, reason: String },
}

impl Outbound {
    /// Valid UTF-8 goes out as text, anything else untouched as binary.
    pub fn from_bytes(data: &[u8]) -> Self {
        match String::from_utf8(data.to_vec()) {
            Ok(text) => Outbound::Text(text),
            Err(e) => Outbound::Binary(e.into_bytes()),
        }
    }

    /// Close frame reporting a failed request.
    pub fn failure(reply: &ProxyResponse) -> Self {
        let code = if reply.status_code == gateway::STATUS_BAD_REQUEST {
            CLOSE_BAD_REQUEST
        } else {
            CLOSE_SERVER_ERROR
        };
        Outbound::Close { code, reason: truncate_reason(&reply.body) }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Outbound::Text(text) => Some(text),
            _ => None,
        }
    }
}

fn truncate_reason(detail: &str) -> String {
    if detail.len() <= MAX_CLOSE_REASON {
        return detail.to_string();
    }
    let mut end = MAX_CLOSE_REASON;
    while !detail.is_char_boundary(end) {
        end -= 1;
    }
    detail[..end].to_string()
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Live sockets by connection id.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, mpsc::Sender<Outbound>>>,
}

impl ConnectionRegistry {
    /// Register `connection_id` and return the receiving end of its
    /// outbound queue. Re-registering replaces the previous queue.
    pub fn register(&self, connection_id: &str) -> mpsc::Receiver<Outbound> {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        if let Ok(mut map) = self.connections.write() {
            map.insert(connection_id.to_string(), tx);
        }
        rx
    }

    pub fn unregister(&self, connection_id: &str) {
        if let Ok(mut map) = self.connections.write() {
            map.remove(connection_id);
        }
    }

    pub fn len(&self) -> usize {
        self.connections.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, connection_id: &str) -> bool {
        self.connections
            .read()
            .map(|m| m.contains_key(connection_id))
            .unwrap_or(false)
    }

    /// Queue `frame` for the socket. `Gone` if it is not registered or its
    /// writer has exited.
    pub async fn send(&self, connection_id: &str, frame: Outbound) -> Result<(), PushError> {
        let sender = self
            .connections
            .read()
            .ok()
            .and_then(|m| m.get(connection_id).cloned())
            .ok_or_else(|| PushError::Gone(connection_id.to_string()))?;

        sender
            .send(frame)
            .await
            .map_err(|_| PushError::Gone(connection_id.to_string()))
    }
}

/// Delivers pushes to sockets held by this process.
#[derive(Debug, Clone)]
pub struct RegistrySink {
    registry: Arc<ConnectionRegistry>,
}

impl RegistrySink {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl DeliverySink for RegistrySink {
    async fn push(&self, target: &ConnectionTarget, data: &[u8]) -> Result<(), PushError> {
        self.registry.send(&target.connection_id, Outbound::from_bytes(data)).await
    }
}

// ── State ─────────────────────────────────────────────────────────────────────

/// Shared state passed as `Arc<CommsState>` to every channel task.
pub struct CommsState {
    dispatcher: Dispatcher,
    registry: Arc<ConnectionRegistry>,
    /// Sink for gateway events; pushes leave through the push endpoint.
    event_sink: Arc<dyn DeliverySink>,
    push_endpoint: Arc<str>,
    socket_sink: RegistrySink,
    local_endpoint: Arc<str>,
    /// Back-channel to the comms subsystem manager.
    event_tx: mpsc::Sender<CommsEvent>,
}

impl CommsState {
    pub fn new(
        dispatcher: Dispatcher,
        event_sink: Arc<dyn DeliverySink>,
        push_endpoint: impl Into<Arc<str>>,
        event_tx: mpsc::Sender<CommsEvent>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::default());
        Self {
            dispatcher,
            socket_sink: RegistrySink::new(registry.clone()),
            registry,
            event_sink,
            push_endpoint: push_endpoint.into(),
            local_endpoint: Arc::from(LOCAL_ENDPOINT),
            event_tx,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Handle a gateway proxy event; replies go through the push endpoint.
    pub async fn handle_event(&self, event: &ProxyEvent) -> ProxyResponse {
        gateway::handle_event(&self.dispatcher, event, self.event_sink.as_ref(), &self.push_endpoint)
            .await
    }

    /// Handle one text frame from a local socket; replies go back to it.
    pub async fn handle_socket_message(&self, connection_id: &str, text: String) -> ProxyResponse {
        debug!(connection_id, bytes = text.len(), "socket message");
        let event = ProxyEvent::message(connection_id, text);
        gateway::handle_event(&self.dispatcher, &event, &self.socket_sink, &self.local_endpoint)
            .await
    }

    /// Push raw bytes to a local socket: text when they are UTF-8, binary
    /// otherwise.
    pub async fn push_to_connection(&self, connection_id: &str, data: &[u8]) -> Result<(), PushError> {
        let target = ConnectionTarget::new(connection_id, self.local_endpoint.clone());
        self.socket_sink.push(&target, data).await
    }

    /// Report an event to the comms subsystem manager.
    ///
    /// Non-blocking: drops the event and logs a warning if the manager is not
    /// keeping up (channel full) or has already exited (closed).
    pub fn report_event(&self, event: CommsEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!("comms event dropped: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registered_socket_receives_pushes() {
        let registry = Arc::new(ConnectionRegistry::default());
        let mut rx = registry.register("c1");
        let sink = RegistrySink::new(registry.clone());

        let target = ConnectionTarget::new("c1", Arc::from(LOCAL_ENDPOINT));
        sink.push(&target, b"He").await.unwrap();
        sink.push(&target, b"<END>").await.unwrap();

        assert_eq!(rx.recv().await, Some(Outbound::Text("He".into())));
        assert_eq!(rx.recv().await, Some(Outbound::Text("<END>".into())));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn non_utf8_push_is_binary() {
        let registry = Arc::new(ConnectionRegistry::default());
        let mut rx = registry.register("c1");
        let sink = RegistrySink::new(registry.clone());

        let raw = [0xff, 0xfe, b'a'];
        sink.push(&ConnectionTarget::new("c1", Arc::from(LOCAL_ENDPOINT)), &raw).await.unwrap();
        assert_eq!(rx.recv().await, Some(Outbound::Binary(raw.to_vec())));
    }

    #[test]
    fn failure_closes_with_status_specific_code() {
        let bad = Outbound::failure(&ProxyResponse::error(gateway::STATUS_BAD_REQUEST, "Error parsing request JSON: x"));
        assert_eq!(bad, Outbound::Close { code: 1007, reason: "Error parsing request JSON: x".into() });

        let failed = Outbound::failure(&ProxyResponse::error(gateway::STATUS_SERVER_ERROR, "Incorrect response type: csv"));
        assert!(matches!(failed, Outbound::Close { code: 1011, .. }));
        assert_eq!(failed.as_text(), None);
    }

    #[test]
    fn long_failure_reason_is_cut_on_a_char_boundary() {
        let detail = "é".repeat(100);
        let Outbound::Close { reason, .. } = Outbound::failure(&ProxyResponse::error(500, detail)) else {
            panic!("expected a close frame");
        };
        assert!(reason.len() <= MAX_CLOSE_REASON);
        assert_eq!(reason, "é".repeat(61));
    }

    #[tokio::test]
    async fn unknown_connection_is_gone() {
        let registry = ConnectionRegistry::default();
        let err = registry.send("nope", Outbound::Text("x".into())).await.unwrap_err();
        assert!(matches!(err, PushError::Gone(id) if id == "nope"));
    }

    #[tokio::test]
    async fn unregister_removes_connection() {
        let registry = ConnectionRegistry::default();
        let _rx = registry.register("c1");
        assert!(registry.contains("c1"));
        registry.unregister("c1");
        assert!(registry.is_empty());
        assert!(registry.send("c1", Outbound::Text("x".into())).await.is_err());
    }

    #[tokio::test]
    async fn dropped_receiver_is_gone() {
        let registry = ConnectionRegistry::default();
        drop(registry.register("c1"));
        assert!(matches!(registry.send("c1", Outbound::Text("x".into())).await, Err(PushError::Gone(_))));
    }
}
